//! Sample classes used by tests and the CLI

use crate::class::ClassBuilder;
use crate::env::HostEnvironment;
use crate::error::HostException;
use crate::types::HostType;
use crate::value::HostValue;

pub const WIDGET: &str = "com.example.Widget";
pub const COUNTER: &str = "com.example.Counter";
pub const MATH_UTIL: &str = "com.example.MathUtil";
pub const WIDGET_FACTORY: &str = "com.example.WidgetFactory";

/// State of a `com.example.Widget`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    pub name: String,
    pub width: i32,
    pub height: i32,
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: 10,
            height: 10,
        }
    }
}

/// State of a `com.example.Counter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub value: i32,
}

fn string_arg(args: &[HostValue], index: usize) -> Result<String, HostException> {
    match args.get(index) {
        Some(HostValue::String(s)) => Ok(s.clone()),
        Some(HostValue::Null) | None => Err(HostException::new(
            "java.lang.NullPointerException",
            format!("argument {} is null", index),
        )),
        Some(other) => Err(HostException::illegal_argument(format!(
            "argument {} is {}",
            index,
            other.type_name()
        ))),
    }
}

fn int_arg(args: &[HostValue], index: usize) -> Result<i32, HostException> {
    args.get(index)
        .and_then(HostValue::as_int)
        .ok_or_else(|| HostException::illegal_argument(format!("argument {} is not an int", index)))
}

fn non_negative(value: i32) -> Result<i32, HostException> {
    if value < 0 {
        Err(HostException::illegal_argument(format!(
            "size must not be negative: {}",
            value
        )))
    } else {
        Ok(value)
    }
}

/// Register the sample classes with `env`
pub fn register_sample_classes(env: &HostEnvironment) {
    let widget = ClassBuilder::new(WIDGET)
        .constructor(vec![], |_, _| Ok(Widget::new("widget-1")))
        .constructor(vec![HostType::String], |_, args| Ok(Widget::new(string_arg(args, 0)?)))
        .instance_method::<Widget, _>("getName", vec![], HostType::String, |_, w, _| {
            Ok(HostValue::string(w.name.clone()))
        })
        .instance_method::<Widget, _>(
            "setName",
            vec![HostType::String],
            HostType::Void,
            |_, w, args| {
                w.name = string_arg(args, 0)?;
                Ok(HostValue::Void)
            },
        )
        .instance_method::<Widget, _>("getSize", vec![], HostType::Int, |_, w, _| {
            Ok(HostValue::Int(w.width))
        })
        .instance_method::<Widget, _>("resize", vec![HostType::Int], HostType::Void, |_, w, args| {
            let size = non_negative(int_arg(args, 0)?)?;
            w.width = size;
            w.height = size;
            Ok(HostValue::Void)
        })
        .instance_method::<Widget, _>(
            "resize",
            vec![HostType::Int, HostType::Int],
            HostType::Void,
            |_, w, args| {
                w.width = non_negative(int_arg(args, 0)?)?;
                w.height = non_negative(int_arg(args, 1)?)?;
                Ok(HostValue::Void)
            },
        )
        .instance_method::<Widget, _>("area", vec![], HostType::Long, |_, w, _| {
            Ok(HostValue::Long(w.width as i64 * w.height as i64))
        })
        .instance_method::<Widget, _>(
            "getDimensions",
            vec![],
            HostType::array_of(HostType::Int),
            |_, w, _| Ok(HostValue::int_array([w.width, w.height])),
        )
        .instance_method::<Widget, _>("isSquare", vec![], HostType::Boolean, |_, w, _| {
            Ok(HostValue::Boolean(w.width == w.height))
        })
        .instance_method::<Widget, _>("describe", vec![], HostType::String, |_, w, _| {
            Ok(HostValue::string(format!(
                "Widget[name={}, size={}x{}]",
                w.name, w.width, w.height
            )))
        })
        .instance_method::<Widget, _>("copy", vec![], HostType::object(WIDGET), |env, w, _| {
            let class = env
                .for_name(WIDGET)
                .map_err(|e| HostException::illegal_state(e.to_string()))?;
            Ok(HostValue::Object(env.allocate(&class, w.clone())))
        })
        .instance_method::<Widget, _>("checkInvariants", vec![], HostType::Void, |_, _, _| {
            Ok(HostValue::Void)
        })
        .private("checkInvariants")
        .build();
    env.register_class(widget);

    let counter = ClassBuilder::new(COUNTER)
        .constructor(vec![HostType::Int], |_, args| Ok(Counter { value: int_arg(args, 0)? }))
        .instance_method::<Counter, _>("plusOne", vec![], HostType::Int, |_, c, _| {
            c.value = c.value.checked_add(1).ok_or_else(|| {
                HostException::new("java.lang.ArithmeticException", "integer overflow")
            })?;
            Ok(HostValue::Int(c.value))
        })
        .instance_method::<Counter, _>("value", vec![], HostType::Int, |_, c, _| {
            Ok(HostValue::Int(c.value))
        })
        .build();
    env.register_class(counter);

    let math = ClassBuilder::new(MATH_UTIL)
        .static_method("add", vec![HostType::Int, HostType::Int], HostType::Int, |_, args| {
            Ok(HostValue::Int(int_arg(args, 0)?.wrapping_add(int_arg(args, 1)?)))
        })
        .static_method(
            "scale",
            vec![HostType::Double, HostType::Double],
            HostType::Double,
            |_, args| {
                let value = args[0].as_double().unwrap_or_default();
                let factor = args[1].as_double().unwrap_or_default();
                Ok(HostValue::Double(value * factor))
            },
        )
        .static_method(
            "sum",
            vec![HostType::array_of(HostType::Int)],
            HostType::Int,
            |_, args| {
                let items = args[0].as_array().unwrap_or_default();
                Ok(HostValue::Int(
                    items.iter().filter_map(HostValue::as_int).fold(0i32, i32::wrapping_add),
                ))
            },
        )
        .static_method("max", vec![HostType::Long, HostType::Long], HostType::Long, |_, args| {
            let a = args[0].as_long().unwrap_or_default();
            let b = args[1].as_long().unwrap_or_default();
            Ok(HostValue::Long(a.max(b)))
        })
        .static_method("fail", vec![HostType::String], HostType::Void, |_, args| {
            Err(HostException::illegal_state(string_arg(args, 0)?))
        })
        .build();
    env.register_class(math);

    let factory = ClassBuilder::new(WIDGET_FACTORY)
        .static_method("create", vec![HostType::String], HostType::object(WIDGET), |env, args| {
            let class = env
                .for_name(WIDGET)
                .map_err(|e| HostException::illegal_state(e.to_string()))?;
            Ok(HostValue::Object(env.allocate(&class, Widget::new(string_arg(args, 0)?))))
        })
        .static_method("measure", vec![HostType::object(WIDGET)], HostType::Long, |env, args| {
            let reference = args[0].as_object().ok_or_else(|| {
                HostException::new("java.lang.NullPointerException", "widget is null")
            })?;
            let widget = env
                .object(reference)
                .map_err(|e| HostException::illegal_argument(e.to_string()))?;
            let area = widget.with_state::<Widget, _>(|w| w.width as i64 * w.height as i64)?;
            Ok(HostValue::Long(area))
        })
        .build();
    env.register_class(factory);
}
