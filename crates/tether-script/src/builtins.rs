//! Built-in globals and primitive methods

use crate::error::{ScriptError, ScriptResult};
use crate::heap::Heap;
use crate::interpreter::Interpreter;
use crate::json;
use crate::object::{Binding, HeapObject, NativeFn};
use crate::value::{number_to_string, ObjectId, Value};
use indexmap::IndexMap;
use rand::Rng;
use std::sync::Arc;

/// Wrap a closure as a [`NativeFn`]
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&mut Interpreter<'_>, &Value, &[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Bind `name` in a context's global scope
pub(crate) fn define_global(
    heap: &mut Heap,
    global: ObjectId,
    name: &str,
    value: Value,
) -> ScriptResult<()> {
    match heap.get_mut(global) {
        Some(HeapObject::Environment(env)) => {
            env.vars.insert(
                Arc::from(name),
                Binding {
                    value,
                    mutable: true,
                },
            );
            Ok(())
        }
        _ => Err(ScriptError::InvalidHandle(format!("global scope {}", global))),
    }
}

/// Allocate a plain object whose members are native functions
pub(crate) fn namespace(heap: &mut Heap, members: Vec<(&str, NativeFn)>) -> Value {
    let mut map = IndexMap::with_capacity(members.len());
    for (name, func) in members {
        let value = heap.alloc_native(name, func);
        map.insert(Arc::from(name), value);
    }
    heap.alloc_object(map)
}

fn math_unary(f: fn(f64) -> f64) -> NativeFn {
    native_fn(move |interp, _, args| Ok(Value::Number(f(interp.to_number(&arg(args, 0))))))
}

fn error_constructor(name: &'static str) -> NativeFn {
    native_fn(move |interp, _, args| {
        let message = match args.first() {
            Some(Value::Undefined) | None => String::new(),
            Some(value) => interp.to_string(value),
        };
        Ok(interp.make_error(name, &message))
    })
}

/// Install the standard globals into a fresh context
pub(crate) fn install(heap: &mut Heap, global: ObjectId) -> ScriptResult<()> {
    let math = namespace(
        heap,
        vec![
            ("abs", math_unary(f64::abs)),
            ("floor", math_unary(f64::floor)),
            ("ceil", math_unary(f64::ceil)),
            ("round", math_unary(|x| (x + 0.5).floor())),
            ("sqrt", math_unary(f64::sqrt)),
            ("trunc", math_unary(f64::trunc)),
            (
                "pow",
                native_fn(|interp, _, args| {
                    let base = interp.to_number(&arg(args, 0));
                    Ok(Value::Number(base.powf(interp.to_number(&arg(args, 1)))))
                }),
            ),
            (
                "max",
                native_fn(|interp, _, args| {
                    Ok(Value::Number(args.iter().fold(f64::NEG_INFINITY, |acc, v| {
                        let n = interp.to_number(v);
                        if n.is_nan() || acc.is_nan() {
                            f64::NAN
                        } else {
                            acc.max(n)
                        }
                    })))
                }),
            ),
            (
                "min",
                native_fn(|interp, _, args| {
                    Ok(Value::Number(args.iter().fold(f64::INFINITY, |acc, v| {
                        let n = interp.to_number(v);
                        if n.is_nan() || acc.is_nan() {
                            f64::NAN
                        } else {
                            acc.min(n)
                        }
                    })))
                }),
            ),
            (
                "random",
                native_fn(|_, _, _| Ok(Value::Number(rand::thread_rng().gen::<f64>()))),
            ),
        ],
    );
    if let Value::Object(id) = &math {
        if let Some(HeapObject::Object(map)) = heap.get_mut(*id) {
            map.insert(Arc::from("PI"), Value::Number(std::f64::consts::PI));
        }
    }
    define_global(heap, global, "Math", math)?;

    let json = namespace(
        heap,
        vec![
            (
                "stringify",
                native_fn(|interp, _, args| {
                    let indent = matches!(args.get(2), Some(Value::Number(n)) if *n > 0.0);
                    Ok(json::stringify(interp.heap(), &arg(args, 0), indent)?
                        .map(Value::from)
                        .unwrap_or_default())
                }),
            ),
            (
                "parse",
                native_fn(|interp, _, args| {
                    let text = interp.to_string(&arg(args, 0));
                    json::parse(interp.heap_mut(), &text)
                }),
            ),
        ],
    );
    define_global(heap, global, "JSON", json)?;

    let object = namespace(
        heap,
        vec![(
            "keys",
            native_fn(|interp, _, args| {
                let target = arg(args, 0).as_object().and_then(|id| interp.heap().get(id));
                let keys: Vec<Value> = match target {
                    Some(HeapObject::Object(map)) => {
                        map.keys().map(|k| Value::String(k.clone())).collect()
                    }
                    Some(HeapObject::Array(items)) => {
                        (0..items.len()).map(|i| Value::from(i.to_string())).collect()
                    }
                    _ => Vec::new(),
                };
                Ok(interp.heap_mut().alloc_array(keys))
            }),
        )],
    );
    define_global(heap, global, "Object", object)?;

    let array = namespace(
        heap,
        vec![(
            "isArray",
            native_fn(|interp, _, args| {
                let is_array = arg(args, 0)
                    .as_object()
                    .map_or(false, |id| interp.heap().array(id).is_some());
                Ok(Value::Bool(is_array))
            }),
        )],
    );
    define_global(heap, global, "Array", array)?;

    let functions: Vec<(&str, NativeFn)> = vec![
        (
            "String",
            native_fn(|interp, _, args| {
                Ok(match args.first() {
                    Some(value) => Value::from(interp.to_string(value)),
                    None => Value::string(""),
                })
            }),
        ),
        (
            "Number",
            native_fn(|interp, _, args| {
                Ok(Value::Number(match args.first() {
                    Some(value) => interp.to_number(value),
                    None => 0.0,
                }))
            }),
        ),
        (
            "Boolean",
            native_fn(|_, _, args| Ok(Value::Bool(arg(args, 0).truthy()))),
        ),
        (
            "isNaN",
            native_fn(|interp, _, args| Ok(Value::Bool(interp.to_number(&arg(args, 0)).is_nan()))),
        ),
        (
            "parseInt",
            native_fn(|interp, _, args| {
                let text = interp.to_string(&arg(args, 0));
                let radix = match args.get(1) {
                    Some(Value::Number(r)) if (2.0..=36.0).contains(r) => *r as u32,
                    _ => 10,
                };
                Ok(Value::Number(parse_int(&text, radix)))
            }),
        ),
        (
            "parseFloat",
            native_fn(|interp, _, args| {
                let text = interp.to_string(&arg(args, 0));
                Ok(Value::Number(parse_float(&text)))
            }),
        ),
        ("Error", error_constructor("Error")),
        ("TypeError", error_constructor("TypeError")),
        ("RangeError", error_constructor("RangeError")),
    ];
    for (name, func) in functions {
        let value = heap.alloc_native(name, func);
        define_global(heap, global, name, value)?;
    }
    define_global(heap, global, "NaN", Value::Number(f64::NAN))?;
    define_global(heap, global, "Infinity", Value::Number(f64::INFINITY))?;
    Ok(())
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let valid: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    let value = valid
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses as a number
    let mut best = f64::NAN;
    for (index, ch) in trimmed.char_indices() {
        if !(ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E')) {
            break;
        }
        if let Ok(n) = trimmed[..index + 1].parse::<f64>() {
            best = n;
        }
    }
    best
}

// ============================================================================
// Primitive methods
// ============================================================================

/// Properties of string primitives
pub(crate) fn string_property(s: &str, key: &str) -> Value {
    if key == "length" {
        return Value::Number(s.chars().count() as f64);
    }
    key.parse::<usize>()
        .ok()
        .and_then(|i| s.chars().nth(i))
        .map(|c| Value::from(c.to_string()))
        .unwrap_or_default()
}

/// Dispatch a method call on an array, string or number receiver.
///
/// `Ok(None)` means the receiver has no such built-in method and normal
/// property lookup should proceed.
pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> ScriptResult<Option<Value>> {
    match receiver {
        Value::String(s) => Ok(string_method(interp, s, name, args)),
        Value::Number(n) => Ok(number_method(*n, name, args)),
        Value::Object(id) if interp.heap().array(*id).is_some() => {
            array_method(interp, receiver, *id, name, args)
        }
        _ => Ok(None),
    }
}

fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        Some(Value::Number(n)) if n.is_finite() => {
            let n = n.trunc();
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
        _ => default,
    }
}

fn string_method(
    interp: &mut Interpreter<'_>,
    s: &str,
    name: &str,
    args: &[Value],
) -> Option<Value> {
    let text_arg = |interp: &Interpreter<'_>, index: usize| match args.get(index) {
        Some(value) => interp.to_string(value),
        None => "undefined".to_string(),
    };
    let value = match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "toString" => Value::string(s),
        "indexOf" => {
            let needle = text_arg(&*interp, 0);
            Value::Number(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            })
        }
        "includes" => Value::Bool(s.contains(&text_arg(&*interp, 0))),
        "startsWith" => Value::Bool(s.starts_with(&text_arg(&*interp, 0))),
        "endsWith" => Value::Bool(s.ends_with(&text_arg(&*interp, 0))),
        "charAt" => {
            let index = relative_index(args.first(), usize::MAX, 0);
            Value::from(s.chars().nth(index).map(String::from).unwrap_or_default())
        }
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            Value::from(if start < end {
                chars[start..end].iter().collect::<String>()
            } else {
                String::new()
            })
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::string(s)],
                Some(separator) => {
                    let separator = interp.to_string(separator);
                    if separator.is_empty() {
                        s.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            interp.heap_mut().alloc_array(parts)
        }
        _ => return None,
    };
    Some(value)
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "toFixed" => {
            let digits = match args.first() {
                Some(Value::Number(d)) => d.clamp(0.0, 100.0) as usize,
                _ => 0,
            };
            Some(Value::from(format!("{:.*}", digits, n)))
        }
        "toString" => Some(Value::from(number_to_string(n))),
        _ => None,
    }
}

fn array_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    id: ObjectId,
    name: &str,
    args: &[Value],
) -> ScriptResult<Option<Value>> {
    let snapshot = |interp: &Interpreter<'_>| interp.heap().array(id).cloned().unwrap_or_default();
    let value = match name {
        "push" => {
            let items = interp
                .heap_mut()
                .array_mut(id)
                .ok_or_else(|| ScriptError::InvalidHandle(format!("array {}", id)))?;
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => interp
            .heap_mut()
            .array_mut(id)
            .and_then(|items| items.pop())
            .unwrap_or_default(),
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(value) => interp.to_string(value),
            };
            let parts: Vec<String> = snapshot(interp)
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => interp.to_string(other),
                })
                .collect();
            Value::from(parts.join(&separator))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                snapshot(interp)
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(snapshot(interp).iter().any(|item| item.strict_equals(&needle)))
        }
        "slice" => {
            let items = snapshot(interp);
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            let sliced = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            interp.heap_mut().alloc_array(sliced)
        }
        "map" | "filter" | "forEach" | "find" | "some" | "every" => {
            let callback = arg(args, 0);
            if !interp.heap().is_callable(&callback) {
                return Err(ScriptError::type_error(format!(
                    "{} is not a function",
                    interp.to_string(&callback)
                )));
            }
            let items = snapshot(interp);
            let mut mapped = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let result = interp.call(
                    &callback,
                    &Value::Undefined,
                    &[item.clone(), Value::Number(index as f64), receiver.clone()],
                )?;
                match name {
                    "map" => mapped.push(result),
                    "filter" if result.truthy() => mapped.push(item.clone()),
                    "find" if result.truthy() => return Ok(Some(item.clone())),
                    "some" if result.truthy() => return Ok(Some(Value::Bool(true))),
                    "every" if !result.truthy() => return Ok(Some(Value::Bool(false))),
                    _ => {}
                }
            }
            match name {
                "map" | "filter" => interp.heap_mut().alloc_array(mapped),
                "some" => Value::Bool(false),
                "every" => Value::Bool(true),
                _ => Value::Undefined,
            }
        }
        "reduce" => {
            let callback = arg(args, 0);
            if !interp.heap().is_callable(&callback) {
                return Err(ScriptError::type_error(format!(
                    "{} is not a function",
                    interp.to_string(&callback)
                )));
            }
            let items = snapshot(interp);
            let mut iter = items.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(ScriptError::type_error(
                            "Reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (index, item) in iter {
                acc = interp.call(
                    &callback,
                    &Value::Undefined,
                    &[acc, item, Value::Number(index as f64), receiver.clone()],
                )?;
            }
            acc
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}
