//! Script globals the bridge installs into every context

use crate::error::{BridgeError, BridgeResult};
use crate::invoke;
use crate::marshal;
use crate::reflection::ReflectionBridge;
use crate::services::HostServices;
use crate::timer::{TimerBridge, TimerId, TimerMode};
use std::sync::Arc;
use tether_script::{
    json, native_fn, ContextId, GlobalTemplate, HeapObject, Interpreter, NativeFn, Value,
};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn active_context(interp: &Interpreter<'_>) -> BridgeResult<ContextId> {
    interp
        .context()
        .ok_or_else(|| BridgeError::InvalidHandle("no active context".to_string()))
}

fn class_name_arg(interp: &Interpreter<'_>, args: &[Value]) -> BridgeResult<String> {
    match args.first() {
        Some(Value::String(name)) => Ok(name.to_string()),
        other => Err(BridgeError::type_mismatch(
            "class name string",
            marshal::describe(interp.heap(), other.unwrap_or(&Value::Undefined)),
        )),
    }
}

/// Text handed to the notification services. Arrays and plain objects are
/// rendered as JSON, everything else through the usual string conversion.
pub fn render(interp: &Interpreter<'_>, value: &Value) -> String {
    if let Value::Object(id) = value {
        if let Some(HeapObject::Array(_) | HeapObject::Object(_)) = interp.heap().get(*id) {
            if let Ok(Some(text)) = json::stringify(interp.heap(), value, false) {
                return text;
            }
        }
    }
    interp.to_string(value)
}

fn render_all(interp: &Interpreter<'_>, args: &[Value]) -> String {
    args.iter()
        .map(|value| render(interp, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn timer_id(interp: &Interpreter<'_>, args: &[Value]) -> Option<TimerId> {
    let n = interp.to_number(&arg(args, 0));
    (n.is_finite() && n >= 1.0 && n.fract() == 0.0).then(|| TimerId(n as u64))
}

fn schedule(timers: &Arc<TimerBridge>, mode: TimerMode) -> NativeFn {
    let timers = timers.clone();
    native_fn(move |interp, _, args| {
        let context = active_context(interp)?;
        let delay = match args.get(1) {
            Some(value) => interp.to_number(value),
            None => 0.0,
        };
        let id = timers.schedule(interp.heap_mut(), context, arg(args, 0), delay, mode)?;
        Ok(Value::Number(id.0 as f64))
    })
}

fn clear(timers: &Arc<TimerBridge>) -> NativeFn {
    let timers = timers.clone();
    native_fn(move |interp, _, args| {
        if let Some(id) = timer_id(interp, args) {
            timers.cancel(interp.heap_mut(), id);
        }
        Ok(Value::Undefined)
    })
}

/// Register the bridge globals on `template`
pub(crate) fn install(
    template: &mut GlobalTemplate,
    bridge: &Arc<ReflectionBridge>,
    timers: &Arc<TimerBridge>,
    services: &Arc<dyn HostServices>,
) {
    let lookup = bridge.clone();
    template.set_namespace(
        "Class",
        "forName",
        native_fn(move |interp, _, args| {
            let name = class_name_arg(interp, args)?;
            let class = lookup.resolve_class(&name)?;
            let wrapper = lookup.wrap_class(class, lookup.class_lookup_strategy());
            Ok(interp.heap_mut().alloc_host(Arc::new(wrapper)))
        }),
    );

    let factory = bridge.clone();
    template.set_function(
        "createInstance",
        native_fn(move |interp, _, args| {
            let name = class_name_arg(interp, args)?;
            let class = factory.resolve_class(&name)?;
            let rest = args.get(1..).unwrap_or_default();
            Ok(invoke::construct(&factory, interp, &class, rest)?)
        }),
    );

    let notify = services.clone();
    template.set_function(
        "$notify",
        native_fn(move |interp, _, args| {
            notify.notify(&interp.to_string(&arg(args, 0)));
            Ok(Value::Undefined)
        }),
    );

    let log = services.clone();
    template.set_function(
        "$log",
        native_fn(move |interp, _, args| {
            log.log(&render(interp, &arg(args, 0)));
            Ok(Value::Undefined)
        }),
    );

    let error = services.clone();
    template.set_function(
        "$error",
        native_fn(move |interp, _, args| {
            error.error(&render(interp, &arg(args, 0)));
            Ok(Value::Undefined)
        }),
    );

    let console_log = services.clone();
    template.set_namespace(
        "console",
        "log",
        native_fn(move |interp, _, args| {
            console_log.log(&render_all(interp, args));
            Ok(Value::Undefined)
        }),
    );

    let console_error = services.clone();
    template.set_namespace(
        "console",
        "error",
        native_fn(move |interp, _, args| {
            console_error.error(&render_all(interp, args));
            Ok(Value::Undefined)
        }),
    );

    template.set_function("setTimeout", schedule(timers, TimerMode::OneShot));
    template.set_function("setInterval", schedule(timers, TimerMode::Periodic));
    template.set_function("clearTimeout", clear(timers));
    template.set_function("clearInterval", clear(timers));
}
