//! Value conversion across the bridge

use crate::error::{BridgeError, BridgeResult};
use crate::reflection::ReflectionBridge;
use crate::wrapper::WrapperObject;
use std::sync::Arc;
use tether_host::{HostType, HostValue, OBJECT_CLASS};
use tether_script::value::number_to_string;
use tether_script::{Heap, HeapObject, Interpreter, Value};

// 2^63 as f64; i64::MAX itself is not representable
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Short description of a script value for marshal errors
pub fn describe(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) => format!("number {}", number_to_string(*n)),
        Value::String(_) => "string".to_string(),
        Value::Object(id) => match heap.get(*id) {
            Some(HeapObject::Array(_)) => "array".to_string(),
            Some(HeapObject::Host(object)) => {
                match object.as_any().downcast_ref::<WrapperObject>() {
                    Some(wrapper) if wrapper.is_bound() => "bound method".to_string(),
                    Some(wrapper) if wrapper.receiver().is_none() => {
                        format!("class {}", wrapper.class().name())
                    }
                    Some(wrapper) => wrapper.class().name().to_string(),
                    None => object.class_name().to_string(),
                }
            }
            Some(HeapObject::Closure(_)) | Some(HeapObject::Native(_)) => "function".to_string(),
            Some(_) => "object".to_string(),
            None => "released object".to_string(),
        },
    }
}

fn mismatch(heap: &Heap, index: usize, ty: &HostType, value: &Value) -> BridgeError {
    BridgeError::Marshal {
        index,
        expected: ty.to_string(),
        found: describe(heap, value),
    }
}

fn integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

/// Convert argument `index` to the declared parameter type
pub fn to_host(heap: &Heap, index: usize, value: &Value, ty: &HostType) -> BridgeResult<HostValue> {
    let converted = match (ty, value) {
        (ty, Value::Undefined | Value::Null) if ty.is_reference() => Some(HostValue::Null),
        (HostType::Boolean, Value::Bool(b)) => Some(HostValue::Boolean(*b)),
        (HostType::Int, Value::Number(n))
            if integral(*n) && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 =>
        {
            Some(HostValue::Int(*n as i32))
        }
        (HostType::Long, Value::Number(n))
            if integral(*n) && *n >= -I64_BOUND && *n < I64_BOUND =>
        {
            Some(HostValue::Long(*n as i64))
        }
        (HostType::Double, Value::Number(n)) => Some(HostValue::Double(*n)),
        (HostType::String, Value::String(s)) => Some(HostValue::String(s.to_string())),
        (HostType::Array(element), Value::Object(id)) => match heap.array(*id) {
            Some(items) => return array_to_host(heap, index, items, element),
            None => None,
        },
        (HostType::Object(class), Value::String(s)) if &**class == OBJECT_CLASS => {
            Some(HostValue::String(s.to_string()))
        }
        (HostType::Object(class), Value::Object(_)) => heap
            .host_as::<WrapperObject>(value)
            .filter(|wrapper| !wrapper.is_bound())
            .and_then(|wrapper| {
                let identity = wrapper.receiver_identity()?;
                let matches = &**class == OBJECT_CLASS || wrapper.class().name() == &**class;
                matches.then_some(HostValue::Object(identity))
            }),
        _ => None,
    };
    converted.ok_or_else(|| mismatch(heap, index, ty, value))
}

fn array_to_host(
    heap: &Heap,
    index: usize,
    items: &[Value],
    element: &HostType,
) -> BridgeResult<HostValue> {
    if let HostType::Array(_) = element {
        return Err(BridgeError::Marshal {
            index,
            expected: HostType::array_of(element.clone()).to_string(),
            found: "nested arrays are not supported".to_string(),
        });
    }
    let items = items
        .iter()
        .map(|item| {
            to_host(heap, index, item, element).map_err(|err| match err {
                BridgeError::Marshal { found, .. } => BridgeError::Marshal {
                    index,
                    expected: HostType::array_of(element.clone()).to_string(),
                    found: format!("array containing {}", found),
                },
                other => other,
            })
        })
        .collect::<BridgeResult<Vec<_>>>()?;
    Ok(HostValue::Array {
        element: element.clone(),
        items,
    })
}

/// Convert a full argument list against `params`. Arity is checked by the
/// caller.
pub fn to_host_args(
    heap: &Heap,
    args: &[Value],
    params: &[HostType],
) -> BridgeResult<Vec<HostValue>> {
    args.iter()
        .zip(params)
        .enumerate()
        .map(|(index, (value, ty))| to_host(heap, index, value, ty))
        .collect()
}

/// Convert a host value into the script heap. Object references become
/// fresh unbound wrappers using the construction strategy.
pub fn to_script(
    bridge: &Arc<ReflectionBridge>,
    interp: &mut Interpreter<'_>,
    value: HostValue,
) -> BridgeResult<Value> {
    Ok(match value {
        HostValue::Void => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Boolean(b) => Value::Bool(b),
        HostValue::Int(n) => Value::Number(n as f64),
        HostValue::Long(n) => Value::Number(n as f64),
        HostValue::Double(n) => Value::Number(n),
        HostValue::String(s) => Value::string(s),
        HostValue::Array { items, .. } => {
            let items = items
                .into_iter()
                .map(|item| to_script(bridge, interp, item))
                .collect::<BridgeResult<Vec<_>>>()?;
            interp.heap_mut().alloc_array(items)
        }
        HostValue::Object(identity) => {
            let wrapper = bridge.wrap_object(identity, bridge.construction_strategy())?;
            interp.heap_mut().alloc_host(Arc::new(wrapper))
        }
    })
}
