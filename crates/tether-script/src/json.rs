//! JSON conversion for script values
//!
//! Both directions go through `serde_json::Value`, so the host side can
//! consume the same tree that `JSON.stringify` renders.

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::heap::Heap;
use crate::object::HeapObject;
use crate::value::{ObjectId, Value};
use indexmap::IndexMap;
use serde_json::{Map, Number};
use std::sync::Arc;

/// Deepest array/object nesting [`to_json`] converts
pub const MAX_NESTING: usize = 512;

/// Convert a value to a JSON tree.
///
/// Returns `None` for values JSON cannot represent at the top level
/// (`undefined` and functions). Structures nested deeper than
/// [`MAX_NESTING`] fail with a `RangeError`.
pub fn to_json(heap: &Heap, value: &Value) -> ScriptResult<Option<serde_json::Value>> {
    let mut stack = Vec::new();
    convert(heap, value, &mut stack)
}

fn convert(
    heap: &Heap,
    value: &Value,
    stack: &mut Vec<ObjectId>,
) -> ScriptResult<Option<serde_json::Value>> {
    let json = match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Object(id) => {
            if stack.contains(id) {
                return Err(ScriptError::type_error(
                    "Converting circular structure to JSON",
                ));
            }
            if stack.len() >= MAX_NESTING {
                return Err(ScriptError::range_error(format!(
                    "Structure nested deeper than {} levels cannot be converted to JSON",
                    MAX_NESTING
                )));
            }
            stack.push(*id);
            let converted = match heap.get(*id) {
                Some(HeapObject::Array(items)) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(convert(heap, item, stack)?.unwrap_or(serde_json::Value::Null));
                    }
                    Some(serde_json::Value::Array(out))
                }
                Some(HeapObject::Object(map)) => {
                    let mut out = Map::new();
                    for (key, item) in map {
                        if let Some(item) = convert(heap, item, stack)? {
                            out.insert(key.to_string(), item);
                        }
                    }
                    Some(serde_json::Value::Object(out))
                }
                Some(HeapObject::Host(object)) if !object.is_callable() => {
                    Some(serde_json::Value::String(object.display()))
                }
                Some(_) => None,
                None => return Err(ScriptError::InvalidHandle(format!("object {}", id))),
            };
            stack.pop();
            return Ok(converted);
        }
    };
    Ok(Some(json))
}

fn number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// `JSON.stringify(value)`; `pretty` indents with two spaces
pub fn stringify(heap: &Heap, value: &Value, pretty: bool) -> ScriptResult<Option<String>> {
    let Some(json) = to_json(heap, value)? else {
        return Ok(None);
    };
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Some)
        .map_err(|e| ScriptError::runtime(ErrorKind::Error, e.to_string()))
}

/// Build script values from a JSON tree
pub fn from_json(heap: &mut Heap, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            let values = items.iter().map(|item| from_json(heap, item)).collect();
            heap.alloc_array(values)
        }
        serde_json::Value::Object(map) => {
            let mut properties = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                let value = from_json(heap, item);
                properties.insert(Arc::from(key.as_str()), value);
            }
            heap.alloc_object(properties)
        }
    }
}

/// `JSON.parse(text)`
pub fn parse(heap: &mut Heap, text: &str) -> ScriptResult<Value> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        ScriptError::runtime(
            ErrorKind::SyntaxError,
            format!("Unexpected token in JSON at line {} column {}", e.line(), e.column()),
        )
    })?;
    Ok(from_json(heap, &json))
}
