//! Marshaled host values

use crate::heap::ObjectRef;
use crate::types::HostType;
use std::fmt;

/// A value crossing the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Result of a `void` method
    Void,
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Array with its declared element type
    Array {
        element: HostType,
        items: Vec<HostValue>,
    },
    Object(ObjectRef),
}

impl HostValue {
    pub fn string(s: impl Into<String>) -> Self {
        HostValue::String(s.into())
    }

    pub fn int_array(items: impl IntoIterator<Item = i32>) -> Self {
        HostValue::Array {
            element: HostType::Int,
            items: items.into_iter().map(HostValue::Int).collect(),
        }
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Void => "void".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Boolean(_) => "boolean".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Long(_) => "long".to_string(),
            HostValue::Double(_) => "double".to_string(),
            HostValue::String(_) => "java.lang.String".to_string(),
            HostValue::Array { element, .. } => format!("{}[]", element),
            HostValue::Object(_) => "object".to_string(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            HostValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            HostValue::Long(n) => Some(*n),
            HostValue::Int(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            HostValue::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload; `None` for null and non-strings
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            HostValue::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array { items, .. } => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Void => f.write_str("void"),
            HostValue::Null => f.write_str("null"),
            HostValue::Boolean(b) => write!(f, "{}", b),
            HostValue::Int(n) => write!(f, "{}", n),
            HostValue::Long(n) => write!(f, "{}", n),
            HostValue::Double(n) => write!(f, "{}", n),
            HostValue::String(s) => f.write_str(s),
            HostValue::Array { items, .. } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            HostValue::Object(r) => write!(f, "object {}", r),
        }
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Int(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Long(n)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Double(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Boolean(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}
