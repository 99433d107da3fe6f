//! Host type system
//!
//! Types render two ways: a source-style name (`int[]`, `java.lang.String`)
//! for diagnostics and a JNI-style descriptor (`[I`, `Ljava/lang/String;`)
//! for signatures.

use std::fmt;
use std::sync::Arc;

/// The root class every object type is assignable to
pub const OBJECT_CLASS: &str = "java.lang.Object";

/// The string class
pub const STRING_CLASS: &str = "java.lang.String";

/// Declared type of a parameter, return value or array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostType {
    Void,
    Boolean,
    Int,
    Long,
    Double,
    String,
    Array(Box<HostType>),
    /// Instance of the named class
    Object(Arc<str>),
}

impl HostType {
    pub fn array_of(element: HostType) -> Self {
        HostType::Array(Box::new(element))
    }

    pub fn object(class: &str) -> Self {
        HostType::Object(Arc::from(class))
    }

    /// True for types whose values may be null
    pub fn is_reference(&self) -> bool {
        matches!(self, HostType::String | HostType::Array(_) | HostType::Object(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, HostType::Void)
    }

    /// JNI-style descriptor
    pub fn descriptor(&self) -> String {
        match self {
            HostType::Void => "V".to_string(),
            HostType::Boolean => "Z".to_string(),
            HostType::Int => "I".to_string(),
            HostType::Long => "J".to_string(),
            HostType::Double => "D".to_string(),
            HostType::String => format!("L{};", STRING_CLASS.replace('.', "/")),
            HostType::Array(element) => format!("[{}", element.descriptor()),
            HostType::Object(class) => format!("L{};", class.replace('.', "/")),
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Void => f.write_str("void"),
            HostType::Boolean => f.write_str("boolean"),
            HostType::Int => f.write_str("int"),
            HostType::Long => f.write_str("long"),
            HostType::Double => f.write_str("double"),
            HostType::String => f.write_str(STRING_CLASS),
            HostType::Array(element) => write!(f, "{}[]", element),
            HostType::Object(class) => f.write_str(class),
        }
    }
}

/// `(params)ret` descriptor
pub fn method_signature(params: &[HostType], ret: &HostType) -> String {
    let mut out = String::from("(");
    for param in params {
        out.push_str(&param.descriptor());
    }
    out.push(')');
    out.push_str(&ret.descriptor());
    out
}

/// Canonical dotted class name; accepts `a/b/C` and `a.b.C`
pub fn normalize_class_name(name: &str) -> String {
    name.trim().replace('/', ".")
}
