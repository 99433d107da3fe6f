//! Host error types

use crate::heap::ObjectRef;
use std::fmt;

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// An exception thrown by host code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    /// Fully qualified exception class, e.g. `java.lang.IllegalStateException`
    pub class: String,
    pub message: String,
}

impl HostException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalArgumentException", message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalStateException", message)
    }

    pub fn class_cast(message: impl Into<String>) -> Self {
        Self::new("java.lang.ClassCastException", message)
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for HostException {}

/// Failures of the host environment itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("No such method: {class}.{name} taking {arity} arguments")]
    NoSuchMethod {
        class: String,
        name: String,
        arity: usize,
    },

    /// Arguments do not conform to the declared parameter types
    #[error("Argument mismatch calling {target}: expected {expected}, got {found}")]
    ArgumentMismatch {
        target: String,
        expected: String,
        found: String,
    },

    /// Object reference is stale or from another environment
    #[error("Invalid object reference {0}")]
    InvalidObject(ObjectRef),

    #[error("Cannot attach thread: {0}")]
    Attach(String),

    #[error("Host environment is shut down")]
    ShutDown,

    /// Host code threw
    #[error("{0}")]
    Exception(HostException),
}

impl From<HostException> for HostError {
    fn from(exception: HostException) -> Self {
        HostError::Exception(exception)
    }
}
