//! Script error types

use crate::token::{Position, Span};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Result alias used throughout the engine
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Built-in error constructor names for runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    ReferenceError,
    RangeError,
    SyntaxError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure raised by native code (host objects or native functions).
///
/// `source` keeps the original typed error so an embedder can recover it
/// with `downcast_ref` after the fault crossed script frames.
#[derive(Debug, Clone)]
pub struct NativeFault {
    pub kind: String,
    pub message: String,
    pub position: Option<Position>,
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl NativeFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            position: None,
            source: None,
        }
    }

    /// Fault carrying a typed error; `kind` is what scripts see as `e.name`.
    pub fn with_source<E>(kind: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            message: error.to_string(),
            position: None,
            source: Some(Arc::new(error)),
        }
    }

    /// The typed error this fault was built from, if it is an `E`
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Display for NativeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors produced while compiling or running script code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    /// Source failed to lex or parse
    #[error("SyntaxError: {message} ({position})")]
    Syntax { message: String, position: Position },

    /// Engine-raised runtime error (TypeError, ReferenceError, ...)
    #[error("{kind}: {message}")]
    Runtime {
        kind: ErrorKind,
        message: String,
        position: Option<Position>,
    },

    /// Value thrown by script code and not caught
    #[error("Uncaught {message}")]
    Thrown {
        value: Value,
        message: String,
        position: Option<Position>,
    },

    /// Error raised by native code
    #[error("{0}")]
    Native(NativeFault),

    /// Context, object or persistent handle that no longer resolves
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        ScriptError::Syntax {
            message: message.into(),
            position: span.position(),
        }
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::ReferenceError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::RangeError, message)
    }

    /// Attach a source position if the error does not carry one yet
    pub fn at(mut self, span: Span) -> Self {
        if let Some(slot) = self.position_slot() {
            if slot.is_none() {
                *slot = Some(span.position());
            }
        }
        self
    }

    fn position_slot(&mut self) -> Option<&mut Option<Position>> {
        match self {
            ScriptError::Runtime { position, .. } | ScriptError::Thrown { position, .. } => {
                Some(position)
            }
            ScriptError::Native(fault) => Some(&mut fault.position),
            ScriptError::Syntax { .. } | ScriptError::InvalidHandle(_) => None,
        }
    }

    /// Source position, when known
    pub fn position(&self) -> Option<Position> {
        match self {
            ScriptError::Syntax { position, .. } => Some(*position),
            ScriptError::Runtime { position, .. } | ScriptError::Thrown { position, .. } => {
                *position
            }
            ScriptError::Native(fault) => fault.position,
            ScriptError::InvalidHandle(_) => None,
        }
    }

    /// Name a script would observe as `e.name`
    pub fn kind_name(&self) -> String {
        match self {
            ScriptError::Syntax { .. } => "SyntaxError".to_string(),
            ScriptError::Runtime { kind, .. } => kind.name().to_string(),
            ScriptError::Thrown { .. } => "Error".to_string(),
            ScriptError::Native(fault) => fault.kind.clone(),
            ScriptError::InvalidHandle(_) => "ReferenceError".to_string(),
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            ScriptError::Syntax { message, .. }
            | ScriptError::Runtime { message, .. }
            | ScriptError::Thrown { message, .. } => message.clone(),
            ScriptError::Native(fault) => fault.message.clone(),
            ScriptError::InvalidHandle(what) => what.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[test]
    fn test_native_fault_downcast() {
        let fault = NativeFault::with_source("BoomError", Boom(3));
        assert_eq!(fault.message, "boom 3");
        assert_eq!(fault.downcast_ref::<Boom>().map(|b| b.0), Some(3));
        assert!(fault.downcast_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn test_at_keeps_first_position() {
        let first = Span::new(0, 1, 2, 3);
        let second = Span::new(5, 6, 9, 9);
        let err = ScriptError::type_error("x").at(first).at(second);
        assert_eq!(err.position(), Some(Position { line: 2, column: 3 }));
        assert_eq!(err.to_string(), "TypeError: x");
    }
}
