//! Bridge error taxonomy

use tether_host::HostError;
use tether_script::{NativeFault, Position, ScriptError};

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the bridge.
///
/// Inside scripts each variant is catchable and reports [`BridgeError::kind`]
/// as `e.name`; once the error leaves the script it is recovered with its
/// original variant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("no method {class}.{method} accepting {arity} arguments")]
    MethodNotFound {
        class: String,
        method: String,
        arity: usize,
    },

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("cannot marshal argument {index}: expected {expected}, found {found}")]
    Marshal {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("{exception}: {message}")]
    HostInvocation { exception: String, message: String },

    #[error("{message} at {line}:{column}")]
    Compile {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("{message}")]
    ScriptRuntime {
        message: String,
        position: Option<Position>,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("thread attachment failed: {0}")]
    Attachment(String),

    #[error("reflection failed: {0}")]
    Reflection(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("runtime is shut down")]
    ShutDown,
}

impl BridgeError {
    /// Name scripts observe as `e.name`
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::ClassNotFound(_) => "ClassNotFoundError",
            BridgeError::MethodNotFound { .. } => "MethodNotFoundError",
            BridgeError::NotCallable(_) => "NotCallableError",
            BridgeError::Marshal { .. } => "MarshalError",
            BridgeError::HostInvocation { .. } => "HostInvocationError",
            BridgeError::Compile { .. } => "CompileError",
            BridgeError::ScriptRuntime { .. } => "ScriptRuntimeError",
            BridgeError::TypeMismatch { .. } => "TypeMismatchError",
            BridgeError::Attachment(_) => "AttachmentError",
            BridgeError::Reflection(_) => "ReflectionError",
            BridgeError::InvalidHandle(_) => "InvalidHandleError",
            BridgeError::ShutDown => "ShutDownError",
        }
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::ClassNotFound(name) => BridgeError::ClassNotFound(name),
            HostError::NoSuchMethod { class, name, arity } => BridgeError::MethodNotFound {
                class,
                method: name,
                arity,
            },
            HostError::Exception(exception) => BridgeError::HostInvocation {
                exception: exception.class,
                message: exception.message,
            },
            HostError::Attach(message) => BridgeError::Attachment(message),
            HostError::ShutDown => BridgeError::ShutDown,
            other @ (HostError::ArgumentMismatch { .. } | HostError::InvalidObject(_)) => {
                BridgeError::Reflection(other.to_string())
            }
        }
    }
}

impl From<ScriptError> for BridgeError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Syntax { message, position } => BridgeError::Compile {
                message,
                line: position.line,
                column: position.column,
            },
            ScriptError::Native(fault) => match fault.downcast_ref::<BridgeError>() {
                Some(original) => original.clone(),
                None => BridgeError::ScriptRuntime {
                    message: fault.to_string(),
                    position: fault.position,
                },
            },
            ScriptError::InvalidHandle(what) => BridgeError::InvalidHandle(what),
            other => {
                let position = other.position();
                BridgeError::ScriptRuntime {
                    message: other.to_string(),
                    position,
                }
            }
        }
    }
}

impl From<BridgeError> for ScriptError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::InvalidHandle(what) => ScriptError::InvalidHandle(what),
            other => ScriptError::Native(NativeFault::with_source(other.kind(), other)),
        }
    }
}
