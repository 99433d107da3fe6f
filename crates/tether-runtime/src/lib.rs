//! Tether runtime: the bridge between the script engine and the host
//!
//! Host code drives an [`IsolateRuntime`]: it creates contexts, evaluates
//! source into [`ResultHandle`]s and creates host objects as
//! [`WrapperHandle`]s. Script code sees host classes and objects as
//! [`WrapperObject`]s whose members are bound lazily on read and resolved
//! against the host's reflection data when called.

pub mod config;
pub mod error;
pub mod globals;
pub mod handles;
pub mod invoke;
pub mod marshal;
pub mod reflection;
pub mod result;
pub mod runtime;
pub mod services;
pub mod timer;
pub mod wrapper;

pub use config::{BridgeConfig, ConfigError, ReflectionStrategy};
pub use error::{BridgeError, BridgeResult};
pub use handles::{HandleTable, StrongRef};
pub use invoke::{EchoInvoker, Invoker, ReflectiveInvoker};
pub use reflection::{MethodTable, ReflectionBridge, TableEntry};
pub use result::{ResultHandle, WrapperHandle};
pub use runtime::{GcReport, IsolateRuntime, RuntimeState, Scope};
pub use services::{Channel, HostServices, RecordingServices, TracingServices};
pub use timer::{TimerId, TimerMode};
pub use wrapper::{BindingOrigin, WrapperObject};
