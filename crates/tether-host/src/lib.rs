//! Tether host environment
//!
//! A reflective host runtime for the bridge to talk to: classes with
//! typed method descriptors, a reference-counted object heap with
//! generation-checked references, per-thread attachment and a main-loop
//! message queue.

pub mod class;
pub mod env;
pub mod error;
pub mod heap;
pub mod looper;
pub mod object;
pub mod sample;
pub mod types;
pub mod value;

pub use class::{ClassBuilder, ConstructorDescriptor, HostClass, MethodDescriptor, MethodKind};
pub use env::{HostConfig, HostEnvironment};
pub use error::{HostError, HostException, HostResult};
pub use heap::{HostHeap, ObjectRef};
pub use looper::MainLoop;
pub use object::HostObject;
pub use types::{normalize_class_name, HostType, OBJECT_CLASS, STRING_CLASS};
pub use value::HostValue;
