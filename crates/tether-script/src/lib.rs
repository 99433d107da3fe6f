//! Tether script engine
//!
//! A compact JavaScript-subset interpreter built for embedding. Source is
//! lexed with `logos`, parsed into an AST and evaluated by a tree-walking
//! [`Interpreter`] over a garbage-collected [`Heap`]. Embedders talk to it
//! through an [`Isolate`], which owns the heap and its contexts.
//!
//! Objects implemented outside the engine plug in through the
//! [`NativeObject`] trait; values the embedder must keep alive between
//! entries are pinned with [`Persistent`] handles.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod heap;
pub mod interpreter;
pub mod isolate;
pub mod json;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod token;
pub mod value;

pub use builtins::native_fn;
pub use error::{ErrorKind, NativeFault, ScriptError, ScriptResult};
pub use heap::{GcStats, Heap, Persistent};
pub use interpreter::Interpreter;
pub use isolate::{ContextId, GlobalTemplate, Isolate, IsolateConfig};
pub use object::{HeapObject, NativeFn, NativeObject};
pub use parser::parse;
pub use token::Position;
pub use value::{to_int32, ObjectId, Value};
