//! Heap object kinds and the native-object extension point

use crate::ast::FunctionNode;
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::{ObjectId, Value};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Native function callable from scripts: `(interpreter, this, args)`.
///
/// Natives must not hold script values across calls; anything they need to
/// keep alive goes through a persistent handle.
pub type NativeFn =
    Arc<dyn Fn(&mut Interpreter<'_>, &Value, &[Value]) -> ScriptResult<Value> + Send + Sync>;

/// Object implemented outside the engine.
///
/// Property reads are fully intercepted: the engine calls [`NativeObject::get`]
/// for every named access on the object, which makes this the hook for lazily
/// synthesized members.
pub trait NativeObject: Send + Sync + 'static {
    /// Class name used in diagnostics
    fn class_name(&self) -> &str;

    /// Named property read
    fn get(&self, interp: &mut Interpreter<'_>, key: &str) -> ScriptResult<Value>;

    /// Named property write
    fn set(&self, _interp: &mut Interpreter<'_>, key: &str, _value: Value) -> ScriptResult<()> {
        Err(ScriptError::type_error(format!(
            "Cannot assign to property '{}' of {}",
            key,
            self.class_name()
        )))
    }

    /// Call-as-function handler
    fn call(
        &self,
        _interp: &mut Interpreter<'_>,
        _this: &Value,
        _args: &[Value],
    ) -> ScriptResult<Value> {
        Err(ScriptError::type_error(format!(
            "{} is not a function",
            self.display()
        )))
    }

    /// `new` handler
    fn construct(&self, _interp: &mut Interpreter<'_>, _args: &[Value]) -> ScriptResult<Value> {
        Err(ScriptError::type_error(format!(
            "{} is not a constructor",
            self.display()
        )))
    }

    /// Whether `typeof` reports `"function"`
    fn is_callable(&self) -> bool {
        false
    }

    /// String conversion
    fn display(&self) -> String {
        format!("[object {}]", self.class_name())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Script-defined function plus its captured scope.
#[derive(Clone)]
pub struct Closure {
    pub node: Arc<FunctionNode>,
    pub env: ObjectId,
}

impl Closure {
    pub fn name(&self) -> &str {
        self.node.name.as_deref().unwrap_or("")
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Arc<str>,
    pub func: NativeFn,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

/// Lexical scope record.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub vars: FxHashMap<Arc<str>, Binding>,
    pub parent: Option<ObjectId>,
    /// `this` for function scopes; `None` defers to the parent (arrows, blocks)
    pub this: Option<Value>,
    /// `var` declarations land in the nearest function scope
    pub function_scope: bool,
}

pub enum HeapObject {
    Array(Vec<Value>),
    Object(IndexMap<Arc<str>, Value>),
    Closure(Closure),
    Native(NativeFunction),
    Host(Arc<dyn NativeObject>),
    Environment(Environment),
}

impl HeapObject {
    /// Heap references held by this object
    pub(crate) fn trace(&self, out: &mut Vec<ObjectId>) {
        match self {
            HeapObject::Array(items) => items.iter().for_each(|v| push_ref(out, v)),
            HeapObject::Object(map) => map.values().for_each(|v| push_ref(out, v)),
            HeapObject::Closure(closure) => out.push(closure.env),
            HeapObject::Environment(env) => {
                env.vars.values().for_each(|b| push_ref(out, &b.value));
                if let Some(this) = &env.this {
                    push_ref(out, this);
                }
                if let Some(parent) = env.parent {
                    out.push(parent);
                }
            }
            HeapObject::Native(_) | HeapObject::Host(_) => {}
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::Array(_) => "array",
            HeapObject::Object(_) => "object",
            HeapObject::Closure(_) => "function",
            HeapObject::Native(_) => "native function",
            HeapObject::Host(_) => "host object",
            HeapObject::Environment(_) => "environment",
        }
    }
}

fn push_ref(out: &mut Vec<ObjectId>, value: &Value) {
    if let Value::Object(id) = value {
        out.push(*id);
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapObject::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HeapObject::Object(map) => f.debug_tuple("Object").field(map).finish(),
            HeapObject::Closure(c) => write!(f, "Closure({})", c.name()),
            HeapObject::Native(n) => write!(f, "Native({})", n.name),
            HeapObject::Host(h) => write!(f, "Host({})", h.class_name()),
            HeapObject::Environment(env) => f
                .debug_struct("Environment")
                .field("vars", &env.vars.len())
                .field("parent", &env.parent)
                .finish(),
        }
    }
}
