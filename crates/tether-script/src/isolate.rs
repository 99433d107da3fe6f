//! Isolates and contexts
//!
//! An [`Isolate`] owns one heap and any number of contexts. Each context has
//! its own global scope, instantiated from the isolate's [`GlobalTemplate`]
//! when the context is created. Contexts share the heap, so values may flow
//! between them.
//!
//! The isolate itself is not synchronized; embedders that share it between
//! threads wrap it in a lock.

use crate::ast::Program;
use crate::builtins;
use crate::error::{ScriptError, ScriptResult};
use crate::heap::{GcStats, Heap};
use crate::interpreter::Interpreter;
use crate::object::{Environment, HeapObject, NativeFn};
use crate::parser;
use crate::value::{ObjectId, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tether_sdk::{Arena, ArenaRef};

/// Engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolateConfig {
    /// Call depth at which a `RangeError` is raised
    pub max_call_depth: usize,
    /// Allocations between opportunistic collections
    pub gc_threshold: usize,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            gc_threshold: 4096,
        }
    }
}

/// Generation-checked handle to a context of one isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(ArenaRef);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context {}", self.0)
    }
}

struct Context {
    global: ObjectId,
}

#[derive(Clone)]
enum TemplateEntry {
    Function(NativeFn),
    Namespace(IndexMap<Arc<str>, NativeFn>),
    Value(Value),
}

/// Globals installed into every new context.
///
/// Entries hold native functions and primitives only; heap values are
/// allocated per context when the template is instantiated.
#[derive(Clone, Default)]
pub struct GlobalTemplate {
    entries: IndexMap<Arc<str>, TemplateEntry>,
}

impl GlobalTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global function `name`
    pub fn set_function(&mut self, name: &str, func: NativeFn) -> &mut Self {
        self.entries
            .insert(Arc::from(name), TemplateEntry::Function(func));
        self
    }

    /// Method `member` on the global object `namespace`.
    ///
    /// Repeated calls for the same namespace add members to one object.
    pub fn set_namespace(&mut self, namespace: &str, member: &str, func: NativeFn) -> &mut Self {
        let entry = self
            .entries
            .entry(Arc::from(namespace))
            .or_insert_with(|| TemplateEntry::Namespace(IndexMap::new()));
        match entry {
            TemplateEntry::Namespace(members) => {
                members.insert(Arc::from(member), func);
            }
            other => {
                let mut members = IndexMap::new();
                members.insert(Arc::from(member), func);
                *other = TemplateEntry::Namespace(members);
            }
        }
        self
    }

    /// Primitive global. Heap values are not allowed here.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let value = match value.into() {
            Value::Object(_) => Value::Undefined,
            primitive => primitive,
        };
        self.entries.insert(Arc::from(name), TemplateEntry::Value(value));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| &**k)
    }

    fn instantiate(&self, heap: &mut Heap, global: ObjectId) -> ScriptResult<()> {
        for (name, entry) in &self.entries {
            let value = match entry {
                TemplateEntry::Function(func) => heap.alloc_native(name, func.clone()),
                TemplateEntry::Namespace(members) => builtins::namespace(
                    heap,
                    members
                        .iter()
                        .map(|(member, func)| (&**member, func.clone()))
                        .collect(),
                ),
                TemplateEntry::Value(value) => value.clone(),
            };
            builtins::define_global(heap, global, name, value)?;
        }
        Ok(())
    }
}

/// One heap plus its contexts.
pub struct Isolate {
    heap: Heap,
    contexts: Arena<Context>,
    template: GlobalTemplate,
    config: IsolateConfig,
}

impl Isolate {
    pub fn new(config: IsolateConfig) -> Self {
        Self::with_template(config, GlobalTemplate::new())
    }

    pub fn with_template(config: IsolateConfig, template: GlobalTemplate) -> Self {
        Self {
            heap: Heap::new(),
            contexts: Arena::new(),
            template,
            config,
        }
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.config
    }

    /// Template for contexts created from now on
    pub fn template_mut(&mut self) -> &mut GlobalTemplate {
        &mut self.template
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// New context with the builtins and the template's globals installed
    pub fn create_context(&mut self) -> ScriptResult<ContextId> {
        let global = self.heap.alloc(HeapObject::Environment(Environment {
            vars: Default::default(),
            parent: None,
            this: Some(Value::Undefined),
            function_scope: true,
        }));
        builtins::install(&mut self.heap, global)?;
        self.template.instantiate(&mut self.heap, global)?;
        let index = self.contexts.insert(Context { global });
        Ok(ContextId(self.contexts.reference(index)))
    }

    /// Drop a context; its globals become collectable. False if already gone.
    pub fn dispose_context(&mut self, ctx: ContextId) -> bool {
        if self.contexts.resolve(ctx.0).is_none() {
            return false;
        }
        self.contexts.remove(ctx.0.index).is_some()
    }

    pub fn has_context(&self, ctx: ContextId) -> bool {
        self.contexts.resolve(ctx.0).is_some()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    fn global(&self, ctx: ContextId) -> ScriptResult<ObjectId> {
        self.contexts
            .resolve(ctx.0)
            .map(|context| context.global)
            .ok_or_else(|| ScriptError::InvalidHandle(ctx.to_string()))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    pub fn compile(&self, source: &str) -> ScriptResult<Program> {
        parser::parse(source)
    }

    /// Compile and run `source`, returning its completion value.
    ///
    /// The result is not rooted: persist it before the next collection.
    pub fn evaluate(&mut self, ctx: ContextId, source: &str) -> ScriptResult<Value> {
        let program = self.compile(source)?;
        self.run(ctx, &program)
    }

    pub fn run(&mut self, ctx: ContextId, program: &Program) -> ScriptResult<Value> {
        self.with_interpreter(ctx, |interp| interp.run(program))
    }

    /// Call a function value with `this = undefined`
    pub fn call(&mut self, ctx: ContextId, callee: &Value, args: &[Value]) -> ScriptResult<Value> {
        self.with_interpreter(ctx, |interp| interp.call(callee, &Value::Undefined, args))
    }

    /// Run `f` with an interpreter bound to `ctx`
    pub fn with_interpreter<R>(
        &mut self,
        ctx: ContextId,
        f: impl FnOnce(&mut Interpreter<'_>) -> ScriptResult<R>,
    ) -> ScriptResult<R> {
        let global = self.global(ctx)?;
        let mut interp = Interpreter::new(&mut self.heap, global, self.config.max_call_depth);
        interp.set_context(ctx);
        f(&mut interp)
    }

    pub fn set_global(&mut self, ctx: ContextId, name: &str, value: Value) -> ScriptResult<()> {
        let global = self.global(ctx)?;
        builtins::define_global(&mut self.heap, global, name, value)
    }

    pub fn get_global(&self, ctx: ContextId, name: &str) -> ScriptResult<Option<Value>> {
        let global = self.global(ctx)?;
        match self.heap.get(global) {
            Some(HeapObject::Environment(env)) => Ok(env.vars.get(name).map(|b| b.value.clone())),
            _ => Err(ScriptError::InvalidHandle(ctx.to_string())),
        }
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Full collection rooted at every live context and persistent handle
    pub fn collect_garbage(&mut self) -> GcStats {
        let roots: Vec<ObjectId> = self.contexts.iter().map(|(_, c)| c.global).collect();
        self.heap.collect(roots)
    }

    /// Collect only once enough has been allocated since the last run
    pub fn maybe_collect(&mut self) -> Option<GcStats> {
        if self.heap.allocated_since_gc() >= self.config.gc_threshold {
            Some(self.collect_garbage())
        } else {
            None
        }
    }
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new(IsolateConfig::default())
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("contexts", &self.contexts.len())
            .field("live_objects", &self.heap.live_objects())
            .field("persistents", &self.heap.persistent_count())
            .finish()
    }
}
