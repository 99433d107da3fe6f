//! Tree-walking evaluator
//!
//! An [`Interpreter`] borrows the heap for the duration of one entry into a
//! context. Natives and host objects receive the same interpreter, so they
//! can allocate, read properties and call back into script code without any
//! further locking.

use crate::ast::*;
use crate::builtins;
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::heap::Heap;
use crate::isolate::ContextId;
use crate::object::{Binding, Closure, Environment, HeapObject, NativeFn, NativeObject};
use crate::value::{number_to_string, primitive_to_number, string_to_number, ObjectId, Value};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Upper bound on how far `arr[i] = v` may grow an array in one step.
const MAX_ARRAY_GROWTH: usize = 1 << 20;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

enum Callee {
    Closure(Closure),
    Native(NativeFn),
    Host(Arc<dyn NativeObject>),
}

enum Reference {
    Binding(Arc<str>),
    Property(Value, String),
}

pub struct Interpreter<'h> {
    heap: &'h mut Heap,
    global: ObjectId,
    context: Option<ContextId>,
    depth: usize,
    max_depth: usize,
    completion: Value,
}

impl<'h> Interpreter<'h> {
    pub fn new(heap: &'h mut Heap, global: ObjectId, max_depth: usize) -> Self {
        Self {
            heap,
            global,
            context: None,
            depth: 0,
            max_depth,
            completion: Value::Undefined,
        }
    }

    pub fn heap(&self) -> &Heap {
        self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        self.heap
    }

    /// Global scope of the context being executed
    pub fn global(&self) -> ObjectId {
        self.global
    }

    /// Context this interpreter runs in, when entered through an isolate
    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub(crate) fn set_context(&mut self, context: ContextId) {
        self.context = Some(context);
    }

    /// Current call depth (0 at top level)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run a program; the result is the value of the last top-level
    /// expression statement executed.
    pub fn run(&mut self, program: &Program) -> ScriptResult<Value> {
        self.completion = Value::Undefined;
        match self.exec_block_in(&program.body, self.global)? {
            Flow::Normal | Flow::Return(_) => {}
            Flow::Break => {
                return Err(ScriptError::runtime(
                    ErrorKind::SyntaxError,
                    "Illegal break statement",
                ))
            }
            Flow::Continue => {
                return Err(ScriptError::runtime(
                    ErrorKind::SyntaxError,
                    "Illegal continue statement",
                ))
            }
        }
        Ok(std::mem::take(&mut self.completion))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block_in(&mut self, stmts: &[Stmt], env: ObjectId) -> ScriptResult<Flow> {
        for stmt in stmts {
            if let Stmt::Function(node) = stmt {
                let closure = self.make_closure(node.clone(), env);
                if let Some(name) = &node.name {
                    self.define(env, name, closure, true)?;
                }
            }
        }
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: ObjectId) -> ScriptResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                let value = self.eval(expr, env)?;
                if self.depth == 0 {
                    self.completion = value;
                }
                Ok(Flow::Normal)
            }
            Stmt::Declaration { kind, declarators } => {
                for declarator in declarators {
                    let value = match &declarator.init {
                        Some(init) => Some(self.eval(init, env)?),
                        None => None,
                    };
                    self.declare(env, &declarator.name, value, *kind)
                        .map_err(|e| e.at(declarator.span))?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, env),
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Block(stmts) => {
                let scope = self.new_scope(env);
                self.exec_block_in(stmts, scope)
            }
            Stmt::Throw { value, span } => {
                let value = self.eval(value, env)?;
                Err(self.throw_value(value).at(*span))
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(
                block,
                param.as_ref(),
                handler.as_deref(),
                finalizer.as_deref(),
                env,
            ),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: ObjectId,
    ) -> ScriptResult<Flow> {
        let mut scope = self.new_scope(env);
        let per_iteration = matches!(
            init,
            Some(Stmt::Declaration {
                kind: DeclKind::Let | DeclKind::Const,
                ..
            })
        );
        if let Some(init) = init {
            self.exec(init, scope)?;
        }
        if per_iteration {
            scope = self.copy_scope(scope, env)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, scope)?.truthy() {
                    break;
                }
            }
            match self.exec(body, scope)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            // Fresh bindings before the update so closures keep each value
            if per_iteration {
                scope = self.copy_scope(scope, env)?;
            }
            if let Some(update) = update {
                self.eval(update, scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&Arc<str>>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        env: ObjectId,
    ) -> ScriptResult<Flow> {
        let scope = self.new_scope(env);
        let mut outcome = self.exec_block_in(block, scope);
        if let Some(handler) = handler {
            if let Err(err) = outcome {
                let caught = self.error_value(&err);
                let scope = self.new_scope(env);
                if let Some(param) = param {
                    self.define(scope, param, caught, true)?;
                }
                outcome = self.exec_block_in(handler, scope);
            }
        }
        if let Some(finalizer) = finalizer {
            let scope = self.new_scope(env);
            match self.exec_block_in(finalizer, scope)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        outcome
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub(crate) fn eval(&mut self, expr: &Expr, env: ObjectId) -> ScriptResult<Value> {
        match expr {
            Expr::Number(n, _) => Ok(Value::Number(*n)),
            Expr::String(s, _) => Ok(Value::String(s.clone())),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),
            Expr::Null(_) => Ok(Value::Null),
            Expr::Undefined(_) => Ok(Value::Undefined),
            Expr::Template(segments, _) => self.eval_template(segments, env),
            Expr::Ident(name, span) => self.lookup(env, name).ok_or_else(|| {
                ScriptError::reference_error(format!("{} is not defined", name)).at(*span)
            }),
            Expr::This(_) => Ok(self.this_value(env)),
            Expr::Array(items, _) => {
                let values = self.eval_list(items, env)?;
                Ok(self.heap.alloc_array(values))
            }
            Expr::Object(properties, _) => self.eval_object(properties, env),
            Expr::Function(node) => Ok(self.eval_function(node, env)),
            Expr::Unary { op, operand, span } => {
                self.eval_unary(*op, operand, env).map_err(|e| e.at(*span))
            }
            Expr::Update {
                increment,
                prefix,
                target,
                span,
            } => self
                .eval_update(*increment, *prefix, target, env)
                .map_err(|e| e.at(*span)),
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right).map_err(|e| e.at(*span))
            }
            Expr::Logical { op, left, right, .. } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Assign {
                op,
                target,
                value,
                span,
            } => self.eval_assign(*op, target, value, env).map_err(|e| e.at(*span)),
            Expr::Member {
                object,
                property,
                span,
            } => {
                let object = self.eval(object, env)?;
                let key = self.property_key(property, env)?;
                self.get_property(&object, &key).map_err(|e| e.at(*span))
            }
            Expr::Call { callee, args, span } => {
                self.eval_call(callee, args, env).map_err(|e| e.at(*span))
            }
            Expr::New { callee, args, span } => {
                let constructor = self.eval(callee, env)?;
                let args = self.eval_list(args, env)?;
                self.construct(&constructor, &args).map_err(|e| e.at(*span))
            }
        }
    }

    fn eval_list(&mut self, exprs: &[Expr], env: ObjectId) -> ScriptResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr, env)?);
        }
        Ok(values)
    }

    fn eval_template(
        &mut self,
        segments: &[TemplateSegment],
        env: ObjectId,
    ) -> ScriptResult<Value> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => out.push_str(text),
                TemplateSegment::Expr(expr) => {
                    let value = self.eval(expr, env)?;
                    out.push_str(&self.to_string(&value));
                }
            }
        }
        Ok(Value::from(out))
    }

    fn eval_object(
        &mut self,
        properties: &[(Arc<str>, Expr)],
        env: ObjectId,
    ) -> ScriptResult<Value> {
        let mut map = IndexMap::with_capacity(properties.len());
        for (key, expr) in properties {
            let value = self.eval(expr, env)?;
            map.insert(key.clone(), value);
        }
        Ok(self.heap.alloc_object(map))
    }

    fn eval_function(&mut self, node: &Arc<FunctionNode>, env: ObjectId) -> Value {
        match (&node.name, node.is_arrow) {
            // Named function expressions see their own name
            (Some(name), false) => {
                let own = self.alloc_env(Some(env), None, false);
                let closure = self.make_closure(node.clone(), own);
                if let Ok(scope) = self.env_mut(own) {
                    scope.vars.insert(
                        name.clone(),
                        Binding {
                            value: closure.clone(),
                            mutable: false,
                        },
                    );
                }
                closure
            }
            _ => self.make_closure(node.clone(), env),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: ObjectId) -> ScriptResult<Value> {
        if op == UnaryOp::Typeof {
            if let Expr::Ident(name, _) = operand {
                return Ok(match self.lookup(env, name) {
                    Some(value) => Value::string(self.type_of(&value)),
                    None => Value::string("undefined"),
                });
            }
        }
        let value = self.eval(operand, env)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Negate => Value::Number(-self.to_number(&value)),
            UnaryOp::Plus => Value::Number(self.to_number(&value)),
            UnaryOp::Typeof => Value::string(self.type_of(&value)),
        })
    }

    fn eval_update(
        &mut self,
        increment: bool,
        prefix: bool,
        target: &Expr,
        env: ObjectId,
    ) -> ScriptResult<Value> {
        let reference = self.reference(target, env)?;
        let old = self.read_reference(&reference, env)?;
        let old = self.to_number(&old);
        let new = if increment { old + 1.0 } else { old - 1.0 };
        self.write_reference(reference, env, Value::Number(new))?;
        Ok(Value::Number(if prefix { new } else { old }))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        env: ObjectId,
    ) -> ScriptResult<Value> {
        let reference = self.reference(target, env)?;
        let new = match op {
            AssignOp::Assign => self.eval(value, env)?,
            AssignOp::Compound(op) => {
                let current = self.read_reference(&reference, env)?;
                let rhs = self.eval(value, env)?;
                self.binary(op, &current, &rhs)?
            }
        };
        self.write_reference(reference, env, new.clone())?;
        Ok(new)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: ObjectId) -> ScriptResult<Value> {
        if let Expr::Member {
            object, property, ..
        } = callee
        {
            let receiver = self.eval(object, env)?;
            let key = self.property_key(property, env)?;
            let args = self.eval_list(args, env)?;
            if let Some(result) = builtins::call_method(self, &receiver, &key, &args)? {
                return Ok(result);
            }
            let function = self.get_property(&receiver, &key)?;
            if !self.heap.accepts_call(&function) {
                return Err(ScriptError::type_error(format!(
                    "{} is not a function",
                    callee.describe()
                )));
            }
            return self.call(&function, &receiver, &args);
        }
        let function = self.eval(callee, env)?;
        let args = self.eval_list(args, env)?;
        if !self.heap.accepts_call(&function) {
            return Err(ScriptError::type_error(format!(
                "{} is not a function",
                callee.describe()
            )));
        }
        self.call(&function, &Value::Undefined, &args)
    }

    fn property_key(&mut self, property: &PropertyKey, env: ObjectId) -> ScriptResult<String> {
        match property {
            PropertyKey::Named(name) => Ok(name.to_string()),
            PropertyKey::Computed(expr) => {
                let key = self.eval(expr, env)?;
                Ok(self.to_string(&key))
            }
        }
    }

    fn reference(&mut self, target: &Expr, env: ObjectId) -> ScriptResult<Reference> {
        match target {
            Expr::Ident(name, _) => Ok(Reference::Binding(name.clone())),
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, env)?;
                let key = self.property_key(property, env)?;
                Ok(Reference::Property(object, key))
            }
            other => Err(ScriptError::syntax(
                "Invalid assignment target",
                other.span(),
            )),
        }
    }

    fn read_reference(&mut self, reference: &Reference, env: ObjectId) -> ScriptResult<Value> {
        match reference {
            Reference::Binding(name) => self
                .lookup(env, name)
                .ok_or_else(|| ScriptError::reference_error(format!("{} is not defined", name))),
            Reference::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_reference(
        &mut self,
        reference: Reference,
        env: ObjectId,
        value: Value,
    ) -> ScriptResult<()> {
        match reference {
            Reference::Binding(name) => self.assign(env, &name, value),
            Reference::Property(object, key) => self.set_property(&object, &key, value),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn enter_frame(&mut self) -> ScriptResult<()> {
        if self.depth >= self.max_depth {
            return Err(ScriptError::range_error("Maximum call stack size exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    fn resolve_callee(&self, value: &Value) -> ScriptResult<Callee> {
        let not_callable =
            || ScriptError::type_error(format!("{} is not a function", self.to_string(value)));
        let id = value.as_object().ok_or_else(not_callable)?;
        match self.heap.get(id) {
            Some(HeapObject::Closure(closure)) => Ok(Callee::Closure(closure.clone())),
            Some(HeapObject::Native(native)) => Ok(Callee::Native(native.func.clone())),
            Some(HeapObject::Host(object)) => Ok(Callee::Host(object.clone())),
            Some(_) => Err(not_callable()),
            None => Err(ScriptError::InvalidHandle(format!("object {}", id))),
        }
    }

    /// Call any callable value
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> ScriptResult<Value> {
        let target = self.resolve_callee(callee)?;
        self.enter_frame()?;
        let result = match target {
            Callee::Closure(closure) => self.call_closure(&closure, this, args),
            Callee::Native(func) => func(self, this, args),
            Callee::Host(object) => object.call(self, this, args),
        };
        self.depth -= 1;
        result
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> ScriptResult<Value> {
        let target = self.resolve_callee(callee).map_err(|_| {
            ScriptError::type_error(format!("{} is not a constructor", self.to_string(callee)))
        })?;
        self.enter_frame()?;
        let result = match target {
            Callee::Closure(closure) if !closure.node.is_arrow => {
                let instance = self.heap.alloc_object(IndexMap::new());
                match self.call_closure(&closure, &instance, args) {
                    Ok(returned @ Value::Object(_)) => Ok(returned),
                    Ok(_) => Ok(instance),
                    Err(err) => Err(err),
                }
            }
            Callee::Closure(_) => Err(ScriptError::type_error(format!(
                "{} is not a constructor",
                self.to_string(callee)
            ))),
            Callee::Native(func) => func(self, &Value::Undefined, args),
            Callee::Host(object) => object.construct(self, args),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        this: &Value,
        args: &[Value],
    ) -> ScriptResult<Value> {
        let node = closure.node.clone();
        let this = if node.is_arrow {
            None
        } else {
            Some(this.clone())
        };
        let env = self.alloc_env(Some(closure.env), this, true);
        for (index, param) in node.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            self.define(env, param, value, true)?;
        }
        match &node.body {
            FunctionBody::Expr(expr) => self.eval(expr, env),
            FunctionBody::Block(stmts) => match self.exec_block_in(stmts, env)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    fn make_closure(&mut self, node: Arc<FunctionNode>, env: ObjectId) -> Value {
        Value::Object(self.heap.alloc(HeapObject::Closure(Closure { node, env })))
    }

    // ========================================================================
    // Environments
    // ========================================================================

    fn alloc_env(
        &mut self,
        parent: Option<ObjectId>,
        this: Option<Value>,
        function_scope: bool,
    ) -> ObjectId {
        self.heap.alloc(HeapObject::Environment(Environment {
            vars: Default::default(),
            parent,
            this,
            function_scope,
        }))
    }

    fn new_scope(&mut self, parent: ObjectId) -> ObjectId {
        self.alloc_env(Some(parent), None, false)
    }

    fn copy_scope(&mut self, scope: ObjectId, parent: ObjectId) -> ScriptResult<ObjectId> {
        let vars = self.env(scope)?.vars.clone();
        Ok(self.heap.alloc(HeapObject::Environment(Environment {
            vars,
            parent: Some(parent),
            this: None,
            function_scope: false,
        })))
    }

    fn env(&self, id: ObjectId) -> ScriptResult<&Environment> {
        match self.heap.get(id) {
            Some(HeapObject::Environment(env)) => Ok(env),
            _ => Err(ScriptError::InvalidHandle(format!("scope {}", id))),
        }
    }

    fn env_mut(&mut self, id: ObjectId) -> ScriptResult<&mut Environment> {
        match self.heap.get_mut(id) {
            Some(HeapObject::Environment(env)) => Ok(env),
            _ => Err(ScriptError::InvalidHandle(format!("scope {}", id))),
        }
    }

    fn define(
        &mut self,
        env: ObjectId,
        name: &Arc<str>,
        value: Value,
        mutable: bool,
    ) -> ScriptResult<()> {
        self.env_mut(env)?
            .vars
            .insert(name.clone(), Binding { value, mutable });
        Ok(())
    }

    fn declare(
        &mut self,
        env: ObjectId,
        name: &Arc<str>,
        value: Option<Value>,
        kind: DeclKind,
    ) -> ScriptResult<()> {
        match kind {
            DeclKind::Var => {
                let mut target = env;
                loop {
                    let scope = self.env(target)?;
                    match (scope.function_scope, scope.parent) {
                        (false, Some(parent)) => target = parent,
                        _ => break,
                    }
                }
                let scope = self.env_mut(target)?;
                if let Some(existing) = scope.vars.get_mut(&**name) {
                    // Re-declaring a var without an initializer keeps its value
                    if let Some(value) = value {
                        existing.value = value;
                        existing.mutable = true;
                    }
                } else {
                    scope.vars.insert(
                        name.clone(),
                        Binding {
                            value: value.unwrap_or_default(),
                            mutable: true,
                        },
                    );
                }
                Ok(())
            }
            DeclKind::Let | DeclKind::Const => {
                let scope = self.env_mut(env)?;
                if scope.vars.contains_key(&**name) {
                    return Err(ScriptError::runtime(
                        ErrorKind::SyntaxError,
                        format!("Identifier '{}' has already been declared", name),
                    ));
                }
                scope.vars.insert(
                    name.clone(),
                    Binding {
                        value: value.unwrap_or_default(),
                        mutable: kind == DeclKind::Let,
                    },
                );
                Ok(())
            }
        }
    }

    fn lookup(&self, env: ObjectId, name: &str) -> Option<Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.env(id).ok()?;
            if let Some(binding) = scope.vars.get(name) {
                return Some(binding.value.clone());
            }
            current = scope.parent;
        }
        None
    }

    fn assign(&mut self, env: ObjectId, name: &str, value: Value) -> ScriptResult<()> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.env_mut(id)?;
            if let Some(binding) = scope.vars.get_mut(name) {
                if !binding.mutable {
                    return Err(ScriptError::type_error("Assignment to constant variable."));
                }
                binding.value = value;
                return Ok(());
            }
            current = scope.parent;
        }
        Err(ScriptError::reference_error(format!("{} is not defined", name)))
    }

    fn this_value(&self, env: ObjectId) -> Value {
        let mut current = Some(env);
        while let Some(id) = current {
            let Ok(scope) = self.env(id) else {
                break;
            };
            if let Some(this) = &scope.this {
                return this.clone();
            }
            current = scope.parent;
        }
        Value::Undefined
    }

    /// Read a global binding of the current context
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.env(self.global)
            .ok()
            .and_then(|scope| scope.vars.get(name).map(|b| b.value.clone()))
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// `target[key]`
    pub fn get_property(&mut self, target: &Value, key: &str) -> ScriptResult<Value> {
        let id = match target {
            Value::Undefined | Value::Null => {
                return Err(ScriptError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    self.to_string(target),
                    key
                )))
            }
            Value::String(s) => return Ok(builtins::string_property(s, key)),
            Value::Object(id) => *id,
            _ => return Ok(Value::Undefined),
        };
        let host = match self.heap.get(id) {
            Some(HeapObject::Array(items)) => {
                return Ok(match key {
                    "length" => Value::Number(items.len() as f64),
                    _ => key
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or_default(),
                })
            }
            Some(HeapObject::Object(map)) => return Ok(map.get(key).cloned().unwrap_or_default()),
            Some(HeapObject::Closure(closure)) => {
                return Ok(match key {
                    "name" => Value::string(closure.name()),
                    "length" => Value::Number(closure.node.params.len() as f64),
                    _ => Value::Undefined,
                })
            }
            Some(HeapObject::Native(native)) => {
                return Ok(match key {
                    "name" => Value::String(native.name.clone()),
                    _ => Value::Undefined,
                })
            }
            Some(HeapObject::Environment(_)) => return Ok(Value::Undefined),
            Some(HeapObject::Host(object)) => object.clone(),
            None => return Err(ScriptError::InvalidHandle(format!("object {}", id))),
        };
        host.get(self, key)
    }

    /// `target[key] = value`
    pub fn set_property(&mut self, target: &Value, key: &str, value: Value) -> ScriptResult<()> {
        let id = match target {
            Value::Undefined | Value::Null => {
                return Err(ScriptError::type_error(format!(
                    "Cannot set properties of {} (setting '{}')",
                    self.to_string(target),
                    key
                )))
            }
            Value::Object(id) => *id,
            _ => return Ok(()),
        };
        let length = if key == "length" {
            Some(self.to_number(&value))
        } else {
            None
        };
        let host = match self.heap.get_mut(id) {
            Some(HeapObject::Array(items)) => {
                if let Some(length) = length {
                    if !(0.0..=(items.len() + MAX_ARRAY_GROWTH) as f64).contains(&length)
                        || length.fract() != 0.0
                    {
                        return Err(ScriptError::range_error("Invalid array length"));
                    }
                    items.resize(length as usize, Value::Undefined);
                } else if let Ok(index) = key.parse::<usize>() {
                    if index >= items.len() + MAX_ARRAY_GROWTH {
                        return Err(ScriptError::range_error("Invalid array length"));
                    }
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                return Ok(());
            }
            Some(HeapObject::Object(map)) => {
                map.insert(Arc::from(key), value);
                return Ok(());
            }
            Some(HeapObject::Host(object)) => object.clone(),
            Some(_) => return Ok(()),
            None => return Err(ScriptError::InvalidHandle(format!("object {}", id))),
        };
        host.set(self, key, value)
    }

    // ========================================================================
    // Conversions and operators
    // ========================================================================

    pub fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
        Ok(match op {
            BinaryOp::Add => {
                let left = self.to_primitive(left);
                let right = self.to_primitive(right);
                match (&left, &right) {
                    (Value::String(_), _) | (_, Value::String(_)) => {
                        let mut out = self.to_string(&left);
                        out.push_str(&self.to_string(&right));
                        Value::from(out)
                    }
                    _ => Value::Number(primitive_to_number(&left) + primitive_to_number(&right)),
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number(left) - self.to_number(right)),
            BinaryOp::Mul => Value::Number(self.to_number(left) * self.to_number(right)),
            BinaryOp::Div => Value::Number(self.to_number(left) / self.to_number(right)),
            BinaryOp::Rem => Value::Number(self.to_number(left) % self.to_number(right)),
            BinaryOp::Equal => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEqual => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEqual => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEqual => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Less => Value::Bool(self.compare(left, right, |o| o.is_lt())),
            BinaryOp::LessEqual => Value::Bool(self.compare(left, right, |o| o.is_le())),
            BinaryOp::Greater => Value::Bool(self.compare(left, right, |o| o.is_gt())),
            BinaryOp::GreaterEqual => Value::Bool(self.compare(left, right, |o| o.is_ge())),
        })
    }

    fn compare(
        &self,
        left: &Value,
        right: &Value,
        test: impl Fn(std::cmp::Ordering) -> bool,
    ) -> bool {
        let left = self.to_primitive(left);
        let right = self.to_primitive(right);
        if let (Value::String(a), Value::String(b)) = (&left, &right) {
            return test(a.cmp(b));
        }
        primitive_to_number(&left)
            .partial_cmp(&primitive_to_number(&right))
            .map_or(false, test)
    }

    fn to_primitive(&self, value: &Value) -> Value {
        match value {
            Value::Object(_) => Value::from(self.to_string(value)),
            other => other.clone(),
        }
    }

    /// ToNumber
    pub fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Object(_) => string_to_number(&self.to_string(value)),
            other => primitive_to_number(other),
        }
    }

    /// ToString. Nested arrays are joined with an explicit stack, so any
    /// depth of nesting converts.
    pub fn to_string(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(id) => match self.heap.get(*id) {
                Some(HeapObject::Array(items)) => self.join_nested(*id, items),
                Some(HeapObject::Object(_)) => "[object Object]".to_string(),
                Some(HeapObject::Closure(closure)) => {
                    format!("function {}() {{ ... }}", closure.name())
                }
                Some(HeapObject::Native(native)) => {
                    format!("function {}() {{ [native code] }}", native.name)
                }
                Some(HeapObject::Host(object)) => object.display(),
                Some(HeapObject::Environment(_)) => "[object Environment]".to_string(),
                None => "[object Released]".to_string(),
            },
        }
    }

    /// `Array.prototype.join(",")` applied recursively. An array already
    /// being joined further up renders as the empty string.
    fn join_nested(&self, root: ObjectId, items: &[Value]) -> String {
        struct Frame<'a> {
            items: &'a [Value],
            next: usize,
            out: String,
        }

        let mut open = FxHashSet::default();
        open.insert(root);
        let mut ids = vec![root];
        let mut frames = vec![Frame {
            items,
            next: 0,
            out: String::new(),
        }];

        while let Some(frame) = frames.last_mut() {
            let items = frame.items;
            let Some(item) = items.get(frame.next) else {
                let Some(done) = frames.pop() else {
                    break;
                };
                if let Some(id) = ids.pop() {
                    open.remove(&id);
                }
                match frames.last_mut() {
                    Some(parent) => parent.out.push_str(&done.out),
                    None => return done.out,
                }
                continue;
            };
            if frame.next > 0 {
                frame.out.push(',');
            }
            frame.next += 1;
            match item {
                Value::Undefined | Value::Null => {}
                Value::Object(id) => match self.heap.get(*id) {
                    Some(HeapObject::Array(_)) if open.contains(id) => {}
                    Some(HeapObject::Array(nested)) => {
                        open.insert(*id);
                        ids.push(*id);
                        frames.push(Frame {
                            items: nested,
                            next: 0,
                            out: String::new(),
                        });
                    }
                    _ => {
                        let text = self.to_string(item);
                        frame.out.push_str(&text);
                    }
                },
                other => {
                    let text = self.to_string(other);
                    frame.out.push_str(&text);
                }
            }
        }
        String::new()
    }

    /// `typeof value`
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) if self.heap.is_callable(value) => "function",
            Value::Object(_) => "object",
        }
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Allocate an `{ name, message }` error object
    pub fn make_error(&mut self, name: &str, message: &str) -> Value {
        let mut map = IndexMap::new();
        map.insert(Arc::from("name"), Value::string(name));
        map.insert(Arc::from("message"), Value::string(message));
        self.heap.alloc_object(map)
    }

    /// The value a `catch` clause binds for `err`
    pub fn error_value(&mut self, err: &ScriptError) -> Value {
        match err {
            ScriptError::Thrown { value, .. } => value.clone(),
            other => {
                let name = other.kind_name();
                let message = other.message();
                self.make_error(&name, &message)
            }
        }
    }

    /// Build the error for `throw value`
    pub fn throw_value(&self, value: Value) -> ScriptError {
        let message = match &value {
            Value::Object(id) => match self.heap.get(*id) {
                Some(HeapObject::Object(map)) => match (map.get("name"), map.get("message")) {
                    (Some(name), Some(message)) => format!(
                        "{}: {}",
                        self.to_string(name),
                        self.to_string(message)
                    ),
                    (None, Some(message)) => format!("Error: {}", self.to_string(message)),
                    _ => self.to_string(&value),
                },
                _ => self.to_string(&value),
            },
            other => self.to_string(other),
        };
        ScriptError::Thrown {
            value,
            message,
            position: None,
        }
    }
}
