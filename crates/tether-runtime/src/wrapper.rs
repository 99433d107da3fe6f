//! Script-visible wrappers around host classes and objects
//!
//! A wrapper is unbound (a class or an object) or bound to a member name.
//! Every named read on an unbound wrapper is intercepted and answered with a
//! new bound wrapper, whether or not the member exists; existence is only
//! checked when the binding is invoked.

use crate::config::ReflectionStrategy;
use crate::error::{BridgeError, BridgeResult};
use crate::handles::StrongRef;
use crate::invoke::{self, Invoker};
use crate::reflection::{MethodTable, ReflectionBridge};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tether_host::{HostClass, ObjectRef};
use tether_script::{Interpreter, NativeObject, ScriptError, ScriptResult, Value};

/// Where a binding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    /// Found in the wrapper's eager method table
    Enumerated,
    /// Created on demand without an existence check
    Synthesized,
}

struct Binding {
    member: Arc<str>,
    origin: BindingOrigin,
    invoker: Arc<dyn Invoker>,
}

pub struct WrapperObject {
    bridge: Arc<ReflectionBridge>,
    class: Arc<HostClass>,
    receiver: Option<StrongRef>,
    strategy: ReflectionStrategy,
    table: Option<Arc<MethodTable>>,
    binding: Option<Binding>,
}

impl WrapperObject {
    pub(crate) fn unbound(
        bridge: Arc<ReflectionBridge>,
        class: Arc<HostClass>,
        receiver: Option<StrongRef>,
        strategy: ReflectionStrategy,
        table: Option<Arc<MethodTable>>,
    ) -> Self {
        Self {
            bridge,
            class,
            receiver,
            strategy,
            table,
            binding: None,
        }
    }

    pub(crate) fn bound(
        bridge: Arc<ReflectionBridge>,
        class: Arc<HostClass>,
        receiver: Option<StrongRef>,
        strategy: ReflectionStrategy,
        member: Arc<str>,
        origin: BindingOrigin,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            bridge,
            class,
            receiver,
            strategy,
            table: None,
            binding: Some(Binding {
                member,
                origin,
                invoker,
            }),
        }
    }

    pub fn bridge(&self) -> &Arc<ReflectionBridge> {
        &self.bridge
    }

    pub fn class(&self) -> &Arc<HostClass> {
        &self.class
    }

    pub fn receiver(&self) -> Option<&StrongRef> {
        self.receiver.as_ref()
    }

    pub fn receiver_identity(&self) -> Option<ObjectRef> {
        self.receiver.as_ref().map(StrongRef::identity)
    }

    pub fn strategy(&self) -> ReflectionStrategy {
        self.strategy
    }

    /// Eager method table; `None` for lazy and bound wrappers
    pub fn method_table(&self) -> Option<&Arc<MethodTable>> {
        self.table.as_ref()
    }

    pub fn bound_name(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| &*b.member)
    }

    pub fn origin(&self) -> Option<BindingOrigin> {
        self.binding.as_ref().map(|b| b.origin)
    }

    pub fn invoker(&self) -> Option<&Arc<dyn Invoker>> {
        self.binding.as_ref().map(|b| &b.invoker)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Independent wrapper for the same target, with its own retain
    pub fn duplicate(&self) -> WrapperObject {
        WrapperObject {
            bridge: self.bridge.clone(),
            class: self.class.clone(),
            receiver: self
                .receiver
                .as_ref()
                .map(|held| self.bridge.handles().retain_again(held)),
            strategy: self.strategy,
            table: self.table.clone(),
            binding: self.binding.as_ref().map(|b| Binding {
                member: b.member.clone(),
                origin: b.origin,
                invoker: b.invoker.clone(),
            }),
        }
    }

    /// Run the bound member through its invoker
    pub fn invoke(&self, interp: &mut Interpreter<'_>, args: &[Value]) -> BridgeResult<Value> {
        match &self.binding {
            Some(binding) => binding.invoker.invoke(self, interp, args),
            None => Err(BridgeError::NotCallable(self.describe())),
        }
    }

    fn describe(&self) -> String {
        match (&self.binding, &self.receiver) {
            (Some(binding), _) => format!("{}.{}", self.class.simple_name(), binding.member),
            (None, Some(receiver)) => {
                format!("{}@{}", self.class.simple_name(), receiver.identity())
            }
            (None, None) => format!("class {}", self.class.name()),
        }
    }
}

impl NativeObject for WrapperObject {
    fn class_name(&self) -> &str {
        self.class.name()
    }

    fn get(&self, interp: &mut Interpreter<'_>, key: &str) -> ScriptResult<Value> {
        // Bindings have no members of their own
        if self.binding.is_some() {
            return Ok(Value::Undefined);
        }
        let bound = self.bridge.bind(self, key);
        Ok(interp.heap_mut().alloc_host(Arc::new(bound)))
    }

    fn call(
        &self,
        interp: &mut Interpreter<'_>,
        _this: &Value,
        args: &[Value],
    ) -> ScriptResult<Value> {
        self.invoke(interp, args).map_err(ScriptError::from)
    }

    fn construct(&self, interp: &mut Interpreter<'_>, args: &[Value]) -> ScriptResult<Value> {
        if self.binding.is_some() || self.receiver.is_some() {
            return Err(ScriptError::type_error(format!(
                "{} is not a constructor",
                self.describe()
            )));
        }
        invoke::construct(&self.bridge, interp, &self.class, args).map_err(ScriptError::from)
    }

    fn is_callable(&self) -> bool {
        self.binding.is_some()
    }

    fn display(&self) -> String {
        self.describe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for WrapperObject {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            self.bridge.handles().release(receiver);
        }
    }
}

impl fmt::Debug for WrapperObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperObject")
            .field("target", &self.describe())
            .field("strategy", &self.strategy)
            .field("origin", &self.origin())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use tether_host::sample::{register_sample_classes, WIDGET};
    use tether_host::HostEnvironment;

    fn bridge() -> Arc<ReflectionBridge> {
        let host = Arc::new(HostEnvironment::default());
        register_sample_classes(&host);
        Arc::new(ReflectionBridge::new(host, BridgeConfig::default()))
    }

    #[test]
    fn test_display_forms() {
        let bridge = bridge();
        let class = bridge.resolve_class(WIDGET).unwrap();
        let class_wrapper = bridge.wrap_class(class, ReflectionStrategy::Lazy);
        assert_eq!(class_wrapper.display(), "class com.example.Widget");

        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        assert!(widget.display().starts_with("Widget@"));
        assert_eq!(bridge.bind(&widget, "getName").display(), "Widget.getName");
    }

    #[test]
    fn test_only_bindings_are_callable() {
        let bridge = bridge();
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        assert!(!widget.is_callable());
        assert!(bridge.bind(&widget, "anything").is_callable());
    }

    #[test]
    fn test_duplicate_retains_receiver() {
        let bridge = bridge();
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        let identity = widget.receiver_identity().unwrap();
        let copy = widget.duplicate();
        assert_eq!(bridge.handles().count(identity), 2);
        drop(widget);
        assert_eq!(copy.receiver_identity(), Some(identity));
        assert_eq!(bridge.handles().count(identity), 1);
    }
}
