//! Class resolution, method enumeration and binding
//!
//! Discovery and dispatch are split. Discovery produces the method table a
//! wrapper exposes (materialized up front for [`ReflectionStrategy::Eager`],
//! skipped for [`ReflectionStrategy::Lazy`]); dispatch always resolves
//! against the class's full public method set at call time.

use crate::config::{BridgeConfig, ReflectionStrategy};
use crate::error::{BridgeError, BridgeResult};
use crate::handles::HandleTable;
use crate::invoke::{EchoInvoker, Invoker, ReflectiveInvoker};
use crate::wrapper::{BindingOrigin, WrapperObject};
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tether_host::{HostClass, HostEnvironment, HostValue, MethodDescriptor, ObjectRef};

/// Public methods by name. Overloads collapse last-writer-wins.
pub type MethodTable = IndexMap<Arc<str>, TableEntry>;

/// An enumerated member and the binding parts every read of it shares
#[derive(Clone)]
pub struct TableEntry {
    method: MethodDescriptor,
    member: Arc<str>,
    invoker: Arc<dyn Invoker>,
}

impl TableEntry {
    /// Last public overload declared under this name
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Invoker shared by every binding of this member
    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }
}

pub struct ReflectionBridge {
    host: Arc<HostEnvironment>,
    handles: HandleTable,
    config: BridgeConfig,
    reflective: Arc<dyn Invoker>,
    tables: RwLock<FxHashMap<String, Arc<MethodTable>>>,
}

impl ReflectionBridge {
    pub fn new(host: Arc<HostEnvironment>, config: BridgeConfig) -> Self {
        Self {
            handles: HandleTable::new(host.clone()),
            host,
            config,
            reflective: Arc::new(ReflectiveInvoker),
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn host(&self) -> &Arc<HostEnvironment> {
        &self.host
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Strategy for constructed instances and objects returned by host calls
    pub fn construction_strategy(&self) -> ReflectionStrategy {
        self.config.reflection.construction
    }

    /// Strategy for class lookups
    pub fn class_lookup_strategy(&self) -> ReflectionStrategy {
        self.config.reflection.class_lookup
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Look up a class by dotted or slash-separated name
    pub fn resolve_class(&self, name: &str) -> BridgeResult<Arc<HostClass>> {
        self.host.for_name(name).map_err(BridgeError::from)
    }

    /// Public methods of `class`, cached per class name. Each entry carries
    /// its invoker, so eager bindings are assembled from shared parts.
    pub fn enumerate_methods(&self, class: &Arc<HostClass>) -> Arc<MethodTable> {
        if let Some(table) = self.tables.read().get(class.name()) {
            return table.clone();
        }
        let mut table = MethodTable::new();
        for method in class.public_methods() {
            let entry = TableEntry {
                method: method.clone(),
                member: method.name.clone(),
                invoker: self.invoker_for(&method.name),
            };
            table.insert(method.name.clone(), entry);
        }
        let table = Arc::new(table);
        tracing::debug!(class = class.name(), methods = table.len(), "method table built");
        self.tables
            .write()
            .entry(class.name().to_string())
            .or_insert(table)
            .clone()
    }

    /// Invoker a new binding of `member` gets
    pub fn invoker_for(&self, member: &str) -> Arc<dyn Invoker> {
        match self.config.stub_for(member) {
            Some(sentinel) => Arc::new(EchoInvoker::new(sentinel)),
            None => self.reflective.clone(),
        }
    }

    fn table_for(
        &self,
        class: &Arc<HostClass>,
        strategy: ReflectionStrategy,
    ) -> Option<Arc<MethodTable>> {
        match strategy {
            ReflectionStrategy::Eager => Some(self.enumerate_methods(class)),
            ReflectionStrategy::Lazy => None,
        }
    }

    // ========================================================================
    // Wrapping
    // ========================================================================

    /// Class-level wrapper; reads bind static members
    pub fn wrap_class(
        self: &Arc<Self>,
        class: Arc<HostClass>,
        strategy: ReflectionStrategy,
    ) -> WrapperObject {
        let table = self.table_for(&class, strategy);
        WrapperObject::unbound(self.clone(), class, None, strategy, table)
    }

    /// Instance wrapper holding one retain on `identity`
    pub fn wrap_object(
        self: &Arc<Self>,
        identity: ObjectRef,
        strategy: ReflectionStrategy,
    ) -> BridgeResult<WrapperObject> {
        let receiver = self.handles.retain(identity)?;
        let class = receiver.object().class().clone();
        let table = self.table_for(&class, strategy);
        Ok(WrapperObject::unbound(self.clone(), class, Some(receiver), strategy, table))
    }

    /// Resolve `class_name`, construct an instance from `args` and wrap it
    /// with the construction strategy
    pub fn create_instance(
        self: &Arc<Self>,
        class_name: &str,
        args: &[HostValue],
    ) -> BridgeResult<WrapperObject> {
        let class = self.resolve_class(class_name)?;
        let identity = self.host.new_instance(&class, args)?;
        tracing::debug!(class = class.name(), object = %identity, "host instance created");
        self.wrap_object(identity, self.construction_strategy())
    }

    /// Bind `member` on `parent`. Never checks that the member exists.
    /// Members in an eager table reuse the entry's name and invoker.
    pub fn bind(self: &Arc<Self>, parent: &WrapperObject, member: &str) -> WrapperObject {
        match parent.method_table().and_then(|table| table.get(member)) {
            Some(entry) => self.assemble(
                parent,
                entry.member.clone(),
                BindingOrigin::Enumerated,
                entry.invoker.clone(),
            ),
            None => self.bind_with(parent, member, self.invoker_for(member)),
        }
    }

    /// Bind `member` with an explicit invoker
    pub fn bind_with(
        self: &Arc<Self>,
        parent: &WrapperObject,
        member: &str,
        invoker: Arc<dyn Invoker>,
    ) -> WrapperObject {
        let origin = match parent.method_table() {
            Some(table) if table.contains_key(member) => BindingOrigin::Enumerated,
            _ => BindingOrigin::Synthesized,
        };
        self.assemble(parent, Arc::from(member), origin, invoker)
    }

    fn assemble(
        self: &Arc<Self>,
        parent: &WrapperObject,
        member: Arc<str>,
        origin: BindingOrigin,
        invoker: Arc<dyn Invoker>,
    ) -> WrapperObject {
        let receiver = parent.receiver().map(|held| self.handles.retain_again(held));
        WrapperObject::bound(
            self.clone(),
            parent.class().clone(),
            receiver,
            parent.strategy(),
            member,
            origin,
            invoker,
        )
    }
}

impl fmt::Debug for ReflectionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectionBridge")
            .field("handles", &self.handles)
            .field("cached_tables", &self.tables.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_host::sample::{register_sample_classes, MATH_UTIL, WIDGET};

    fn bridge_with(config: BridgeConfig) -> Arc<ReflectionBridge> {
        let host = Arc::new(HostEnvironment::default());
        register_sample_classes(&host);
        Arc::new(ReflectionBridge::new(host, config))
    }

    fn bridge() -> Arc<ReflectionBridge> {
        bridge_with(BridgeConfig::default())
    }

    #[test]
    fn test_resolve_class_spellings() {
        let bridge = bridge();
        assert_eq!(bridge.resolve_class("com.example.Widget").unwrap().name(), WIDGET);
        assert_eq!(bridge.resolve_class("com/example/Widget").unwrap().name(), WIDGET);
        assert_eq!(
            bridge.resolve_class("com.example.Missing").unwrap_err(),
            BridgeError::ClassNotFound("com.example.Missing".to_string())
        );
    }

    #[test]
    fn test_enumerate_collapses_overloads() {
        let bridge = bridge();
        let class = bridge.resolve_class(WIDGET).unwrap();
        let table = bridge.enumerate_methods(&class);
        assert_eq!(table.get("resize").unwrap().method().arity(), 2);
        assert!(table.contains_key("getName"));
        assert!(!table.contains_key("checkInvariants"));
        // Second call hits the cache
        assert!(Arc::ptr_eq(&table, &bridge.enumerate_methods(&class)));
    }

    #[test]
    fn test_create_instance_is_eager_by_default() {
        let bridge = bridge();
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        assert_eq!(widget.strategy(), ReflectionStrategy::Eager);
        assert!(widget.method_table().is_some());
        assert_eq!(bridge.handles().len(), 1);
    }

    #[test]
    fn test_bind_origins() {
        let bridge = bridge();
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        let identity = widget.receiver().unwrap().identity();

        let enumerated = bridge.bind(&widget, "getName");
        assert_eq!(enumerated.origin(), Some(BindingOrigin::Enumerated));
        let synthesized = bridge.bind(&widget, "doesNotExist");
        assert_eq!(synthesized.origin(), Some(BindingOrigin::Synthesized));
        assert_eq!(bridge.handles().count(identity), 3);

        drop(enumerated);
        drop(synthesized);
        assert_eq!(bridge.handles().count(identity), 1);
        drop(widget);
        assert!(bridge.handles().is_empty());
    }

    #[test]
    fn test_eager_bindings_share_table_entry() {
        let bridge = bridge();
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        let entry = widget.method_table().unwrap().get("getName").unwrap().clone();

        let first = bridge.bind(&widget, "getName");
        let second = bridge.bind(&widget, "getName");
        assert!(Arc::ptr_eq(first.invoker().unwrap(), entry.invoker()));
        assert!(Arc::ptr_eq(second.invoker().unwrap(), entry.invoker()));

        // Another instance of the class reads the same cached table
        let other = bridge.create_instance(WIDGET, &[]).unwrap();
        let third = bridge.bind(&other, "getName");
        assert!(Arc::ptr_eq(third.invoker().unwrap(), entry.invoker()));
    }

    #[test]
    fn test_eager_table_caches_stub_invokers() {
        let mut config = BridgeConfig::default();
        config
            .reflection
            .stub_methods
            .insert("getName".to_string(), "stubbed".to_string());
        let bridge = bridge_with(config);
        let widget = bridge.create_instance(WIDGET, &[]).unwrap();
        let entry = widget.method_table().unwrap().get("getName").unwrap().clone();
        assert_eq!(entry.invoker().name(), "echo");
        let bound = bridge.bind(&widget, "getName");
        assert!(Arc::ptr_eq(bound.invoker().unwrap(), entry.invoker()));
    }

    #[test]
    fn test_lazy_class_wrapper_synthesizes() {
        let bridge = bridge();
        let class = bridge.resolve_class(MATH_UTIL).unwrap();
        let wrapper = bridge.wrap_class(class, ReflectionStrategy::Lazy);
        assert!(wrapper.method_table().is_none());
        let add = bridge.bind(&wrapper, "add");
        assert_eq!(add.origin(), Some(BindingOrigin::Synthesized));
        assert_eq!(add.bound_name(), Some("add"));
    }

    #[test]
    fn test_stub_methods_get_echo_invoker() {
        let mut config = BridgeConfig::default();
        config
            .reflection
            .stub_methods
            .insert("describeLater".to_string(), "soon".to_string());
        let bridge = bridge_with(config);
        let invoker = bridge.invoker_for("describeLater");
        assert_eq!(invoker.name(), "echo");
        assert_eq!(bridge.invoker_for("getName").name(), "reflective");
    }
}
