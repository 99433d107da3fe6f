//! The isolate runtime
//!
//! One isolate shared by every thread. All access goes through
//! [`IsolateRuntime::enter`], which performs the same sequence on every
//! path: attach the calling thread to the host, take the isolate lock, drain
//! deferred releases, run the operation inside a [`Scope`], collect if the
//! allocation threshold was crossed, and unlock.
//!
//! Operations inside the scope only see the scope, never the runtime, so
//! the lock cannot be taken twice by one thread.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::globals;
use crate::reflection::ReflectionBridge;
use crate::result::{ResultHandle, WrapperHandle};
use crate::services::{HostServices, TracingServices};
use crate::timer::{TimerBridge, TimerId, TimerMode};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tether_host::{HostEnvironment, HostValue};
use tether_script::{
    ContextId, GcStats, GlobalTemplate, Heap, Interpreter, Isolate, Persistent, ScriptError, Value,
};

/// Lifecycle of a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready,
    ShutDown,
}

impl RuntimeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RuntimeState::Uninitialized,
            1 => RuntimeState::Initializing,
            2 => RuntimeState::Ready,
            _ => RuntimeState::ShutDown,
        }
    }
}

/// Outcome of an explicit collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcReport {
    pub script: GcStats,
    pub host_freed: usize,
}

struct IsolateState {
    isolate: Isolate,
    default_context: ContextId,
}

/// Access to the isolate while its lock is held.
pub struct Scope<'a> {
    isolate: &'a mut Isolate,
    context: ContextId,
}

impl<'a> Scope<'a> {
    /// Context the scope was entered for
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn isolate(&mut self) -> &mut Isolate {
        self.isolate
    }

    pub fn heap(&self) -> &Heap {
        self.isolate.heap()
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        self.isolate.heap_mut()
    }

    pub fn evaluate(&mut self, source: &str) -> BridgeResult<Value> {
        Ok(self.isolate.evaluate(self.context, source)?)
    }

    /// Call a function value with no `this`
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> BridgeResult<Value> {
        Ok(self.isolate.call(self.context, callee, args)?)
    }

    pub fn persist(&mut self, value: Value) -> Persistent {
        self.isolate.heap_mut().persist(value)
    }

    pub fn resolve(&self, handle: &Persistent) -> BridgeResult<Value> {
        Ok(self.isolate.heap().resolve(handle)?.clone())
    }

    pub fn release(&mut self, handle: Persistent) -> bool {
        self.isolate.heap_mut().release(handle)
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> BridgeResult<()> {
        Ok(self.isolate.set_global(self.context, name, value)?)
    }

    /// Run `f` with an interpreter bound to the scope's context. Bridge
    /// errors raised inside come back out unchanged.
    pub fn with_interpreter<R>(
        &mut self,
        f: impl FnOnce(&mut Interpreter<'_>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        self.isolate
            .with_interpreter(self.context, |interp| f(interp).map_err(ScriptError::from))
            .map_err(BridgeError::from)
    }
}

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;
const SHUT_DOWN: u8 = 3;

pub struct IsolateRuntime {
    state: AtomicU8,
    config: BridgeConfig,
    host: Arc<HostEnvironment>,
    services: Arc<dyn HostServices>,
    bridge: Arc<ReflectionBridge>,
    timers: Arc<TimerBridge>,
    isolate: Mutex<Option<IsolateState>>,
    deferred: Mutex<Vec<Persistent>>,
}

impl IsolateRuntime {
    /// Runtime over `host` that reports script output through `tracing`
    pub fn new(host: Arc<HostEnvironment>, config: BridgeConfig) -> Arc<Self> {
        Self::with_services(host, config, Arc::new(TracingServices))
    }

    /// Runtime with explicit notification services. The isolate is created
    /// lazily on first use.
    pub fn with_services(
        host: Arc<HostEnvironment>,
        config: BridgeConfig,
        services: Arc<dyn HostServices>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|runtime| {
            let timers = Arc::new(TimerBridge::new(
                runtime.clone(),
                host.main_loop().clone(),
                services.clone(),
            ));
            let bridge = Arc::new(ReflectionBridge::new(host.clone(), config.clone()));
            Self {
                state: AtomicU8::new(UNINITIALIZED),
                config,
                host,
                services,
                bridge,
                timers,
                isolate: Mutex::new(None),
                deferred: Mutex::new(Vec::new()),
            }
        })
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<HostEnvironment> {
        &self.host
    }

    pub fn bridge(&self) -> &Arc<ReflectionBridge> {
        &self.bridge
    }

    pub fn timers(&self) -> &Arc<TimerBridge> {
        &self.timers
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the isolate now instead of on first use
    pub fn init(&self) -> BridgeResult<()> {
        self.enter(None, |_| Ok(()))
    }

    fn lock_isolate(&self) -> BridgeResult<MutexGuard<'_, Option<IsolateState>>> {
        let mut guard = self.isolate.lock();
        match self.state.load(Ordering::Acquire) {
            READY => Ok(guard),
            SHUT_DOWN => Err(BridgeError::ShutDown),
            _ => {
                self.state.store(INITIALIZING, Ordering::Release);
                match self.build_isolate() {
                    Ok(state) => {
                        *guard = Some(state);
                        self.state.store(READY, Ordering::Release);
                        tracing::info!(
                            max_call_depth = self.config.isolate.max_call_depth,
                            gc_threshold = self.config.isolate.gc_threshold,
                            "isolate runtime initialized"
                        );
                        Ok(guard)
                    }
                    Err(err) => {
                        self.state.store(UNINITIALIZED, Ordering::Release);
                        Err(err)
                    }
                }
            }
        }
    }

    fn build_isolate(&self) -> BridgeResult<IsolateState> {
        let mut template = GlobalTemplate::new();
        globals::install(&mut template, &self.bridge, &self.timers, &self.services);
        let mut isolate = Isolate::with_template(self.config.isolate_config(), template);
        let default_context = isolate.create_context()?;
        Ok(IsolateState {
            isolate,
            default_context,
        })
    }

    /// Cancel every timer and drop the isolate. Further calls fail with
    /// [`BridgeError::ShutDown`].
    pub fn shutdown(&self) {
        let mut guard = self.isolate.lock();
        if self.state.swap(SHUT_DOWN, Ordering::AcqRel) == SHUT_DOWN {
            return;
        }
        match guard.take() {
            Some(mut state) => {
                let cancelled = self.timers.cancel_all(state.isolate.heap_mut());
                tracing::debug!(cancelled, "timers cancelled at shutdown");
                drop(state);
            }
            None => self.timers.forget_all(),
        }
        self.deferred.lock().clear();
        drop(guard);
        let freed = self.host.collect_garbage();
        tracing::info!(host_freed = freed, "isolate runtime shut down");
    }

    /// Run `f` under the isolate lock, in `context` or the default context
    pub(crate) fn enter<R>(
        &self,
        context: Option<ContextId>,
        f: impl FnOnce(&mut Scope<'_>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        self.host.attach_current_thread()?;
        let mut guard = self.lock_isolate()?;
        tracing::trace!(thread = ?std::thread::current().id(), "isolate lock acquired");
        let state = guard.as_mut().ok_or(BridgeError::ShutDown)?;
        self.drain_deferred(state.isolate.heap_mut());

        let context = context.unwrap_or(state.default_context);
        if !state.isolate.has_context(context) {
            return Err(BridgeError::InvalidHandle(format!("context {}", context)));
        }
        let result = f(&mut Scope {
            isolate: &mut state.isolate,
            context,
        });

        if let Some(stats) = state.isolate.maybe_collect() {
            let host_freed = self.host.collect_garbage();
            tracing::debug!(
                live = stats.live,
                freed = stats.freed,
                host_freed,
                "opportunistic collection"
            );
        }
        result
    }

    fn drain_deferred(&self, heap: &mut Heap) {
        let pending = std::mem::take(&mut *self.deferred.lock());
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        for handle in pending {
            heap.release(handle);
        }
        tracing::trace!(count, "deferred releases drained");
    }

    /// Queue a handle for release at the next lock acquisition
    pub(crate) fn defer_release(&self, handle: Persistent) {
        if self.state() == RuntimeState::ShutDown {
            return;
        }
        self.deferred.lock().push(handle);
    }

    /// Full collection of both heaps
    pub fn collect_garbage(&self) -> BridgeResult<GcReport> {
        let script = self.enter(None, |scope| Ok(scope.isolate().collect_garbage()))?;
        let host_freed = self.host.collect_garbage();
        tracing::debug!(
            live = script.live,
            freed = script.freed,
            host_freed,
            "collection requested"
        );
        Ok(GcReport { script, host_freed })
    }

    // ========================================================================
    // Contexts and evaluation
    // ========================================================================

    pub fn default_context(&self) -> BridgeResult<ContextId> {
        self.enter(None, |scope| Ok(scope.context()))
    }

    /// New context with the builtins and the bridge globals
    pub fn create_context(&self) -> BridgeResult<ContextId> {
        let context = self.enter(None, |scope| Ok(scope.isolate().create_context()?))?;
        tracing::debug!(%context, "context created");
        Ok(context)
    }

    /// Dispose a context and cancel its timers. The default context cannot
    /// be disposed.
    pub fn dispose_context(&self, context: ContextId) -> BridgeResult<bool> {
        let timers = self.timers.clone();
        self.enter(None, |scope| {
            if scope.context() == context {
                return Err(BridgeError::InvalidHandle(
                    "the default context cannot be disposed".to_string(),
                ));
            }
            let cancelled = timers.cancel_for_context(scope.heap_mut(), context);
            let disposed = scope.isolate().dispose_context(context);
            if disposed {
                tracing::debug!(%context, cancelled, "context disposed");
            }
            Ok(disposed)
        })
    }

    /// Compile and run `source` in `context`
    pub fn evaluate(
        self: &Arc<Self>,
        context: ContextId,
        source: &str,
    ) -> BridgeResult<ResultHandle> {
        let value = self.enter(Some(context), |scope| {
            let value = scope.evaluate(source)?;
            Ok(scope.persist(value))
        })?;
        Ok(ResultHandle::new(self.clone(), context, value))
    }

    /// Bind a host wrapper as a global of `context`
    pub fn bind_global(
        &self,
        context: ContextId,
        name: &str,
        wrapper: &WrapperHandle,
    ) -> BridgeResult<()> {
        let object = wrapper.object().clone();
        self.enter(Some(context), |scope| {
            let value = scope.heap_mut().alloc_host(object);
            scope.set_global(name, value)
        })
    }

    /// Bind a script array of numbers as a global of `context`
    pub fn set_integer_array(
        &self,
        context: ContextId,
        name: &str,
        values: &[i32],
    ) -> BridgeResult<()> {
        self.enter(Some(context), |scope| {
            let items = values.iter().map(|&n| Value::Number(n as f64)).collect();
            let array = scope.heap_mut().alloc_array(items);
            scope.set_global(name, array)
        })
    }

    // ========================================================================
    // Host objects
    // ========================================================================

    /// Construct `class_name` with its no-argument constructor
    pub fn create_instance(self: &Arc<Self>, class_name: &str) -> BridgeResult<WrapperHandle> {
        self.create_instance_with(class_name, &[])
    }

    pub fn create_instance_with(
        self: &Arc<Self>,
        class_name: &str,
        args: &[HostValue],
    ) -> BridgeResult<WrapperHandle> {
        let bridge = self.bridge.clone();
        let wrapper = self.enter(None, |_| bridge.create_instance(class_name, args))?;
        Ok(WrapperHandle::new(self.clone(), Arc::new(wrapper)))
    }

    /// Class-level wrapper using the class lookup strategy
    pub fn for_name(self: &Arc<Self>, class_name: &str) -> BridgeResult<WrapperHandle> {
        let class = self.bridge.resolve_class(class_name)?;
        let wrapper = self.bridge.wrap_class(class, self.bridge.class_lookup_strategy());
        Ok(WrapperHandle::new(self.clone(), Arc::new(wrapper)))
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn set_timeout(
        &self,
        context: ContextId,
        callback: &ResultHandle,
        delay_ms: f64,
    ) -> BridgeResult<TimerId> {
        self.schedule(context, callback, delay_ms, TimerMode::OneShot)
    }

    pub fn set_interval(
        &self,
        context: ContextId,
        callback: &ResultHandle,
        delay_ms: f64,
    ) -> BridgeResult<TimerId> {
        self.schedule(context, callback, delay_ms, TimerMode::Periodic)
    }

    fn schedule(
        &self,
        context: ContextId,
        callback: &ResultHandle,
        delay_ms: f64,
        mode: TimerMode,
    ) -> BridgeResult<TimerId> {
        let timers = self.timers.clone();
        self.enter(Some(context), |scope| {
            let value = scope.resolve(callback.persistent()?)?;
            timers.schedule(scope.heap_mut(), context, value, delay_ms, mode)
        })
    }

    /// Cancel a timer. False if it already fired or was cancelled.
    pub fn cancel_timer(&self, id: TimerId) -> BridgeResult<bool> {
        let timers = self.timers.clone();
        self.enter(None, |scope| Ok(timers.cancel(scope.heap_mut(), id)))
    }
}

impl fmt::Debug for IsolateRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolateRuntime")
            .field("state", &self.state())
            .field("bridge", &self.bridge)
            .field("timers", &self.timers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_host::sample::register_sample_classes;

    fn runtime() -> Arc<IsolateRuntime> {
        let host = Arc::new(HostEnvironment::default());
        register_sample_classes(&host);
        IsolateRuntime::new(host, BridgeConfig::default())
    }

    #[test]
    fn test_lazy_initialization() {
        let runtime = runtime();
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);
        runtime.init().unwrap();
        assert_eq!(runtime.state(), RuntimeState::Ready);
        assert!(runtime.host().is_current_thread_attached());
    }

    #[test]
    fn test_first_use_initializes() {
        let runtime = runtime();
        let ctx = runtime.default_context().unwrap();
        assert_eq!(runtime.state(), RuntimeState::Ready);
        assert_eq!(runtime.evaluate(ctx, "1 + 1").unwrap().to_integer().unwrap(), 2);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let runtime = runtime();
        runtime.init().unwrap();
        runtime.shutdown();
        assert_eq!(runtime.state(), RuntimeState::ShutDown);
        assert_eq!(runtime.create_context().unwrap_err(), BridgeError::ShutDown);
        runtime.shutdown();
    }

    #[test]
    fn test_shutdown_before_init() {
        let runtime = runtime();
        runtime.shutdown();
        assert_eq!(runtime.default_context().unwrap_err(), BridgeError::ShutDown);
    }

    #[test]
    fn test_contexts() {
        let runtime = runtime();
        let default = runtime.default_context().unwrap();
        let ctx = runtime.create_context().unwrap();
        runtime.evaluate(ctx, "var marker = 7;").unwrap();
        assert_eq!(
            runtime.evaluate(default, "typeof marker").unwrap().to_string().unwrap(),
            "undefined"
        );
        assert!(runtime.dispose_context(ctx).unwrap());
        assert!(matches!(runtime.evaluate(ctx, "1"), Err(BridgeError::InvalidHandle(_))));
        assert!(matches!(
            runtime.dispose_context(default),
            Err(BridgeError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_deferred_release_drained_on_next_entry() {
        let runtime = runtime();
        let ctx = runtime.default_context().unwrap();
        let baseline = runtime
            .enter(None, |scope| Ok(scope.heap().persistent_count()))
            .unwrap();
        let handle = runtime.evaluate(ctx, "[1, 2]").unwrap();
        drop(handle);
        assert_eq!(runtime.deferred.lock().len(), 1);
        let after = runtime
            .enter(None, |scope| Ok(scope.heap().persistent_count()))
            .unwrap();
        assert_eq!(after, baseline);
        assert!(runtime.deferred.lock().is_empty());
    }

    #[test]
    fn test_set_integer_array_global() {
        let runtime = runtime();
        let ctx = runtime.default_context().unwrap();
        runtime.set_integer_array(ctx, "numbers", &[3, 4, 5]).unwrap();
        let sum = runtime
            .evaluate(ctx, "numbers.reduce((a, b) => a + b, 0)")
            .unwrap();
        assert_eq!(sum.to_integer().unwrap(), 12);
    }

    #[test]
    fn test_collect_garbage_frees_unreachable_wrappers() {
        let runtime = runtime();
        let ctx = runtime.default_context().unwrap();
        runtime
            .evaluate(ctx, "createInstance('com.example.Widget'); 0")
            .unwrap();
        let report = runtime.collect_garbage().unwrap();
        assert!(report.script.freed > 0);
        assert_eq!(report.host_freed, 1);
        assert!(runtime.bridge().handles().is_empty());
    }
}
