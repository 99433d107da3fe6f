//! Runtime lifecycle, contexts and host handle ownership

use super::harness::*;
use std::sync::Arc;
use tether_host::sample::register_sample_classes;
use tether_host::HostEnvironment;
use tether_runtime::{BridgeConfig, IsolateRuntime, RuntimeState};

#[test]
fn test_isolate_created_on_first_use() {
    let host = Arc::new(HostEnvironment::default());
    register_sample_classes(&host);
    let runtime = IsolateRuntime::new(host, BridgeConfig::default());
    assert_eq!(runtime.state(), RuntimeState::Uninitialized);
    runtime.init().unwrap();
    assert_eq!(runtime.state(), RuntimeState::Ready);
    // A second init is a no-op
    runtime.init().unwrap();
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn test_host_handles_follow_wrappers() {
    let h = Harness::new();
    let handles = h.runtime.bridge().handles();
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(h.host.live_objects(), 1);

    let bound = widget.get("getName");
    let identity = widget.object().receiver().unwrap().identity();
    assert_eq!(handles.count(identity), 2);

    drop(bound);
    assert_eq!(handles.count(identity), 1);
    drop(widget);
    assert!(handles.is_empty());

    let report = h.runtime.collect_garbage().unwrap();
    assert_eq!(report.host_freed, 1);
    assert_eq!(h.host.live_objects(), 0);
}

#[test]
fn test_script_wrappers_released_by_collection() {
    let h = Harness::new();
    h.eval(
        "(() => { \
           for (let i = 0; i < 5; i++) { createInstance('com.example.Widget').getName(); } \
           return 0; \
         })()",
    )
    .unwrap();
    h.runtime.collect_garbage().unwrap();
    assert!(h.runtime.bridge().handles().is_empty());
    assert_eq!(h.host.live_objects(), 0);
}

#[test]
fn test_script_global_keeps_host_object() {
    let h = Harness::new();
    h.eval("var keeper = createInstance('com.example.Widget', 'kept')").unwrap();
    h.runtime.collect_garbage().unwrap();
    assert_eq!(h.host.live_objects(), 1);
    assert_eq!(h.eval("keeper.getName()").unwrap().to_string().unwrap(), "kept");

    h.eval("keeper = null").unwrap();
    h.runtime.collect_garbage().unwrap();
    assert_eq!(h.host.live_objects(), 0);
}

#[test]
fn test_contexts_are_isolated() {
    let h = Harness::new();
    let other = h.runtime.create_context().unwrap();
    assert_ne!(other, h.ctx);
    h.eval("var shared = 'default'").unwrap();
    let seen = h.runtime.evaluate(other, "typeof shared").unwrap();
    assert_eq!(seen.to_string().unwrap(), "undefined");
    assert_eq!(seen.context(), other);

    h.runtime.evaluate(other, "var shared = 'other'").unwrap();
    assert_eq!(h.eval("shared").unwrap().to_string().unwrap(), "default");
}

#[test]
fn test_dispose_context() {
    let h = Harness::new();
    let ctx = h.runtime.create_context().unwrap();
    let kept = h.runtime.evaluate(ctx, "[1, 2]").unwrap();
    assert!(h.runtime.dispose_context(ctx).unwrap());
    assert!(!h.runtime.dispose_context(ctx).unwrap());

    let err = h.runtime.evaluate(ctx, "1").unwrap_err();
    assert_eq!(err.kind(), "InvalidHandleError");
    assert_eq!(kept.to_integer_array().unwrap_err().kind(), "InvalidHandleError");
}

#[test]
fn test_default_context_not_disposable() {
    let h = Harness::new();
    let err = h.runtime.dispose_context(h.ctx).unwrap_err();
    assert_eq!(err.kind(), "InvalidHandleError");
    assert_eq!(h.eval("1 + 1").unwrap().to_integer().unwrap(), 2);
}

#[test]
fn test_shutdown() {
    let h = Harness::new();
    let before = h.eval("40 + 2").unwrap();
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    h.runtime.shutdown();
    assert_eq!(h.runtime.state(), RuntimeState::ShutDown);

    assert_eq!(h.eval("1").unwrap_err().kind(), "ShutDownError");
    assert_eq!(h.runtime.create_context().unwrap_err().kind(), "ShutDownError");
    assert_eq!(before.to_integer().unwrap_err().kind(), "ShutDownError");
    assert_eq!(widget.get("getName").invoke(&[]).unwrap_err().kind(), "ShutDownError");
    assert_eq!(h.runtime.collect_garbage().unwrap_err().kind(), "ShutDownError");

    // Releasing after shutdown is quiet
    before.release().unwrap();
    drop(widget);
    h.runtime.shutdown();
}

#[test]
fn test_shutdown_leaves_host_running() {
    let h = Harness::new();
    h.runtime.shutdown();
    assert!(!h.host.is_shut_down());
    let fresh = IsolateRuntime::new(h.host.clone(), BridgeConfig::default());
    let ctx = fresh.default_context().unwrap();
    let name = fresh
        .evaluate(ctx, "createInstance('com.example.Widget').getName()")
        .unwrap()
        .to_string()
        .unwrap();
    assert_eq!(name, "widget-1");
}

#[test]
fn test_runtime_dropped_with_live_timers() {
    let h = Harness::new();
    h.eval("setInterval(() => $log('tick'), 0)").unwrap();
    let Harness { host, runtime, services, .. } = h;
    drop(runtime);
    // The fire message finds no runtime and does nothing
    host.main_loop().run_pending();
    assert!(services.channel(tether_runtime::Channel::Log).is_empty());
}
