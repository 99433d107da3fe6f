//! Multi-threaded access to one runtime

use super::harness::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tether_host::sample::register_sample_classes;
use tether_host::{ClassBuilder, HostEnvironment, HostType, HostValue};
use tether_runtime::BridgeConfig;

const BLOCKER: &str = "test.Blocker";
const HOLD: Duration = Duration::from_millis(100);

/// Host with a `test.Blocker.hold()` that sleeps and tracks how many calls
/// overlap
fn blocking_host(
    config: &BridgeConfig,
    overlap: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
) -> Arc<HostEnvironment> {
    let host = Arc::new(HostEnvironment::new(config.host_config()));
    register_sample_classes(&host);
    let blocker = ClassBuilder::new(BLOCKER)
        .static_method("hold", vec![], HostType::Int, move |_, _| {
            let now = overlap.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(HOLD);
            overlap.fetch_sub(1, Ordering::SeqCst);
            Ok(HostValue::Int(1))
        })
        .build();
    host.register_class(blocker);
    host
}

#[test]
fn test_concurrent_evaluations_serialize() {
    let config = BridgeConfig::default();
    let overlap = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let host = blocking_host(&config, overlap, peak.clone());
    let h = Harness::with_host(host, config);

    let barrier = Arc::new(Barrier::new(2));
    let start = Instant::now();
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let runtime = h.runtime.clone();
            let ctx = h.ctx;
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                runtime
                    .evaluate(ctx, "Class.forName('test.Blocker').hold()")
                    .and_then(|r| r.to_integer())
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap().unwrap(), 1);
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(
        start.elapsed() >= HOLD * 2 - Duration::from_millis(10),
        "calls overlapped: {:?}",
        start.elapsed()
    );
}

#[test]
fn test_threads_share_context_state() {
    let h = Harness::new();
    h.eval("var hits = 0; function hit() { hits++; return hits; }").unwrap();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = h.runtime.clone();
            let ctx = h.ctx;
            thread::spawn(move || {
                for _ in 0..25 {
                    runtime.evaluate(ctx, "hit()").unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(h.eval("hits").unwrap().to_integer().unwrap(), 100);
}

#[test]
fn test_wrapper_used_from_other_thread() {
    let h = Harness::new();
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    let get_name = widget.get("getName");
    let name = thread::spawn(move || get_name.invoke(&[]).and_then(|r| r.to_string()))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(name, "widget-1");
}

#[test]
fn test_results_dropped_on_other_thread() {
    let h = Harness::new();
    let result = h.eval("[1, 2, 3]").unwrap();
    thread::spawn(move || drop(result)).join().unwrap();
    // Release is applied at the next entry
    let report = h.runtime.collect_garbage().unwrap();
    assert!(report.script.freed >= 1);
}

#[test]
fn test_worker_threads_detach_on_exit() {
    let h = Harness::new();
    let before = h.host.attached_thread_count();
    let workers: Vec<_> = (0..3)
        .map(|_| {
            let runtime = h.runtime.clone();
            let ctx = h.ctx;
            thread::spawn(move || runtime.evaluate(ctx, "1 + 1").unwrap().to_integer().unwrap())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 2);
    }
    assert_eq!(h.host.attached_thread_count(), before);
}

#[test]
fn test_attachment_limit() {
    let config = BridgeConfig::from_str("[host]\nmax_attached_threads = 1\n").unwrap();
    let h = Harness::with_config(config);
    assert!(h.host.is_current_thread_attached());

    let runtime = h.runtime.clone();
    let ctx = h.ctx;
    let err = thread::spawn(move || runtime.evaluate(ctx, "1").map(|_| ()))
        .join()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), "AttachmentError");

    // The calling thread keeps working
    assert_eq!(h.eval("2").unwrap().to_integer().unwrap(), 2);
}
