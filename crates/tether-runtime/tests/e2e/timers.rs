//! Timers scheduled on the host main loop

use super::harness::*;
use std::time::{Duration, Instant};
use tether_runtime::TimerId;

fn timer_id(h: &Harness, source: &str) -> TimerId {
    TimerId(h.eval(source).unwrap().to_integer().unwrap() as u64)
}

#[test]
fn test_one_shot_zero_delay_fires_once() {
    let h = Harness::new();
    h.eval("setTimeout(() => $log('fired'), 0)").unwrap();
    assert_eq!(h.pump(), 1);
    assert_eq!(h.pump(), 0);
    assert_eq!(h.logs(), vec!["fired"]);
    assert_eq!(h.runtime.timers().active(), 0);
}

#[test]
fn test_periodic_fires_until_cancelled() {
    let h = Harness::new();
    h.eval(
        "let ticks = 0; \
         const id = setInterval(() => { \
           ticks++; $log('tick ' + ticks); if (ticks === 3) clearInterval(id); \
         }, 0); \
         id",
    )
    .unwrap();
    for _ in 0..10 {
        h.pump();
    }
    assert_eq!(h.logs(), vec!["tick 1", "tick 2", "tick 3"]);
    assert_eq!(h.runtime.timers().active(), 0);
    assert_eq!(h.host.main_loop().pending(), 0);
}

#[test]
fn test_cancel_with_fire_in_flight_is_noop() {
    let h = Harness::new();
    let periodic = timer_id(&h, "setInterval(() => $log('periodic'), 0)");
    let once = timer_id(&h, "setTimeout(() => $log('once'), 0)");
    assert_eq!(h.host.main_loop().pending(), 2);

    assert!(h.runtime.cancel_timer(periodic).unwrap());
    assert!(h.runtime.cancel_timer(once).unwrap());
    assert!(!h.runtime.cancel_timer(once).unwrap());

    // The fire messages are still queued and must do nothing
    assert_eq!(h.pump(), 2);
    assert!(h.logs().is_empty());
    assert_eq!(h.host.main_loop().pending(), 0);
}

#[test]
fn test_cancel_after_fire_returns_false() {
    let h = Harness::new();
    let id = timer_id(&h, "setTimeout(() => $log('done'), 0)");
    h.pump();
    assert!(!h.runtime.cancel_timer(id).unwrap());
    h.eval(&format!("clearTimeout({})", id)).unwrap();
    assert_eq!(h.logs(), vec!["done"]);
}

#[test]
fn test_host_scheduled_callback() {
    let h = Harness::new();
    let callback = h
        .eval("(() => { let calls = 0; return () => $log('host ' + (++calls)); })()")
        .unwrap();
    let once = h.runtime.set_timeout(h.ctx, &callback, 0.0).unwrap();
    let repeat = h.runtime.set_interval(h.ctx, &callback, 0.0).unwrap();
    // The timers pin the callback on their own
    drop(callback);
    h.runtime.collect_garbage().unwrap();

    h.pump();
    h.pump();
    assert!(h.runtime.cancel_timer(repeat).unwrap());
    assert!(!h.runtime.cancel_timer(once).unwrap());
    h.pump();
    assert_eq!(h.logs(), vec!["host 1", "host 2", "host 3"]);
}

#[test]
fn test_callback_error_reported_and_loop_continues() {
    let h = Harness::new();
    h.eval(
        "setTimeout(() => { throw new Error('bad callback'); }, 0); \
         setTimeout(() => $log('after'), 0)",
    )
    .unwrap();
    assert_eq!(h.pump(), 2);
    let errors = h.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("bad callback"), "{}", errors[0]);
    assert_eq!(h.logs(), vec!["after"]);
}

#[test]
fn test_non_function_callback_rejected() {
    expect_error_kind("setTimeout('not a function', 10)", "TypeMismatchError");
}

#[test]
fn test_delay_is_respected() {
    let h = Harness::new();
    h.eval("setTimeout(() => $log('late'), 40)").unwrap();
    let start = Instant::now();
    assert_eq!(h.pump(), 0);
    assert_eq!(h.pump_for(2000), 1);
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(h.logs(), vec!["late"]);
}

#[test]
fn test_out_of_range_delays_normalized() {
    let h = Harness::new();
    h.eval("setTimeout(() => $log('negative'), -100); setTimeout(() => $log('nan'), NaN)")
        .unwrap();
    assert_eq!(h.pump(), 2);
    h.eval("setTimeout(() => $log('huge'), 3000000000)").unwrap();
    assert_eq!(h.pump_for(2000), 1);
    assert_eq!(h.logs(), vec!["negative", "nan", "huge"]);
}

#[test]
fn test_timers_nest() {
    let h = Harness::new();
    h.eval("setTimeout(() => { $log('outer'); setTimeout(() => $log('inner'), 0); }, 0)")
        .unwrap();
    assert_eq!(h.pump(), 1);
    assert_eq!(h.pump(), 1);
    assert_eq!(h.logs(), vec!["outer", "inner"]);
}

#[test]
fn test_dispose_context_cancels_its_timers() {
    let h = Harness::new();
    let ctx = h.runtime.create_context().unwrap();
    h.runtime
        .evaluate(ctx, "setInterval(() => $log('other context'), 0)")
        .unwrap();
    h.eval("setTimeout(() => $log('default context'), 0)").unwrap();
    assert!(h.runtime.dispose_context(ctx).unwrap());
    h.pump();
    assert_eq!(h.logs(), vec!["default context"]);
}

#[test]
fn test_timers_run_in_their_own_context() {
    let h = Harness::new();
    let ctx = h.runtime.create_context().unwrap();
    h.runtime
        .evaluate(ctx, "var where = 'second'; setTimeout(() => $log(where), 0)")
        .unwrap();
    h.eval("var where = 'default'").unwrap();
    h.pump();
    assert_eq!(h.logs(), vec!["second"]);
}

#[test]
fn test_shutdown_cancels_timers() {
    let h = Harness::new();
    h.eval("setInterval(() => $log('tick'), 0)").unwrap();
    h.runtime.shutdown();
    assert_eq!(h.runtime.timers().active(), 0);
    h.pump();
    assert!(h.logs().is_empty());
}

#[test]
fn test_background_main_loop() {
    let h = Harness::new();
    h.host.main_loop().start().unwrap();
    h.eval(
        "let n = 0; \
         const id = setInterval(() => { \
           n++; if (n === 2) { clearInterval(id); $notify('done'); } \
         }, 5); \
         id",
    )
    .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while h.services.channel(tether_runtime::Channel::Notify).is_empty() {
        assert!(Instant::now() < deadline, "interval never completed");
        std::thread::sleep(Duration::from_millis(5));
    }
    h.host.main_loop().stop();
    assert_eq!(h.services.channel(tether_runtime::Channel::Notify), vec!["done"]);
}
