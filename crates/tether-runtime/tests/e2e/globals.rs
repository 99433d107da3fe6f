//! Notification globals and the host services they reach

use super::harness::*;
use tether_runtime::Channel;

#[test]
fn test_notify_reaches_host() {
    let h = Harness::new();
    h.eval("$notify('build finished')").unwrap();
    h.eval("$notify(42)").unwrap();
    assert_eq!(h.services.channel(Channel::Notify), vec!["build finished", "42"]);
    assert!(h.logs().is_empty());
}

#[test]
fn test_log_renders_json_for_structures() {
    let h = Harness::new();
    h.eval("$log({ a: 1, b: [true, null] })").unwrap();
    h.eval("$log([1, 'two'])").unwrap();
    h.eval("$log('plain')").unwrap();
    h.eval("$log(1.5)").unwrap();
    h.eval("$log()").unwrap();
    assert_eq!(
        h.logs(),
        vec![r#"{"a":1,"b":[true,null]}"#, r#"[1,"two"]"#, "plain", "1.5", "undefined"]
    );
}

#[test]
fn test_log_host_object_uses_display_string() {
    let h = Harness::new();
    h.eval("$log(Class.forName('com.example.MathUtil'))").unwrap();
    let logs = h.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("com.example.MathUtil"), "{}", logs[0]);
}

#[test]
fn test_console_joins_arguments() {
    let h = Harness::new();
    h.eval("console.log('sum', 1 + 2, [3])").unwrap();
    h.eval("console.error('failed:', { code: 7 })").unwrap();
    assert_eq!(h.logs(), vec!["sum 3 [3]"]);
    assert_eq!(h.errors(), vec![r#"failed: {"code":7}"#]);
}

#[test]
fn test_error_channel() {
    let h = Harness::new();
    h.eval("$error('disk full')").unwrap();
    assert_eq!(h.errors(), vec!["disk full"]);
    assert_eq!(
        h.services.messages(),
        vec![(Channel::Error, "disk full".to_string())]
    );
}

#[test]
fn test_channels_keep_order() {
    let h = Harness::new();
    h.eval("$log('one'); $notify('two'); $error('three'); $log('four')")
        .unwrap();
    let messages = h.services.messages();
    let channels: Vec<Channel> = messages.iter().map(|(c, _)| *c).collect();
    assert_eq!(
        channels,
        vec![Channel::Log, Channel::Notify, Channel::Error, Channel::Log]
    );
    h.services.clear();
    assert!(h.services.messages().is_empty());
}

#[test]
fn test_globals_present_in_every_context() {
    let h = Harness::new();
    let ctx = h.runtime.create_context().unwrap();
    let kinds = h
        .runtime
        .evaluate(
            ctx,
            "[typeof $notify, typeof $log, typeof $error, typeof setTimeout, \
              typeof clearInterval, typeof createInstance, typeof Class.forName, \
              typeof console.log].join(',')",
        )
        .unwrap()
        .to_string()
        .unwrap();
    assert_eq!(
        kinds,
        "function,function,function,function,function,function,function,function"
    );
}

#[test]
fn test_class_for_name_requires_string() {
    expect_error_kind("Class.forName(5)", "TypeMismatchError");
    expect_error_kind("createInstance()", "TypeMismatchError");
}
