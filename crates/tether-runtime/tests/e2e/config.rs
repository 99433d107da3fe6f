//! Runtime behavior driven by `tether.toml`

use super::harness::*;
use std::io::Write;
use tether_runtime::{BindingOrigin, BridgeConfig, ReflectionStrategy};

fn config_file(content: &str) -> BridgeConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    BridgeConfig::from_file(file.path()).unwrap()
}

#[test]
fn test_stub_methods_answer_with_sentinel() {
    let config = config_file(
        r#"
[reflection.stub_methods]
describeLater = "pending"
"#,
    );
    let h = Harness::with_config(config);
    let value = h
        .eval("createInstance('com.example.Widget').describeLater(1, 2, 3)")
        .unwrap();
    assert_eq!(value.to_string().unwrap(), "pending");

    // Host-side binding goes through the same invoker
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    let stub = widget.get("describeLater");
    assert_eq!(stub.object().origin(), Some(BindingOrigin::Synthesized));
    assert_eq!(stub.invoke(&[]).unwrap().to_string().unwrap(), "pending");

    // Members without a stub still reach the host
    assert_eq!(
        widget.get("getName").invoke(&[]).unwrap().to_string().unwrap(),
        "widget-1"
    );
}

#[test]
fn test_stub_shadows_real_member() {
    let config = config_file(
        r#"
[reflection.stub_methods]
getName = "stubbed"
"#,
    );
    let h = Harness::with_config(config);
    let name = h
        .eval("createInstance('com.example.Widget', 'real').getName()")
        .unwrap();
    assert_eq!(name.to_string().unwrap(), "stubbed");
}

#[test]
fn test_class_lookup_defaults_to_lazy() {
    let h = Harness::new();
    let class = h.runtime.for_name("com.example.MathUtil").unwrap();
    assert_eq!(class.object().strategy(), ReflectionStrategy::Lazy);
    assert!(class.method_names().is_none());
    let add = class.get("add");
    assert_eq!(add.object().origin(), Some(BindingOrigin::Synthesized));
}

#[test]
fn test_eager_class_lookup_enumerates_methods() {
    let config = config_file(
        r#"
[reflection]
class_lookup = "eager"
"#,
    );
    let h = Harness::with_config(config);
    let class = h.runtime.for_name("com.example.MathUtil").unwrap();
    let names = class.method_names().unwrap();
    for expected in ["add", "scale", "sum", "max", "fail"] {
        assert!(names.iter().any(|n| n == expected), "missing {} in {:?}", expected, names);
    }
    assert_eq!(class.get("add").object().origin(), Some(BindingOrigin::Enumerated));
    assert_eq!(class.get("missing").object().origin(), Some(BindingOrigin::Synthesized));

    // Same behavior from script
    let sum = h.eval("Class.forName('com.example.MathUtil').add(2, 3)").unwrap();
    assert_eq!(sum.to_integer().unwrap(), 5);
}

#[test]
fn test_construction_defaults_to_eager() {
    let h = Harness::new();
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    let names = widget.method_names().unwrap();
    assert!(names.iter().any(|n| n == "getName"));
    assert!(!names.iter().any(|n| n == "checkInvariants"));
    // One entry per name even with overloads
    assert_eq!(names.iter().filter(|n| *n == "resize").count(), 1);
}

#[test]
fn test_lazy_construction() {
    let config = config_file(
        r#"
[reflection]
construction = "lazy"
"#,
    );
    let h = Harness::with_config(config);
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    assert!(widget.method_names().is_none());
    assert_eq!(widget.get("getSize").invoke(&[]).unwrap().to_integer().unwrap(), 10);
    // Lazy wrappers still report unknown members only when called
    let err = widget.get("nope").invoke(&[]).unwrap_err();
    assert_eq!(err.kind(), "MethodNotFoundError");
}

#[test]
fn test_call_depth_limit() {
    let config = config_file(
        r#"
[isolate]
max_call_depth = 16
"#,
    );
    let h = Harness::with_config(config);
    let err = h
        .eval("function down(n) { return n === 0 ? 0 : down(n - 1); } down(100)")
        .unwrap_err();
    assert_eq!(err.kind(), "ScriptRuntimeError");
    assert_eq!(
        h.eval("down(5)").unwrap().to_integer().unwrap(),
        0
    );
}

#[test]
fn test_invalid_config_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[reflection]\nconstruction = \"sometimes\"\n").unwrap();
    assert!(BridgeConfig::from_file(file.path()).is_err());
}
