//! Host objects seen from both sides of the bridge

use super::harness::*;
use tether_host::sample::{MATH_UTIL, WIDGET};
use tether_host::HostValue;
use tether_runtime::{BindingOrigin, BridgeError};

// ============================================================================
// Host-driven
// ============================================================================

#[test]
fn test_widget_get_name_end_to_end() {
    let h = Harness::new();
    let widget = h.runtime.create_instance("com.example.Widget").unwrap();
    let names = widget.method_names().unwrap();
    assert!(names.iter().any(|n| n == "getName"));

    let get_name = widget.get("getName");
    assert_eq!(get_name.object().origin(), Some(BindingOrigin::Enumerated));
    let result = get_name.invoke(&[]).unwrap();
    assert_eq!(result.to_string().unwrap(), "widget-1");
}

#[test]
fn test_every_enumerated_method_returns_declared_type() {
    let h = Harness::new();
    let widget = h.runtime.create_instance(WIDGET).unwrap();
    for (name, expected) in [
        ("getName", "string"),
        ("getSize", "number"),
        ("area", "number"),
        ("isSquare", "boolean"),
        ("describe", "string"),
        ("getDimensions", "object"),
        ("copy", "object"),
    ] {
        let result = widget.get(name).invoke(&[]).unwrap();
        assert_eq!(result.type_of().unwrap(), expected, "method {}", name);
    }
}

#[test]
fn test_create_instance_with_args() {
    let h = Harness::new();
    let widget = h
        .runtime
        .create_instance_with(WIDGET, &[HostValue::string("custom")])
        .unwrap();
    let name = widget.get("getName").invoke(&[]).unwrap();
    assert_eq!(name.to_string().unwrap(), "custom");
}

#[test]
fn test_create_instance_unknown_class() {
    let h = Harness::new();
    assert_eq!(
        h.runtime.create_instance("com.example.Nope").unwrap_err(),
        BridgeError::ClassNotFound("com.example.Nope".to_string())
    );
}

#[test]
fn test_unknown_member_binds_but_fails_on_invoke() {
    let h = Harness::new();
    let widget = h.runtime.create_instance(WIDGET).unwrap();
    let bogus = widget.get("flyToTheMoon");
    assert!(bogus.is_callable());
    assert_eq!(bogus.object().origin(), Some(BindingOrigin::Synthesized));
    assert_eq!(
        bogus.invoke(&[]).unwrap_err(),
        BridgeError::MethodNotFound {
            class: WIDGET.to_string(),
            method: "flyToTheMoon".to_string(),
            arity: 0,
        }
    );
}

#[test]
fn test_invoke_with_host_arguments() {
    let h = Harness::new();
    let widget = h.runtime.create_instance(WIDGET).unwrap();
    widget
        .get("resize")
        .invoke(&[HostValue::Int(2), HostValue::Int(8)])
        .unwrap();
    let area = widget.get("area").invoke(&[]).unwrap();
    assert_eq!(area.to_integer().unwrap(), 16);
}

#[test]
fn test_bound_global_is_shared_with_host() {
    let h = Harness::new();
    let widget = h.runtime.create_instance(WIDGET).unwrap();
    h.runtime.bind_global(h.ctx, "widget", &widget).unwrap();
    h.eval("widget.setName('from script')").unwrap();
    let name = widget.get("getName").invoke(&[]).unwrap();
    assert_eq!(name.to_string().unwrap(), "from script");
}

#[test]
fn test_for_name_wraps_class() {
    let h = Harness::new();
    let math = h.runtime.for_name("com/example/MathUtil").unwrap();
    assert_eq!(math.class_name(), MATH_UTIL);
    assert!(!math.is_callable());
    let sum = math.get("add").invoke(&[HostValue::Int(40), HostValue::Int(2)]).unwrap();
    assert_eq!(sum.to_integer().unwrap(), 42);
}

// ============================================================================
// Script-driven
// ============================================================================

#[test]
fn test_script_creates_and_calls() {
    expect_string(
        "let w = createInstance('com.example.Widget'); w.getName()",
        "widget-1",
    );
}

#[test]
fn test_script_new_on_class_wrapper() {
    expect_string(
        "const Widget = Class.forName('com.example.Widget'); \
         const w = new Widget('made'); \
         w.describe()",
        "Widget[name=made, size=10x10]",
    );
}

#[test]
fn test_script_overloads_by_arity() {
    expect_i32(
        "let w = createInstance('com.example.Widget'); \
         w.resize(3); w.resize(w.getSize(), 5); \
         w.area()",
        15,
    );
}

#[test]
fn test_script_static_calls() {
    expect_i32("Class.forName('com.example.MathUtil').add(19, 23)", 42);
    expect_f64("Class.forName('com.example.MathUtil').scale(1.5, 3)", 4.5);
    expect_i32("Class.forName('com.example.MathUtil').sum([1, 2, 3, 4])", 10);
    expect_f64("Class.forName('com.example.MathUtil').max(3000000000, 7)", 3_000_000_000.0);
}

#[test]
fn test_host_arrays_become_script_arrays() {
    expect_string(
        "let w = createInstance('com.example.Widget'); w.resize(4, 6); w.getDimensions().join('x')",
        "4x6",
    );
}

#[test]
fn test_returned_objects_chain() {
    expect_string(
        "const f = Class.forName('com.example.WidgetFactory'); \
         f.create('chained').copy().getName()",
        "chained",
    );
}

#[test]
fn test_wrappers_pass_back_as_arguments() {
    expect_f64(
        "let w = createInstance('com.example.Widget'); w.resize(3, 7); \
         Class.forName('com.example.WidgetFactory').measure(w)",
        21.0,
    );
}

#[test]
fn test_wrong_wrapper_class_is_marshal_error() {
    let err = expect_error_kind(
        "let c = createInstance('com.example.Counter', 1); \
         Class.forName('com.example.WidgetFactory').measure(c)",
        "MarshalError",
    );
    assert_eq!(
        err,
        BridgeError::Marshal {
            index: 0,
            expected: WIDGET.to_string(),
            found: "com.example.Counter".to_string(),
        }
    );
}

#[test]
fn test_counter_state_persists_across_calls() {
    expect_i32(
        "let c = createInstance('com.example.Counter', 40); c.plusOne(); c.plusOne()",
        42,
    );
}

#[test]
fn test_unknown_member_read_is_a_function() {
    expect_string(
        "let w = createInstance('com.example.Widget'); typeof w.whatever",
        "function",
    );
}

#[test]
fn test_wrapper_string_forms() {
    expect_string("String(Class.forName('com.example.Widget'))", "class com.example.Widget");
    expect_string(
        "String(createInstance('com.example.Widget').getName)",
        "Widget.getName",
    );
}

#[test]
fn test_strings_cross_byte_exact() {
    expect_string(
        "let w = createInstance('com.example.Widget', 'ünïcödé \u{1F680}'); w.getName()",
        "ünïcödé \u{1F680}",
    );
}

#[test]
fn test_evaluate_is_idempotent() {
    let h = Harness::new();
    let source = "let total = 0; for (let i = 1; i <= 10; i++) { total += i * i; } total";
    let ctx_a = h.runtime.create_context().unwrap();
    let ctx_b = h.runtime.create_context().unwrap();
    let first = h.runtime.evaluate(ctx_a, source).unwrap().to_integer().unwrap();
    let second = h.runtime.evaluate(ctx_b, source).unwrap().to_integer().unwrap();
    assert_eq!(first, 385);
    assert_eq!(first, second);

    let pure = "Class.forName('com.example.MathUtil').add(2, 3) * 2";
    let a = h.eval(pure).unwrap().to_integer().unwrap();
    let b = h.eval(pure).unwrap().to_integer().unwrap();
    assert_eq!(a, b);
}
