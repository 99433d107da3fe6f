//! Result handle conversions

use super::harness::*;
use tether_runtime::BridgeError;

#[test]
fn test_integer_array_from_literal() {
    let result = eval("[1,2,3]").unwrap();
    assert_eq!(result.to_integer_array().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_integer_array_rejects_scalar() {
    let result = eval("42").unwrap();
    assert!(matches!(
        result.to_integer_array(),
        Err(BridgeError::TypeMismatch { .. })
    ));
    // The scalar itself converts fine
    assert_eq!(result.to_integer().unwrap(), 42);
}

#[test]
fn test_integer_array_from_host() {
    let h = Harness::new();
    let result = h
        .eval("let w = createInstance('com.example.Widget'); w.resize(2, 9); w.getDimensions()")
        .unwrap();
    assert_eq!(result.to_integer_array().unwrap(), vec![2, 9]);
}

#[test]
fn test_integer_array_round_trip_through_global() {
    let h = Harness::new();
    h.runtime.set_integer_array(h.ctx, "input", &[5, -3, 8]).unwrap();
    let result = h.eval("input.map(x => x * 2)").unwrap();
    assert_eq!(result.to_integer_array().unwrap(), vec![10, -6, 16]);
}

#[test]
fn test_to_string_of_host_values() {
    expect_string(
        "createInstance('com.example.Widget').describe()",
        "Widget[name=widget-1, size=10x10]",
    );
    expect_string("Class.forName('com.example.MathUtil').max(1, 2)", "2");
}

#[test]
fn test_to_json_of_mixed_structure() {
    let result = eval(
        "let w = createInstance('com.example.Widget'); \
         ({ name: w.getName(), dims: w.getDimensions(), square: w.isSquare() })",
    )
    .unwrap();
    assert_eq!(
        result.to_json().unwrap(),
        serde_json::json!({ "name": "widget-1", "dims": [10, 10], "square": true })
    );
}

#[test]
fn test_results_outlive_collection() {
    let h = Harness::new();
    let kept = h.eval("[7, 8, 9]").unwrap();
    for _ in 0..3 {
        h.eval(
            "(() => { \
               let garbage = []; \
               for (let i = 0; i < 100; i++) { garbage.push([i]); } \
               return garbage.length; \
             })()",
        )
        .unwrap();
        h.runtime.collect_garbage().unwrap();
    }
    assert_eq!(kept.to_integer_array().unwrap(), vec![7, 8, 9]);
}

#[test]
fn test_released_results_unpin() {
    let h = Harness::new();
    let before = h.runtime.collect_garbage().unwrap().script.live;
    let handles: Vec<_> = (0..10).map(|i| h.eval(&format!("[{}]", i)).unwrap()).collect();
    for handle in handles {
        handle.release().unwrap();
    }
    let after = h.runtime.collect_garbage().unwrap().script.live;
    assert_eq!(before, after);
}

#[test]
fn test_deeply_nested_result_converts_safely() {
    let h = Harness::new();
    let deep = h
        .eval("let deep = []; for (let i = 0; i < 10000; i++) { deep = [deep]; } deep")
        .unwrap();
    assert_eq!(deep.to_string().unwrap(), "");
    assert!(matches!(deep.to_json(), Err(BridgeError::TypeMismatch { .. })));

    let caught = h
        .eval("let name; try { JSON.stringify(deep); } catch (e) { name = e.name; } name")
        .unwrap();
    assert_eq!(caught.to_string().unwrap(), "RangeError");

    h.eval("$log(deep); 'logged'").unwrap();
    assert_eq!(h.logs().len(), 1);
}
