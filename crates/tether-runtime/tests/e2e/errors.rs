//! Error kinds on both sides of the bridge

use super::harness::*;
use tether_runtime::BridgeError;

// ============================================================================
// Surfacing to the host
// ============================================================================

#[test]
fn test_compile_error_position() {
    let err = expect_error_kind("let x = 1;\nlet = 2;", "CompileError");
    match err {
        BridgeError::Compile { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_script_runtime_error() {
    expect_error_kind("undefinedFunction()", "ScriptRuntimeError");
    expect_runtime_error("null.x", "TypeError");
    expect_runtime_error("throw new Error('custom failure')", "custom failure");
}

#[test]
fn test_class_not_found_from_script() {
    expect_error_kind("Class.forName('com.example.Ghost')", "ClassNotFoundError");
}

#[test]
fn test_method_not_found_from_script() {
    let err = expect_error_kind(
        "createInstance('com.example.Widget').nothingHere(1, 2)",
        "MethodNotFoundError",
    );
    assert_eq!(
        err,
        BridgeError::MethodNotFound {
            class: "com.example.Widget".to_string(),
            method: "nothingHere".to_string(),
            arity: 2,
        }
    );
}

#[test]
fn test_marshal_error_from_script() {
    expect_error_kind(
        "createInstance('com.example.Widget').resize(1.5)",
        "MarshalError",
    );
    expect_error_kind(
        "Class.forName('com.example.MathUtil').add(2147483648, 1)",
        "MarshalError",
    );
    expect_error_kind(
        "Class.forName('com.example.MathUtil').sum([[1], [2]])",
        "MarshalError",
    );
}

#[test]
fn test_host_exception_from_script() {
    let err = expect_error_kind(
        "Class.forName('com.example.MathUtil').fail('bad input')",
        "HostInvocationError",
    );
    assert_eq!(
        err,
        BridgeError::HostInvocation {
            exception: "java.lang.IllegalStateException".to_string(),
            message: "bad input".to_string(),
        }
    );
    expect_error_kind(
        "createInstance('com.example.Widget').resize(-1)",
        "HostInvocationError",
    );
}

#[test]
fn test_private_method_not_reflected() {
    expect_error_kind(
        "createInstance('com.example.Widget').checkInvariants()",
        "MethodNotFoundError",
    );
}

#[test]
fn test_instance_method_on_class_wrapper() {
    expect_error_kind(
        "Class.forName('com.example.Widget').getName()",
        "MethodNotFoundError",
    );
}

#[test]
fn test_calling_unbound_wrapper_is_not_callable() {
    expect_error_kind("createInstance('com.example.Widget')()", "NotCallableError");
    expect_error_kind("Class.forName('com.example.MathUtil')(1)", "NotCallableError");
}

#[test]
fn test_unbound_wrapper_call_caught_in_script() {
    expect_string(
        "let name; \
         try { createInstance('com.example.Widget')(); } catch (e) { name = e.name; } \
         name",
        "NotCallableError",
    );
}

#[test]
fn test_construct_arity_mismatch() {
    expect_error_kind(
        "const Counter = Class.forName('com.example.Counter'); new Counter()",
        "MethodNotFoundError",
    );
}

// ============================================================================
// Catching inside scripts
// ============================================================================

#[test]
fn test_bridge_errors_are_catchable() {
    expect_string(
        "let kind; \
         try { createInstance('com.example.Widget').nope(); } catch (e) { kind = e.name; } \
         kind",
        "MethodNotFoundError",
    );
    expect_string(
        "let kind; \
         try { Class.forName('no.such.Thing'); } catch (e) { kind = e.name; } \
         kind",
        "ClassNotFoundError",
    );
}

#[test]
fn test_caught_host_exception_message() {
    expect_string(
        "let message; \
         try { Class.forName('com.example.MathUtil').fail('oops'); } \
         catch (e) { message = e.message; } \
         message",
        "java.lang.IllegalStateException: oops",
    );
}

#[test]
fn test_execution_continues_after_catch() {
    expect_i32(
        "let w = createInstance('com.example.Widget'); \
         try { w.resize('wide'); } catch (e) {} \
         w.resize(6); w.getSize()",
        6,
    );
}
