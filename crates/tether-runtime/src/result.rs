//! Host-side handles to script values and wrappers

use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::runtime::IsolateRuntime;
use crate::wrapper::WrapperObject;
use std::fmt;
use std::sync::Arc;
use tether_host::HostValue;
use tether_script::{json, to_int32, ContextId, Persistent, Value};

/// A script value pinned for the host.
///
/// Released exactly once: explicitly through [`ResultHandle::release`], or
/// on drop through the runtime's deferred-release queue.
pub struct ResultHandle {
    runtime: Arc<IsolateRuntime>,
    context: ContextId,
    value: Option<Persistent>,
}

impl ResultHandle {
    pub(crate) fn new(runtime: Arc<IsolateRuntime>, context: ContextId, value: Persistent) -> Self {
        Self {
            runtime,
            context,
            value: Some(value),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub(crate) fn persistent(&self) -> BridgeResult<&Persistent> {
        self.value
            .as_ref()
            .ok_or_else(|| BridgeError::InvalidHandle("result was released".to_string()))
    }

    fn project<R>(
        &self,
        f: impl FnOnce(&tether_script::Interpreter<'_>, &Value) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let handle = self.persistent()?;
        self.runtime.enter(Some(self.context), |scope| {
            let value = scope.resolve(handle)?;
            scope.with_interpreter(|interp| f(interp, &value))
        })
    }

    /// Numbers only, truncated to 32 bits
    pub fn to_integer(&self) -> BridgeResult<i32> {
        self.project(|interp, value| match value {
            Value::Number(n) => Ok(to_int32(*n)),
            other => Err(BridgeError::type_mismatch("number", interp.type_of(other))),
        })
    }

    /// Arrays whose every element is a number
    pub fn to_integer_array(&self) -> BridgeResult<Vec<i32>> {
        self.project(|interp, value| {
            let items = value
                .as_object()
                .and_then(|id| interp.heap().array(id))
                .ok_or_else(|| {
                    let found = marshal::describe(interp.heap(), value);
                    BridgeError::type_mismatch("array of numbers", found)
                })?;
            items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Number(n) => Ok(to_int32(*n)),
                    other => Err(BridgeError::type_mismatch(
                        "array of numbers",
                        format!("{} at index {}", marshal::describe(interp.heap(), other), index),
                    )),
                })
                .collect()
        })
    }

    /// String conversion of any value
    pub fn to_string(&self) -> BridgeResult<String> {
        self.project(|interp, value| Ok(interp.to_string(value)))
    }

    pub fn to_double(&self) -> BridgeResult<f64> {
        self.project(|interp, value| match value {
            Value::Number(n) => Ok(*n),
            other => Err(BridgeError::type_mismatch("number", interp.type_of(other))),
        })
    }

    pub fn to_bool(&self) -> BridgeResult<bool> {
        self.project(|interp, value| match value {
            Value::Bool(b) => Ok(*b),
            other => Err(BridgeError::type_mismatch("boolean", interp.type_of(other))),
        })
    }

    /// JSON form of the value; `undefined` and functions become `null`.
    /// Cyclic or overly deep structures give `TypeMismatch`.
    pub fn to_json(&self) -> BridgeResult<serde_json::Value> {
        self.project(|interp, value| {
            let converted = json::to_json(interp.heap(), value).map_err(|err| {
                BridgeError::type_mismatch("JSON-compatible value", err.message())
            })?;
            Ok(converted.unwrap_or(serde_json::Value::Null))
        })
    }

    /// `typeof` of the value
    pub fn type_of(&self) -> BridgeResult<&'static str> {
        self.project(|interp, value| Ok(interp.type_of(value)))
    }

    /// Host wrapper behind the value, if it is one
    pub fn to_wrapper(&self) -> BridgeResult<Option<WrapperHandle>> {
        let wrapper = self.project(|interp, value| {
            Ok(interp.heap().host_as::<WrapperObject>(value).map(WrapperObject::duplicate))
        })?;
        Ok(wrapper.map(|w| WrapperHandle::new(self.runtime.clone(), Arc::new(w))))
    }

    /// Second handle to the same value
    pub fn try_clone(&self) -> BridgeResult<ResultHandle> {
        let handle = self.persistent()?;
        let copy = self
            .runtime
            .enter(Some(self.context), |scope| Ok(scope.heap_mut().retain(handle)?))?;
        Ok(ResultHandle::new(self.runtime.clone(), self.context, copy))
    }

    /// Release now instead of at the next lock acquisition
    pub fn release(mut self) -> BridgeResult<()> {
        let Some(handle) = self.value.take() else {
            return Ok(());
        };
        match self.runtime.enter(None, move |scope| {
            scope.release(handle);
            Ok(())
        }) {
            Err(BridgeError::ShutDown) => Ok(()),
            other => other,
        }
    }
}

impl Drop for ResultHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.value.take() {
            self.runtime.defer_release(handle);
        }
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("context", &self.context)
            .field("released", &self.value.is_none())
            .finish()
    }
}

/// A host wrapper held by host code.
#[derive(Clone)]
pub struct WrapperHandle {
    runtime: Arc<IsolateRuntime>,
    wrapper: Arc<WrapperObject>,
}

impl WrapperHandle {
    pub(crate) fn new(runtime: Arc<IsolateRuntime>, wrapper: Arc<WrapperObject>) -> Self {
        Self { runtime, wrapper }
    }

    pub fn object(&self) -> &Arc<WrapperObject> {
        &self.wrapper
    }

    /// Bind `member`; succeeds whether or not the member exists
    pub fn get(&self, member: &str) -> WrapperHandle {
        let bound = self.runtime.bridge().bind(&self.wrapper, member);
        WrapperHandle::new(self.runtime.clone(), Arc::new(bound))
    }

    /// Call the bound member in the default context
    pub fn invoke(&self, args: &[HostValue]) -> BridgeResult<ResultHandle> {
        let bridge = self.runtime.bridge().clone();
        let wrapper = self.wrapper.clone();
        let (context, value) = self.runtime.enter(None, |scope| {
            let result = scope.with_interpreter(|interp| {
                let args = args
                    .iter()
                    .cloned()
                    .map(|arg| marshal::to_script(&bridge, interp, arg))
                    .collect::<BridgeResult<Vec<_>>>()?;
                wrapper.invoke(interp, &args)
            })?;
            Ok((scope.context(), scope.persist(result)))
        })?;
        Ok(ResultHandle::new(self.runtime.clone(), context, value))
    }

    /// Names in the eager method table; `None` for lazy and bound wrappers
    pub fn method_names(&self) -> Option<Vec<String>> {
        self.wrapper
            .method_table()
            .map(|table| table.keys().map(|name| name.to_string()).collect())
    }

    pub fn class_name(&self) -> &str {
        self.wrapper.class().name()
    }

    pub fn bound_name(&self) -> Option<&str> {
        self.wrapper.bound_name()
    }

    pub fn is_callable(&self) -> bool {
        self.wrapper.is_bound()
    }
}

impl fmt::Debug for WrapperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrapperHandle").field(&self.wrapper).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use tether_host::sample::register_sample_classes;
    use tether_host::HostEnvironment;

    fn eval(source: &str) -> ResultHandle {
        let host = Arc::new(HostEnvironment::default());
        register_sample_classes(&host);
        let runtime = IsolateRuntime::new(host, BridgeConfig::default());
        let ctx = runtime.default_context().unwrap();
        runtime.evaluate(ctx, source).unwrap()
    }

    #[test]
    fn test_to_integer() {
        assert_eq!(eval("6 * 7").to_integer().unwrap(), 42);
        assert_eq!(eval("2.9").to_integer().unwrap(), 2);
        assert_eq!(
            eval("'42'").to_integer().unwrap_err(),
            BridgeError::TypeMismatch {
                expected: "number".to_string(),
                found: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_to_integer_array() {
        assert_eq!(eval("[1, 2, 3]").to_integer_array().unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            eval("42").to_integer_array(),
            Err(BridgeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            eval("[1, 'two']").to_integer_array(),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_to_string_coerces() {
        assert_eq!(eval("'a' + 'b'").to_string().unwrap(), "ab");
        assert_eq!(eval("12.5").to_string().unwrap(), "12.5");
        assert_eq!(eval("[1, 2]").to_string().unwrap(), "1,2");
        assert_eq!(eval("undefined").to_string().unwrap(), "undefined");
    }

    #[test]
    fn test_strict_double_and_bool() {
        assert_eq!(eval("0.5").to_double().unwrap(), 0.5);
        assert!(eval("1 < 2").to_bool().unwrap());
        assert!(eval("1").to_bool().is_err());
        assert!(eval("true").to_double().is_err());
    }

    #[test]
    fn test_to_json() {
        let json = eval("({ a: 1, b: [true, null], c: 'x' })").to_json().unwrap();
        assert_eq!(json, serde_json::json!({ "a": 1, "b": [true, null], "c": "x" }));
        assert_eq!(eval("undefined").to_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_to_json_rejects_cycles_and_deep_nesting() {
        let cyclic = eval("(function () { const o = {}; o.self = o; return o; })()");
        assert_eq!(cyclic.to_json().unwrap_err().kind(), "TypeMismatchError");

        let deep = eval(
            "(function () { let a = []; \
             for (let i = 0; i < 10000; i++) { a = [a]; } return a; })()",
        );
        assert_eq!(deep.to_json().unwrap_err().kind(), "TypeMismatchError");
        assert_eq!(deep.to_string().unwrap(), "");
    }

    #[test]
    fn test_type_of() {
        assert_eq!(eval("() => 1").type_of().unwrap(), "function");
        assert_eq!(eval("null").type_of().unwrap(), "object");
    }

    #[test]
    fn test_try_clone_and_release() {
        let handle = eval("[9]");
        let copy = handle.try_clone().unwrap();
        handle.release().unwrap();
        assert_eq!(copy.to_integer_array().unwrap(), vec![9]);
    }

    #[test]
    fn test_to_wrapper() {
        let handle = eval("createInstance('com.example.Widget', 'named')");
        let wrapper = handle.to_wrapper().unwrap().unwrap();
        assert_eq!(wrapper.class_name(), "com.example.Widget");
        let name = wrapper.get("getName").invoke(&[]).unwrap();
        assert_eq!(name.to_string().unwrap(), "named");
        assert!(eval("1").to_wrapper().unwrap().is_none());
    }
}
