//! Invocation of bound members

use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::reflection::ReflectionBridge;
use crate::wrapper::WrapperObject;
use std::sync::Arc;
use tether_host::{HostClass, HostValue, MethodDescriptor};
use tether_script::{Interpreter, Value};

/// Strategy that carries out a call on a bound wrapper
pub trait Invoker: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &str;

    fn invoke(
        &self,
        wrapper: &WrapperObject,
        interp: &mut Interpreter<'_>,
        args: &[Value],
    ) -> BridgeResult<Value>;
}

/// Resolves the member against the class's public methods and calls it
/// through host reflection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReflectiveInvoker;

impl Invoker for ReflectiveInvoker {
    fn name(&self) -> &str {
        "reflective"
    }

    fn invoke(
        &self,
        wrapper: &WrapperObject,
        interp: &mut Interpreter<'_>,
        args: &[Value],
    ) -> BridgeResult<Value> {
        let member = wrapper
            .bound_name()
            .ok_or_else(|| BridgeError::NotCallable(wrapper.class().name().to_string()))?;
        let class = wrapper.class();
        let receiver = wrapper.receiver_identity();

        let candidates = class
            .public_methods()
            .filter(|m| &*m.name == member && m.arity() == args.len())
            .filter(|m| receiver.is_some() || m.is_static());
        let (method, host_args) =
            select(candidates, interp, args).ok_or_else(|| BridgeError::MethodNotFound {
                class: class.name().to_string(),
                method: member.to_string(),
                arity: args.len(),
            })??;

        let receiver = if method.is_static() { None } else { receiver };
        tracing::trace!(
            method = %method.name,
            signature = %method.signature(),
            "invoking host method"
        );
        let result = wrapper.bridge().host().invoke(method, receiver, &host_args)?;
        marshal::to_script(wrapper.bridge(), interp, result)
    }
}

/// First candidate whose parameters accept `args`.
///
/// `None` when there are no candidates; otherwise the first success, or the
/// first candidate's marshal error when none accepts.
fn select<'m>(
    candidates: impl Iterator<Item = &'m MethodDescriptor>,
    interp: &Interpreter<'_>,
    args: &[Value],
) -> Option<BridgeResult<(&'m MethodDescriptor, Vec<HostValue>)>> {
    let mut first_error = None;
    for method in candidates {
        match marshal::to_host_args(interp.heap(), args, &method.params) {
            Ok(host_args) => return Some(Ok((method, host_args))),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    first_error.map(Err)
}

/// Answers every call with a fixed string and never touches the host.
#[derive(Debug, Clone)]
pub struct EchoInvoker {
    sentinel: Arc<str>,
}

impl EchoInvoker {
    pub fn new(sentinel: &str) -> Self {
        Self {
            sentinel: Arc::from(sentinel),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }
}

impl Invoker for EchoInvoker {
    fn name(&self) -> &str {
        "echo"
    }

    fn invoke(
        &self,
        _wrapper: &WrapperObject,
        _interp: &mut Interpreter<'_>,
        _args: &[Value],
    ) -> BridgeResult<Value> {
        Ok(Value::String(self.sentinel.clone()))
    }
}

/// `new Class(...args)`: pick a constructor by arity and argument types,
/// construct, and wrap the instance with the construction strategy
pub fn construct(
    bridge: &Arc<ReflectionBridge>,
    interp: &mut Interpreter<'_>,
    class: &Arc<HostClass>,
    args: &[Value],
) -> BridgeResult<Value> {
    let mut first_error = None;
    let mut accepted = None;
    for constructor in class.constructors().iter().filter(|c| c.arity() == args.len()) {
        match marshal::to_host_args(interp.heap(), args, &constructor.params) {
            Ok(host_args) => {
                accepted = Some(host_args);
                break;
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    let host_args = match (accepted, first_error) {
        (Some(host_args), _) => host_args,
        (None, Some(err)) => return Err(err),
        (None, None) => {
            return Err(BridgeError::MethodNotFound {
                class: class.name().to_string(),
                method: "<init>".to_string(),
                arity: args.len(),
            })
        }
    };
    let identity = bridge.host().new_instance(class, &host_args)?;
    let wrapper = bridge.wrap_object(identity, bridge.construction_strategy())?;
    Ok(interp.heap_mut().alloc_host(Arc::new(wrapper)))
}
