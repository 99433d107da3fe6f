//! Host classes and their reflective descriptors

use crate::env::HostEnvironment;
use crate::error::HostException;
use crate::object::HostObject;
use crate::types::{method_signature, HostType};
use crate::value::HostValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Method implementation: `(environment, receiver, arguments)`.
///
/// The receiver is `None` for static methods. Arguments have already been
/// checked against the declared parameter types.
pub type MethodBody = Arc<
    dyn Fn(&HostEnvironment, Option<&HostObject>, &[HostValue]) -> Result<HostValue, HostException>
        + Send
        + Sync,
>;

/// Constructor implementation producing the new object's state
pub type ConstructorBody = Arc<
    dyn Fn(&HostEnvironment, &[HostValue]) -> Result<Box<dyn Any + Send>, HostException>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Static,
    Instance,
}

/// Reflective view of one method.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: Arc<str>,
    pub params: Vec<HostType>,
    pub ret: HostType,
    pub kind: MethodKind,
    pub public: bool,
    /// Class that declares the method
    pub declaring_class: Arc<str>,
    body: MethodBody,
}

impl MethodDescriptor {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_static(&self) -> bool {
        self.kind == MethodKind::Static
    }

    /// JNI-style signature, e.g. `(II)V`
    pub fn signature(&self) -> String {
        method_signature(&self.params, &self.ret)
    }

    pub(crate) fn body(&self) -> &MethodBody {
        &self.body
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}.{}{}",
            if self.is_static() { "static " } else { "" },
            self.declaring_class,
            self.name,
            self.signature()
        )
    }
}

#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub params: Vec<HostType>,
    body: ConstructorBody,
}

impl ConstructorDescriptor {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn signature(&self) -> String {
        method_signature(&self.params, &HostType::Void)
    }

    pub(crate) fn body(&self) -> &ConstructorBody {
        &self.body
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<init>{}", self.signature())
    }
}

/// A registered host class.
pub struct HostClass {
    name: Arc<str>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl HostClass {
    /// Dotted class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short name after the last dot
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// `Lcom/example/Widget;`
    pub fn descriptor(&self) -> String {
        HostType::Object(self.name.clone()).descriptor()
    }

    /// Every declared method, in declaration order
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn public_methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter().filter(|m| m.public)
    }

    /// Public overloads named `name`
    pub fn methods_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a MethodDescriptor> {
        self.public_methods().filter(move |m| &*m.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods_named(name).next().is_some()
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("constructors", &self.constructors)
            .finish()
    }
}

/// Fluent builder for [`HostClass`].
pub struct ClassBuilder {
    name: Arc<str>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(crate::types::normalize_class_name(name).as_str()),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Constructor whose state type is `T`
    pub fn constructor<T, F>(mut self, params: Vec<HostType>, f: F) -> Self
    where
        T: Any + Send,
        F: Fn(&HostEnvironment, &[HostValue]) -> Result<T, HostException> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorDescriptor {
            params,
            body: Arc::new(move |env, args| {
                f(env, args).map(|state| Box::new(state) as Box<dyn Any + Send>)
            }),
        });
        self
    }

    /// Instance method operating on state `T`
    pub fn instance_method<T, F>(
        mut self,
        name: &str,
        params: Vec<HostType>,
        ret: HostType,
        f: F,
    ) -> Self
    where
        T: Any,
        F: Fn(&HostEnvironment, &mut T, &[HostValue]) -> Result<HostValue, HostException>
            + Send
            + Sync
            + 'static,
    {
        let class = self.name.clone();
        let body: MethodBody = Arc::new(move |env, receiver, args| {
            let receiver = receiver.ok_or_else(|| {
                HostException::new(
                    "java.lang.NullPointerException",
                    format!("instance method of {} called without a receiver", class),
                )
            })?;
            receiver.with_state::<T, _>(|state| f(env, state, args))?
        });
        self.push_method(name, params, ret, MethodKind::Instance, body);
        self
    }

    pub fn static_method<F>(
        mut self,
        name: &str,
        params: Vec<HostType>,
        ret: HostType,
        f: F,
    ) -> Self
    where
        F: Fn(&HostEnvironment, &[HostValue]) -> Result<HostValue, HostException>
            + Send
            + Sync
            + 'static,
    {
        let body: MethodBody = Arc::new(move |env, _, args| f(env, args));
        self.push_method(name, params, ret, MethodKind::Static, body);
        self
    }

    /// Hide every method named `name` from reflection
    pub fn private(mut self, name: &str) -> Self {
        for method in self.methods.iter_mut().filter(|m| &*m.name == name) {
            method.public = false;
        }
        self
    }

    fn push_method(
        &mut self,
        name: &str,
        params: Vec<HostType>,
        ret: HostType,
        kind: MethodKind,
        body: MethodBody,
    ) {
        self.methods.push(MethodDescriptor {
            name: Arc::from(name),
            params,
            ret,
            kind,
            public: true,
            declaring_class: self.name.clone(),
            body,
        });
    }

    pub fn build(self) -> HostClass {
        HostClass {
            name: self.name,
            methods: self.methods,
            constructors: self.constructors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HostClass {
        ClassBuilder::new("demo/Thing")
            .constructor(vec![], |_, _| Ok(0i32))
            .instance_method::<i32, _>("get", vec![], HostType::Int, |_, n, _| {
                Ok(HostValue::Int(*n))
            })
            .instance_method::<i32, _>("set", vec![HostType::Int], HostType::Void, |_, n, args| {
                *n = args[0].as_int().unwrap_or_default();
                Ok(HostValue::Void)
            })
            .instance_method::<i32, _>("set", vec![HostType::Long], HostType::Void, |_, _, _| {
                Ok(HostValue::Void)
            })
            .static_method("helper", vec![], HostType::Void, |_, _| Ok(HostValue::Void))
            .private("helper")
            .build()
    }

    #[test]
    fn test_builder_normalizes_name() {
        let class = sample();
        assert_eq!(class.name(), "demo.Thing");
        assert_eq!(class.simple_name(), "Thing");
        assert_eq!(class.descriptor(), "Ldemo/Thing;");
    }

    #[test]
    fn test_private_methods_hidden() {
        let class = sample();
        assert_eq!(class.methods().len(), 4);
        assert_eq!(class.public_methods().count(), 3);
        assert!(!class.has_method("helper"));
        assert_eq!(class.methods_named("set").count(), 2);
    }

    #[test]
    fn test_method_signature() {
        let class = sample();
        let set = class.methods_named("set").next().unwrap();
        assert_eq!(set.signature(), "(I)V");
        assert_eq!(format!("{:?}", set), "demo.Thing.set(I)V");
    }
}
