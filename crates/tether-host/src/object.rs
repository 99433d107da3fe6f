//! Host object instances

use crate::class::HostClass;
use crate::error::HostException;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An instance of a host class. State is the Rust value its constructor
/// produced; methods reach it through [`HostObject::with_state`].
pub struct HostObject {
    class: Arc<HostClass>,
    state: Mutex<Box<dyn Any + Send>>,
}

impl HostObject {
    pub fn new<T: Any + Send>(class: Arc<HostClass>, state: T) -> Self {
        Self::from_boxed(class, Box::new(state))
    }

    pub(crate) fn from_boxed(class: Arc<HostClass>, state: Box<dyn Any + Send>) -> Self {
        Self {
            class,
            state: Mutex::new(state),
        }
    }

    pub fn class(&self) -> &Arc<HostClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Run `f` on the object's state. Fails with `ClassCastException` if the
    /// state is not a `T`.
    pub fn with_state<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, HostException> {
        let mut state = self.state.lock();
        match state.downcast_mut::<T>() {
            Some(state) => Ok(f(state)),
            None => Err(HostException::class_cast(format!(
                "{} state is not a {}",
                self.class.name(),
                std::any::type_name::<T>()
            ))),
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("class", &self.class.name())
            .finish()
    }
}
