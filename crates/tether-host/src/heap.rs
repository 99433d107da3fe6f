//! Host heap
//!
//! Objects are reference counted. The heap holds one strong reference per
//! object; anything else that wants to keep an object alive (the bridge's
//! handle table, for instance) clones the `Arc`. Collection drops the
//! objects for which the heap's reference is the only one left.

use crate::object::HostObject;
use std::fmt;
use std::sync::Arc;
use tether_sdk::{Arena, ArenaRef};

/// Generation-checked identity of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(ArenaRef);

impl ObjectRef {
    pub fn raw(self) -> ArenaRef {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct HostHeap {
    objects: Arena<Arc<HostObject>>,
}

impl HostHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: HostObject) -> ObjectRef {
        let index = self.objects.insert(Arc::new(object));
        ObjectRef(self.objects.reference(index))
    }

    /// Strong reference to a live object
    pub fn get(&self, reference: ObjectRef) -> Option<Arc<HostObject>> {
        self.objects.resolve(reference.0).cloned()
    }

    pub fn contains(&self, reference: ObjectRef) -> bool {
        self.objects.resolve(reference.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Free every object nothing outside the heap refers to.
    ///
    /// Returns the freed objects; the caller drops them outside its lock.
    pub fn collect(&mut self) -> Vec<Arc<HostObject>> {
        self.objects
            .drain_filter(|_, object| Arc::strong_count(object) > 1)
    }
}
