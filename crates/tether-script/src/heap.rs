//! Script heap
//!
//! Objects live in a generation-checked arena. Collection is mark-and-sweep
//! and only runs when the embedder asks for it (never in the middle of an
//! evaluation), so temporaries held on the native stack stay valid.
//!
//! Persistent handles pin a value across collections. A [`Persistent`] is a
//! move-only token: each token is one reference, [`Heap::retain`] mints an
//! additional token for the same slot and [`Heap::release`] consumes one.

use crate::error::{ScriptError, ScriptResult};
use crate::object::{HeapObject, NativeFn, NativeFunction, NativeObject};
use crate::value::{ObjectId, Value};
use indexmap::IndexMap;
use std::sync::Arc;
use tether_sdk::{Arena, ArenaRef};

struct PersistentSlot {
    value: Value,
    refs: usize,
}

/// One counted reference to a pinned value.
#[derive(Debug)]
#[must_use = "a persistent handle leaks its value unless released"]
pub struct Persistent {
    reference: ArenaRef,
}

impl Persistent {
    /// Identity of the pinned slot (shared by every token for that slot)
    pub fn id(&self) -> ArenaRef {
        self.reference
    }
}

/// Result of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub live: usize,
    pub freed: usize,
}

pub struct Heap {
    objects: Arena<HeapObject>,
    persistents: Arena<PersistentSlot>,
    allocated_since_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            persistents: Arena::new(),
            allocated_since_gc: 0,
        }
    }

    // ========================================================================
    // Allocation and access
    // ========================================================================

    pub fn alloc(&mut self, object: HeapObject) -> ObjectId {
        self.allocated_since_gc += 1;
        ObjectId(self.objects.insert(object))
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        Value::Object(self.alloc(HeapObject::Array(items)))
    }

    pub fn alloc_object(&mut self, properties: IndexMap<Arc<str>, Value>) -> Value {
        Value::Object(self.alloc(HeapObject::Object(properties)))
    }

    pub fn alloc_host(&mut self, object: Arc<dyn NativeObject>) -> Value {
        Value::Object(self.alloc(HeapObject::Host(object)))
    }

    pub fn alloc_native(&mut self, name: &str, func: NativeFn) -> Value {
        Value::Object(self.alloc(HeapObject::Native(NativeFunction {
            name: Arc::from(name),
            func,
        })))
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.0)
    }

    pub fn array(&self, id: ObjectId) -> Option<&Vec<Value>> {
        match self.get(id) {
            Some(HeapObject::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, id: ObjectId) -> Option<&mut Vec<Value>> {
        match self.get_mut(id) {
            Some(HeapObject::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub fn host(&self, id: ObjectId) -> Option<&Arc<dyn NativeObject>> {
        match self.get(id) {
            Some(HeapObject::Host(object)) => Some(object),
            _ => None,
        }
    }

    /// Host object behind a value, downcast to its concrete type
    pub fn host_as<T: NativeObject>(&self, value: &Value) -> Option<&T> {
        let id = value.as_object()?;
        self.host(id)?.as_any().downcast_ref::<T>()
    }

    /// True for closures, natives and callable host objects
    pub fn is_callable(&self, value: &Value) -> bool {
        match value.as_object().and_then(|id| self.get(id)) {
            Some(HeapObject::Closure(_)) | Some(HeapObject::Native(_)) => true,
            Some(HeapObject::Host(object)) => object.is_callable(),
            _ => false,
        }
    }

    /// True when a call on the value reaches a handler. Host objects always
    /// do and reject the call themselves when they are not callable.
    pub fn accepts_call(&self, value: &Value) -> bool {
        match value.as_object().and_then(|id| self.get(id)) {
            Some(HeapObject::Host(_)) => true,
            _ => self.is_callable(value),
        }
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    // ========================================================================
    // Persistent handles
    // ========================================================================

    /// Pin `value` and return the first reference to it
    pub fn persist(&mut self, value: Value) -> Persistent {
        let index = self.persistents.insert(PersistentSlot { value, refs: 1 });
        Persistent {
            reference: self.persistents.reference(index),
        }
    }

    /// Mint another reference to the same pinned value
    pub fn retain(&mut self, handle: &Persistent) -> ScriptResult<Persistent> {
        let slot = self
            .persistents
            .resolve_mut(handle.reference)
            .ok_or_else(|| stale(handle))?;
        slot.refs += 1;
        Ok(Persistent {
            reference: handle.reference,
        })
    }

    pub fn resolve(&self, handle: &Persistent) -> ScriptResult<&Value> {
        self.persistents
            .resolve(handle.reference)
            .map(|slot| &slot.value)
            .ok_or_else(|| stale(handle))
    }

    /// Drop one reference; returns true when it was the last one
    pub fn release(&mut self, handle: Persistent) -> bool {
        let Some(slot) = self.persistents.resolve_mut(handle.reference) else {
            return false;
        };
        slot.refs -= 1;
        if slot.refs == 0 {
            self.persistents.remove(handle.reference.index);
            true
        } else {
            false
        }
    }

    /// Reference count of a pinned slot (0 once released)
    pub fn persistent_refs(&self, handle: &Persistent) -> usize {
        self.persistents
            .resolve(handle.reference)
            .map_or(0, |slot| slot.refs)
    }

    /// Number of distinct pinned values
    pub fn persistent_count(&self) -> usize {
        self.persistents.len()
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Mark from `roots` plus every pinned value, then sweep.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjectId>) -> GcStats {
        let mut marked = vec![false; self.objects.slot_count()];
        let mut worklist: Vec<ObjectId> = roots.into_iter().collect();
        worklist.extend(
            self.persistents
                .iter()
                .filter_map(|(_, slot)| slot.value.as_object()),
        );

        while let Some(id) = worklist.pop() {
            let Some(object) = self.objects.get(id.0) else {
                continue;
            };
            let slot = id.0.slot();
            if marked[slot] {
                continue;
            }
            marked[slot] = true;
            object.trace(&mut worklist);
        }

        let freed = self.objects.drain_filter(|index, _| marked[index.slot()]);
        self.allocated_since_gc = 0;
        let stats = GcStats {
            live: self.objects.len(),
            freed: freed.len(),
        };
        drop(freed);
        stats
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn stale(handle: &Persistent) -> ScriptError {
    ScriptError::InvalidHandle(format!("persistent {} was released", handle.reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_frees_unreachable() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(vec![Value::from(1.0)]);
        let outer = heap.alloc_array(vec![inner.clone()]);
        let _garbage = heap.alloc_array(vec![]);
        let root = outer.as_object().unwrap();

        let stats = heap.collect([root]);
        assert_eq!(stats, GcStats { live: 2, freed: 1 });
        assert!(heap.get(inner.as_object().unwrap()).is_some());
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.alloc(HeapObject::Array(vec![]));
        let b = heap.alloc(HeapObject::Array(vec![Value::Object(a)]));
        heap.array_mut(a).unwrap().push(Value::Object(b));
        let stats = heap.collect([]);
        assert_eq!(stats.freed, 2);
        assert_eq!(heap.live_objects(), 0);
    }

    #[test]
    fn test_persistent_pins_value() {
        let mut heap = Heap::new();
        let value = heap.alloc_array(vec![]);
        let handle = heap.persist(value.clone());
        heap.collect([]);
        assert_eq!(heap.resolve(&handle).unwrap(), &value);

        assert!(heap.release(handle));
        heap.collect([]);
        assert_eq!(heap.live_objects(), 0);
    }

    #[test]
    fn test_persistent_refcount() {
        let mut heap = Heap::new();
        let first = heap.persist(Value::from(5.0));
        let second = heap.retain(&first).unwrap();
        assert_eq!(heap.persistent_refs(&first), 2);
        assert!(!heap.release(first));
        assert_eq!(heap.resolve(&second).unwrap(), &Value::from(5.0));
        assert!(heap.release(second));
        assert_eq!(heap.persistent_count(), 0);
    }

    #[test]
    fn test_stale_object_id() {
        let mut heap = Heap::new();
        let id = heap.alloc(HeapObject::Array(vec![]));
        heap.collect([]);
        let reused = heap.alloc(HeapObject::Array(vec![]));
        assert!(heap.get(id).is_none());
        assert!(heap.get(reused).is_some());
    }
}
