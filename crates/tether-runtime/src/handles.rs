//! Strong references from script wrappers into the host heap
//!
//! The host heap frees any object nobody outside it holds. The table keeps one
//! `Arc<HostObject>` per retained identity, counted by the number of live
//! [`StrongRef`] tokens, so an object stays alive while any wrapper exists.

use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tether_host::{HostEnvironment, HostObject, ObjectRef};

struct Entry {
    object: Arc<HostObject>,
    count: usize,
}

/// One retain on a host object. Not `Clone`: each token is released once.
#[must_use = "a strong reference keeps its host object alive until released"]
pub struct StrongRef {
    identity: ObjectRef,
    object: Arc<HostObject>,
}

impl StrongRef {
    pub fn identity(&self) -> ObjectRef {
        self.identity
    }

    pub fn object(&self) -> &Arc<HostObject> {
        &self.object
    }
}

impl fmt::Debug for StrongRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongRef")
            .field("identity", &self.identity)
            .field("class", &self.object.class_name())
            .finish()
    }
}

pub struct HandleTable {
    host: Arc<HostEnvironment>,
    entries: Mutex<FxHashMap<ObjectRef, Entry>>,
}

impl HandleTable {
    pub fn new(host: Arc<HostEnvironment>) -> Self {
        Self {
            host,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Retain `identity`, creating the entry on first use
    pub fn retain(&self, identity: ObjectRef) -> BridgeResult<StrongRef> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&identity) {
            entry.count += 1;
            return Ok(StrongRef {
                identity,
                object: entry.object.clone(),
            });
        }
        let object = self
            .host
            .object(identity)
            .map_err(|_| BridgeError::Reflection(format!("stale host object {}", identity)))?;
        entries.insert(
            identity,
            Entry {
                object: object.clone(),
                count: 1,
            },
        );
        Ok(StrongRef { identity, object })
    }

    /// Another token for an identity the caller already holds
    pub fn retain_again(&self, held: &StrongRef) -> StrongRef {
        let mut entries = self.entries.lock();
        let entry = entries.entry(held.identity).or_insert_with(|| Entry {
            object: held.object.clone(),
            count: 0,
        });
        entry.count += 1;
        StrongRef {
            identity: held.identity,
            object: entry.object.clone(),
        }
    }

    /// Consume a token; the entry goes away with its last token
    pub fn release(&self, strong: StrongRef) {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&strong.identity) {
                Some(entry) if entry.count > 1 => {
                    entry.count -= 1;
                    None
                }
                Some(_) => entries.remove(&strong.identity),
                None => None,
            }
        };
        if removed.is_some() {
            tracing::trace!(object = %strong.identity, "host object released");
        }
        // Host references are dropped outside the table lock
        drop(removed);
        drop(strong);
    }

    /// Live tokens for `identity`
    pub fn count(&self, identity: ObjectRef) -> usize {
        self.entries.lock().get(&identity).map_or(0, |e| e.count)
    }

    /// Distinct retained identities
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable").field("len", &self.len()).finish()
    }
}
