//! Generation-checked arena
//!
//! Slots are reused after removal; each reuse bumps the slot's generation so
//! that an [`Index`] minted before the removal no longer resolves.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u32);

impl ArenaId {
    /// Allocate a fresh arena id
    pub fn next() -> Self {
        ArenaId(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slot index plus generation inside one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    /// Slot number (dense, reused)
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot when this index was minted
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

/// A reference that carries the identity of the arena it points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaRef {
    /// Owning arena
    pub arena: ArenaId,
    /// Slot and generation
    pub index: Index,
}

impl fmt::Display for ArenaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.arena, self.index)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32 },
}

/// Slot arena with generation checks.
pub struct Arena<T> {
    id: ArenaId,
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena with a fresh id
    pub fn new() -> Self {
        Self {
            id: ArenaId::next(),
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// This arena's identity
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no values are live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live or free)
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    /// Insert a value, reusing a free slot when one exists
    pub fn insert(&mut self, value: T) -> Index {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.entries[slot as usize];
            let generation = match entry {
                Entry::Free { generation } => generation.wrapping_add(1),
                Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            *entry = Entry::Occupied { generation, value };
            return Index { slot, generation };
        }
        let slot = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        Index {
            slot,
            generation: 0,
        }
    }

    /// Qualify a local index with this arena's id
    pub fn reference(&self, index: Index) -> ArenaRef {
        ArenaRef {
            arena: self.id,
            index,
        }
    }

    /// Resolve a foreign reference, checking arena identity first
    pub fn resolve(&self, reference: ArenaRef) -> Option<&T> {
        if reference.arena != self.id {
            return None;
        }
        self.get(reference.index)
    }

    /// Mutable variant of [`Arena::resolve`]
    pub fn resolve_mut(&mut self, reference: ArenaRef) -> Option<&mut T> {
        if reference.arena != self.id {
            return None;
        }
        self.get_mut(reference.index)
    }

    /// Look up a live value
    pub fn get(&self, index: Index) -> Option<&T> {
        match self.entries.get(index.slot as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == index.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Look up a live value mutably
    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.entries.get_mut(index.slot as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == index.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// True if `index` still names a live value
    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    /// Remove a value; stale indices return `None`
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == index.generation => {
                let generation = *generation;
                let old = std::mem::replace(entry, Entry::Free { generation });
                self.free.push(index.slot);
                self.len -= 1;
                match old {
                    Entry::Occupied { value, .. } => Some(value),
                    Entry::Free { .. } => None,
                }
            }
            _ => None,
        }
    }

    /// Keep only the values for which `keep` returns true.
    ///
    /// Removed values are returned so the caller decides where they drop.
    pub fn drain_filter(&mut self, mut keep: impl FnMut(Index, &mut T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        for (slot, entry) in self.entries.iter_mut().enumerate() {
            let (generation, retain) = match entry {
                Entry::Occupied { generation, value } => {
                    let index = Index {
                        slot: slot as u32,
                        generation: *generation,
                    };
                    (*generation, keep(index, value))
                }
                Entry::Free { .. } => continue,
            };
            if !retain {
                let old = std::mem::replace(entry, Entry::Free { generation });
                if let Entry::Occupied { value, .. } = old {
                    removed.push(value);
                }
                self.free.push(slot as u32);
                self.len -= 1;
            }
        }
        removed
    }

    /// Iterate live values with their indices
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Index {
                        slot: slot as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Free { .. } => None,
            })
    }

    /// Indices of all live values
    pub fn indices(&self) -> Vec<Index> {
        self.iter().map(|(index, _)| index).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("slots", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_index_after_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        assert_eq!(a.slot(), b.slot());
        assert_ne!(a.generation(), b.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn test_foreign_reference_rejected() {
        let mut left = Arena::new();
        let right: Arena<i32> = Arena::new();
        let index = left.insert(7);
        let reference = left.reference(index);
        assert_eq!(left.resolve(reference), Some(&7));
        assert_eq!(right.resolve(reference), None);
    }

    #[test]
    fn test_drain_filter() {
        let mut arena = Arena::new();
        let keep = arena.insert(10);
        let drop = arena.insert(11);
        let removed = arena.drain_filter(|_, v| *v % 2 == 0);
        assert_eq!(removed, vec![11]);
        assert!(arena.contains(keep));
        assert!(!arena.contains(drop));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.indices(), vec![keep]);
    }
}
