//! Tether SDK - shared handle types
//!
//! Every heap on either side of the bridge (the script heap, the persistent
//! handle table, the context table and the host object heap) is a
//! generation-checked [`Arena`]. A reference that escapes its heap is an
//! [`ArenaRef`]: the owning arena's id plus a slot index and generation, so a
//! stale or foreign reference is detected instead of silently aliasing a
//! reused slot.

#![warn(missing_docs)]

pub mod arena;

pub use arena::{Arena, ArenaId, ArenaRef, Index};
