//! Dirty-node table
//!
//! An indexed table of nodes that became dirty during the current frame.
//! Producers (transform setters, re-parenting) append or write slots; a single
//! consumer pass per frame walks the slots, resolves each node and finally
//! empties the table. Owned by a [`SceneGraph`](crate::scene::SceneGraph),
//! never process-global.
//!
//! Slots may be vacated (`None`) when a queued node is destroyed before the
//! consumer reaches it; iteration skips vacant slots.
//!
//! Explicit slot writes are bounded by `max_slots`. Appends are not.

use crate::scene::NodeHandle;

/// Default bound on explicitly written slots.
pub const DEFAULT_MAX_DIRTY_SLOTS: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct DirtyQueue {
    slots: Vec<Option<NodeHandle>>,
    max_slots: usize,
}

impl Default for DirtyQueue {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl DirtyQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limits(capacity, DEFAULT_MAX_DIRTY_SLOTS)
    }

    #[must_use]
    pub fn with_limits(capacity: usize, max_slots: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(max_slots)),
            max_slots,
        }
    }

    /// Exclusive upper bound for [`set_dirty_node`](Self::set_dirty_node).
    #[inline]
    #[must_use]
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Number of slots, vacant ones included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends `node` and returns its slot.
    pub fn push(&mut self, node: NodeHandle) -> usize {
        self.slots.push(Some(node));
        self.slots.len() - 1
    }

    /// Writes `node` into `slot`, growing the table with vacant slots if
    /// needed. Returns `false` and leaves the table untouched when `slot` is
    /// not below [`max_slots`](Self::max_slots).
    pub fn set_dirty_node(&mut self, slot: usize, node: Option<NodeHandle>) -> bool {
        if slot >= self.max_slots {
            return false;
        }
        if slot >= self.slots.len() {
            if node.is_none() {
                return true;
            }
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = node;
        true
    }

    #[inline]
    #[must_use]
    pub fn get_dirty_node(&self, slot: usize) -> Option<NodeHandle> {
        self.slots.get(slot).copied().flatten()
    }

    /// Empties the table, keeping its allocation.
    pub fn clear_node_array(&mut self) {
        self.slots.clear();
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }
}
