use crate::scene::NodeHandle;
use crate::scene::transform::{Transform, TransformBit};
use glam::Affine3A;

/// A scene node: hierarchy links, transform and invalidation state.
///
/// # Hierarchy
///
/// Nodes live in the [`SceneGraph`](crate::scene::SceneGraph) arena and refer
/// to each other by [`NodeHandle`]:
/// - `parent`: handle of the parent (None for root nodes), a plain lookup key
///   with no lifetime implication
/// - `children`: ordered child handles; a node's position in this list is its
///   `sibling_index`
///
/// # Invalidation
///
/// - `dirty_flags`: aspects of the cached world state that are stale
/// - `changed_flags`: aspects that changed since the last frame boundary, for
///   external observers
/// - `dirty_slot`: slot in the graph's dirty table, if queued
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,

    // === Core Hierarchy ===
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) sibling_index: usize,

    // === Core Spatial Data ===
    pub(crate) transform: Transform,

    // === Invalidation ===
    pub(crate) dirty_flags: TransformBit,
    pub(crate) changed_flags: TransformBit,
    pub(crate) dirty_slot: Option<usize>,
    pub(crate) world_version: u64,

    // === Core State ===
    pub(crate) pending_destroy: bool,
}

impl Node {
    /// Creates an unnamed node. A fresh node is fully dirty.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name("")
    }

    #[must_use]
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            sibling_index: 0,
            transform: Transform::new(),
            dirty_flags: TransformBit::TRS,
            changed_flags: TransformBit::TRS,
            dirty_slot: None,
            world_version: 0,
            pending_destroy: false,
        }
    }

    /// Returns the parent node handle, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Returns a read-only slice of child node handles, in sibling order.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn sibling_index(&self) -> usize {
        self.sibling_index
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    #[must_use]
    pub fn dirty_flags(&self) -> TransformBit {
        self.dirty_flags
    }

    #[inline]
    #[must_use]
    pub fn changed_flags(&self) -> TransformBit {
        self.changed_flags
    }

    /// Bumped every time the world cache is recomputed.
    #[inline]
    #[must_use]
    pub fn world_version(&self) -> u64 {
        self.world_version
    }

    #[inline]
    #[must_use]
    pub fn is_pending_destroy(&self) -> bool {
        self.pending_destroy
    }

    /// Cached world matrix. Only valid while the node carries no dirty bit;
    /// use [`SceneGraph::world_matrix`](crate::scene::SceneGraph::world_matrix)
    /// to resolve first.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
