//! Scene graph
//!
//! [`SceneGraph`] owns every [`Node`] in a generational arena and is the only
//! place where transforms and hierarchy links are mutated, so dirty
//! propagation can never be bypassed.
//!
//! # Frame protocol
//!
//! 1. Producers mutate nodes (`set_position`, `set_parent`, ...). Each mutated
//!    node and every descendant receives dirty and changed bits and is queued
//!    in the graph's [`DirtyQueue`] (once).
//! 2. One consumer pass per frame calls [`SceneGraph::resolve_dirty_nodes`].
//! 3. After observers have read the changed flags, [`SceneGraph::end_frame`]
//!    clears them and empties the queue.
//!
//! World-space getters resolve lazily, so reading a world matrix between
//! steps 1 and 2 is always correct; the queue only exists so that step 2 does
//! not need a full tree walk.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Affine3A, Quat, Vec3};
use slotmap::SlotMap;

use crate::errors::{Result, StrataError};
use crate::scene::dirty_queue::DirtyQueue;
use crate::scene::node::Node;
use crate::scene::transform::{Transform, TransformBit};
use crate::scene::{NodeHandle, transform_system};
use crate::settings::SceneSettings;

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Visit record of the explicit-stack traversal in [`SceneGraph::walk_with_post`].
enum Visit {
    Enter(NodeHandle),
    Exit(NodeHandle),
}

pub struct SceneGraph {
    id: u32,
    nodes: SlotMap<NodeHandle, Node>,
    /// Children of the implicit root, in sibling order
    roots: Vec<NodeHandle>,
    dirty_queue: DirtyQueue,
    pending_destroy: Vec<NodeHandle>,
    settings: SceneSettings,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(&SceneSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: &SceneSettings) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: SlotMap::with_capacity_and_key(settings.node_capacity),
            roots: Vec::new(),
            dirty_queue: DirtyQueue::with_limits(
                settings.dirty_queue_capacity,
                settings.max_dirty_slots,
            ),
            pending_destroy: Vec::new(),
            settings: settings.clone(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(node)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, node: NodeHandle) -> Option<&Node> {
        self.nodes.get(node)
    }

    /// Root nodes in sibling order.
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[must_use]
    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        self.nodes.get(node).map_or(&[], |n| n.children.as_slice())
    }

    #[must_use]
    pub fn transform(&self, node: NodeHandle) -> Option<&Transform> {
        self.nodes.get(node).map(|n| &n.transform)
    }

    pub fn set_name(&mut self, node: NodeHandle, name: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.name = name.to_string();
        }
    }

    #[must_use]
    pub fn dirty_queue(&self) -> &DirtyQueue {
        &self.dirty_queue
    }

    #[must_use]
    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a root node. The new node is fully dirty.
    pub fn create_node(&mut self, name: &str) -> NodeHandle {
        let handle = self.nodes.insert(Node::with_name(name));
        self.link(handle, None);
        self.enqueue(handle);
        handle
    }

    /// Creates a node as the last child of `parent`.
    ///
    /// Falls back to a root node if `parent` does not exist.
    pub fn create_child(&mut self, parent: NodeHandle, name: &str) -> NodeHandle {
        if !self.nodes.contains_key(parent) {
            log::error!("Parent node not found, creating `{name}` as a root node");
            return self.create_node(name);
        }
        let handle = self.nodes.insert(Node::with_name(name));
        self.link(handle, Some(parent));
        self.enqueue(handle);
        handle
    }

    // ========================================================================
    // Local transform
    // ========================================================================

    pub fn set_position(&mut self, node: NodeHandle, position: Vec3) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.transform.set_position(position);
        self.invalidate(node, TransformBit::POSITION);
    }

    pub fn set_rotation(&mut self, node: NodeHandle, rotation: Quat) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.transform.set_rotation(rotation);
        self.invalidate(node, TransformBit::ROTATION);
    }

    /// Sets the local rotation from XYZ Euler angles in radians.
    pub fn set_rotation_from_euler(&mut self, node: NodeHandle, euler: Vec3) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.transform.set_rotation_from_euler(euler);
        self.invalidate(node, TransformBit::ROTATION);
    }

    pub fn set_scale(&mut self, node: NodeHandle, scale: Vec3) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.transform.set_scale(scale);
        self.invalidate(node, TransformBit::SCALE);
    }

    /// Rotates the node so that -Z points at `target` (parent space).
    pub fn look_at(&mut self, node: NodeHandle, target: Vec3, up: Vec3) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        if let Some(rotation) = Transform::look_at_rotation(n.transform.position, target, up) {
            self.set_rotation(node, rotation);
        }
    }

    // ========================================================================
    // World transform
    // ========================================================================

    /// Resolves the node's world state, ancestors first. A clean node is not
    /// recomputed.
    pub fn update_world_transform(&mut self, node: NodeHandle) {
        let recomputed = transform_system::resolve_node(&mut self.nodes, node);
        if recomputed > self.settings.max_hierarchy_depth {
            log::warn!(
                "Resolved a chain of {recomputed} nodes (max_hierarchy_depth = {})",
                self.settings.max_hierarchy_depth
            );
        }
    }

    /// Full top-down pass over every root. Returns the number of nodes
    /// recomputed.
    pub fn update_hierarchy(&mut self) -> usize {
        transform_system::update_hierarchy(&mut self.nodes, &self.roots)
    }

    pub fn world_matrix(&mut self, node: NodeHandle) -> Option<Affine3A> {
        self.update_world_transform(node);
        self.nodes.get(node).map(|n| n.transform.world_matrix)
    }

    pub fn world_position(&mut self, node: NodeHandle) -> Option<Vec3> {
        self.update_world_transform(node);
        self.nodes.get(node).map(|n| n.transform.world_position)
    }

    pub fn world_rotation(&mut self, node: NodeHandle) -> Option<Quat> {
        self.update_world_transform(node);
        self.nodes.get(node).map(|n| n.transform.world_rotation)
    }

    pub fn world_scale(&mut self, node: NodeHandle) -> Option<Vec3> {
        self.update_world_transform(node);
        self.nodes.get(node).map(|n| n.transform.world_scale)
    }

    #[must_use]
    pub fn world_version(&self, node: NodeHandle) -> Option<u64> {
        self.nodes.get(node).map(|n| n.world_version)
    }

    pub fn set_world_position(&mut self, node: NodeHandle, position: Vec3) {
        let Some(parent) = self.nodes.get(node).map(|n| n.parent) else {
            return;
        };
        let local = match parent.and_then(|p| self.world_matrix(p)) {
            Some(parent_world) => parent_world.inverse().transform_point3(position),
            None => position,
        };
        self.set_position(node, local);
    }

    pub fn set_world_rotation(&mut self, node: NodeHandle, rotation: Quat) {
        let Some(parent) = self.nodes.get(node).map(|n| n.parent) else {
            return;
        };
        let local = match parent.and_then(|p| self.world_rotation(p)) {
            Some(parent_rotation) => (parent_rotation.inverse() * rotation).normalize(),
            None => rotation,
        };
        self.set_rotation(node, local);
    }

    // ========================================================================
    // Dirty & changed flags
    // ========================================================================

    #[must_use]
    pub fn dirty_flags(&self, node: NodeHandle) -> TransformBit {
        self.nodes
            .get(node)
            .map_or(TransformBit::empty(), |n| n.dirty_flags)
    }

    /// Overwrites the node's dirty mask without propagating. Queues the node
    /// when `flags` is non-empty.
    pub fn set_dirty_flags(&mut self, node: NodeHandle, flags: TransformBit) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.dirty_flags = flags;
        if !flags.is_empty() {
            self.enqueue(node);
        }
    }

    #[must_use]
    pub fn changed_flags(&self, node: NodeHandle) -> TransformBit {
        self.nodes
            .get(node)
            .map_or(TransformBit::empty(), |n| n.changed_flags)
    }

    /// Marks `node` with `bit` and every strict descendant with
    /// `bit.descendant_bits()`.
    pub fn invalidate(&mut self, node: NodeHandle, bit: TransformBit) {
        self.mark(node, bit);
        self.invalidate_children(node, bit.descendant_bits());
    }

    /// Marks every strict descendant of `node` with `bit`, leaving the node's
    /// own flags untouched.
    pub fn invalidate_children(&mut self, node: NodeHandle, bit: TransformBit) {
        let mut stack: Vec<NodeHandle> = self.children(node).to_vec();
        while let Some(handle) = stack.pop() {
            self.mark(handle, bit);
            if let Some(n) = self.nodes.get(handle) {
                stack.extend_from_slice(&n.children);
            }
        }
    }

    fn mark(&mut self, node: NodeHandle, bit: TransformBit) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.dirty_flags |= bit;
        n.changed_flags |= bit;
        if n.dirty_slot.is_none() {
            n.dirty_slot = Some(self.dirty_queue.push(node));
        }
    }

    fn enqueue(&mut self, node: NodeHandle) {
        if let Some(n) = self.nodes.get_mut(node)
            && n.dirty_slot.is_none()
        {
            n.dirty_slot = Some(self.dirty_queue.push(node));
        }
    }

    // ========================================================================
    // Dirty-node table (frame protocol)
    // ========================================================================

    /// Writes `node` into `slot` of the dirty table, vacating the slot the
    /// node previously occupied and detaching the slot's previous occupant.
    ///
    /// Slots at or past `max_dirty_slots` and missing nodes are ignored.
    pub fn set_dirty_node(&mut self, slot: usize, node: Option<NodeHandle>) {
        if slot >= self.dirty_queue.max_slots() {
            log::warn!(
                "set_dirty_node: slot {slot} out of range (max {})",
                self.dirty_queue.max_slots()
            );
            return;
        }
        if node.is_some_and(|h| !self.nodes.contains_key(h)) {
            log::warn!("set_dirty_node: node not found, slot {slot} left unchanged");
            return;
        }
        if let Some(previous) = self.dirty_queue.get_dirty_node(slot)
            && let Some(n) = self.nodes.get_mut(previous)
        {
            n.dirty_slot = None;
        }
        if let Some(handle) = node {
            let Some(n) = self.nodes.get_mut(handle) else {
                return;
            };
            if let Some(old_slot) = n.dirty_slot
                && old_slot != slot
            {
                self.dirty_queue.set_dirty_node(old_slot, None);
            }
            n.dirty_slot = Some(slot);
        }
        self.dirty_queue.set_dirty_node(slot, node);
    }

    #[must_use]
    pub fn get_dirty_node(&self, slot: usize) -> Option<NodeHandle> {
        self.dirty_queue.get_dirty_node(slot)
    }

    /// Consumer pass: resolves every queued node. Returns the number of nodes
    /// recomputed.
    pub fn resolve_dirty_nodes(&mut self) -> usize {
        let mut recomputed = 0;
        for slot in 0..self.dirty_queue.len() {
            if let Some(handle) = self.dirty_queue.get_dirty_node(slot) {
                recomputed += transform_system::resolve_node(&mut self.nodes, handle);
            }
        }
        log::trace!(
            "Graph {}: resolved {recomputed} nodes from {} dirty slots",
            self.id,
            self.dirty_queue.len()
        );
        recomputed
    }

    /// Clears the changed flags of every node that changed this frame.
    pub fn reset_changed_flags(&mut self) {
        for handle in self.dirty_queue.iter() {
            if let Some(n) = self.nodes.get_mut(handle) {
                n.changed_flags = TransformBit::empty();
            }
        }
    }

    /// Empties the dirty table.
    pub fn clear_node_array(&mut self) {
        for handle in self.dirty_queue.iter() {
            if let Some(n) = self.nodes.get_mut(handle) {
                n.dirty_slot = None;
            }
        }
        self.dirty_queue.clear_node_array();
    }

    /// Frame boundary: resets changed flags and empties the dirty table.
    ///
    /// With `carry_over_dirty_nodes`, nodes mutated after the resolve pass
    /// are queued again with their changed flags restored to their dirty
    /// bits, so the next frame still sees them.
    pub fn end_frame(&mut self) {
        let carried: Vec<NodeHandle> = if self.settings.carry_over_dirty_nodes {
            self.dirty_queue
                .iter()
                .filter(|&h| self.nodes.get(h).is_some_and(|n| !n.dirty_flags.is_empty()))
                .collect()
        } else {
            Vec::new()
        };

        self.reset_changed_flags();
        self.clear_node_array();

        for handle in carried {
            if let Some(n) = self.nodes.get_mut(handle) {
                n.changed_flags = n.dirty_flags;
            }
            self.enqueue(handle);
        }
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Position of `node` in `children`, or -1.
    #[must_use]
    pub fn get_idx_of_child(children: &[NodeHandle], node: NodeHandle) -> isize {
        children
            .iter()
            .position(|&c| c == node)
            .map_or(-1, |i| i as isize)
    }

    #[must_use]
    pub fn sibling_index(&self, node: NodeHandle) -> Option<usize> {
        self.nodes.get(node).map(|n| n.sibling_index)
    }

    /// `true` if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_descendant_of(&self, node: NodeHandle, ancestor: NodeHandle) -> bool {
        let mut cursor = self.parent(node);
        while let Some(handle) = cursor {
            if handle == ancestor {
                return true;
            }
            cursor = self.parent(handle);
        }
        false
    }

    /// Moves `node` under `parent` (or to root level for `None`), appending it
    /// after the existing children, and marks it fully dirty.
    ///
    /// With `keep_world_transform`, the local transform is rewritten so the
    /// node's world position, rotation and scale are unchanged.
    ///
    /// Returns `false` (and changes nothing) for missing nodes, self-attach
    /// and cycles.
    pub fn set_parent(
        &mut self,
        node: NodeHandle,
        parent: Option<NodeHandle>,
        keep_world_transform: bool,
    ) -> bool {
        match self.try_set_parent(node, parent, keep_world_transform) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("set_parent: {e}");
                false
            }
        }
    }

    /// Fallible form of [`set_parent`](Self::set_parent).
    ///
    /// # Errors
    ///
    /// [`StrataError::NodeNotFound`] if `node` or `parent` is not live, and
    /// [`StrataError::HierarchyCycle`] if `parent` is `node` itself or one of
    /// its descendants.
    pub fn try_set_parent(
        &mut self,
        node: NodeHandle,
        parent: Option<NodeHandle>,
        keep_world_transform: bool,
    ) -> Result<()> {
        let current = self
            .nodes
            .get(node)
            .map(|n| n.parent)
            .ok_or(StrataError::NodeNotFound)?;
        if let Some(p) = parent {
            if p == node {
                return Err(StrataError::HierarchyCycle);
            }
            if !self.nodes.contains_key(p) {
                return Err(StrataError::NodeNotFound);
            }
            if self.is_descendant_of(p, node) {
                return Err(StrataError::HierarchyCycle);
            }
        }
        if current == parent {
            return Ok(());
        }

        if keep_world_transform {
            let world = self.world_matrix(node).unwrap_or(Affine3A::IDENTITY);
            let parent_world = parent
                .and_then(|p| self.world_matrix(p))
                .unwrap_or(Affine3A::IDENTITY);
            let local = parent_world.inverse() * world;
            if let Some(n) = self.nodes.get_mut(node) {
                n.transform.set_local_matrix(local);
            }
        }

        self.unlink(node);
        self.link(node, parent);
        self.invalidate(node, TransformBit::TRS);
        Ok(())
    }

    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> bool {
        self.set_parent(child, Some(parent), false)
    }

    /// Detaches `child` from `parent`, making it a root node.
    ///
    /// Returns `false` if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.set_parent(child, None, false)
    }

    /// Moves `node` to position `index` among its siblings (clamped to the
    /// last position) and renumbers them. Dirty state is untouched.
    pub fn set_sibling_index(&mut self, node: NodeHandle, index: usize) {
        let Some((parent, cached)) = self.nodes.get(node).map(|n| (n.parent, n.sibling_index))
        else {
            return;
        };

        let mut siblings = self.take_siblings(parent);
        let current = if siblings.get(cached) == Some(&node) {
            Some(cached)
        } else {
            usize::try_from(Self::get_idx_of_child(&siblings, node)).ok()
        };

        if let Some(current) = current {
            let target = index.min(siblings.len() - 1);
            if current != target {
                let moved = siblings.remove(current);
                siblings.insert(target, moved);
            }
            self.renumber(&siblings, 0);
        }
        self.put_siblings(parent, siblings);
    }

    fn take_siblings(&mut self, parent: Option<NodeHandle>) -> Vec<NodeHandle> {
        match parent {
            Some(p) => self
                .nodes
                .get_mut(p)
                .map(|n| std::mem::take(&mut n.children))
                .unwrap_or_default(),
            None => std::mem::take(&mut self.roots),
        }
    }

    fn put_siblings(&mut self, parent: Option<NodeHandle>, siblings: Vec<NodeHandle>) {
        match parent {
            Some(p) => {
                if let Some(n) = self.nodes.get_mut(p) {
                    n.children = siblings;
                }
            }
            None => self.roots = siblings,
        }
    }

    fn renumber(&mut self, siblings: &[NodeHandle], from: usize) {
        for (index, &handle) in siblings.iter().enumerate().skip(from) {
            if let Some(n) = self.nodes.get_mut(handle) {
                n.sibling_index = index;
            }
        }
    }

    /// Removes `node` from its sibling list and renumbers the rest. Leaves the
    /// node parentless and outside the root list.
    fn unlink(&mut self, node: NodeHandle) {
        let Some((parent, cached)) = self.nodes.get(node).map(|n| (n.parent, n.sibling_index))
        else {
            return;
        };

        let mut siblings = self.take_siblings(parent);
        let position = if siblings.get(cached) == Some(&node) {
            Some(cached)
        } else {
            usize::try_from(Self::get_idx_of_child(&siblings, node)).ok()
        };
        if let Some(position) = position {
            siblings.remove(position);
            self.renumber(&siblings, position);
        }
        self.put_siblings(parent, siblings);

        if let Some(n) = self.nodes.get_mut(node) {
            n.parent = None;
        }
    }

    /// Appends `node` to `parent`'s children (or the root list).
    fn link(&mut self, node: NodeHandle, parent: Option<NodeHandle>) {
        let mut siblings = self.take_siblings(parent);
        let index = siblings.len();
        siblings.push(node);
        self.put_siblings(parent, siblings);

        if let Some(n) = self.nodes.get_mut(node) {
            n.parent = parent;
            n.sibling_index = index;
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Pre-order traversal of the subtree rooted at `start`.
    pub fn walk<F>(&mut self, start: NodeHandle, pre: F)
    where
        F: FnMut(&mut SceneGraph, NodeHandle),
    {
        self.walk_with_post(start, pre, |_, _| {});
    }

    /// Pre/post-order traversal of the subtree rooted at `start`, children in
    /// ascending sibling order.
    ///
    /// Callbacks may restructure the graph. A node's child list is
    /// snapshotted right after its pre-callback returns; nodes destroyed
    /// before they are reached are skipped.
    pub fn walk_with_post<F, G>(&mut self, start: NodeHandle, mut pre: F, mut post: G)
    where
        F: FnMut(&mut SceneGraph, NodeHandle),
        G: FnMut(&mut SceneGraph, NodeHandle),
    {
        let mut stack = vec![Visit::Enter(start)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(handle) => {
                    if !self.nodes.contains_key(handle) {
                        continue;
                    }
                    pre(self, handle);

                    let Some(node) = self.nodes.get(handle) else {
                        continue;
                    };
                    stack.push(Visit::Exit(handle));
                    stack.extend(node.children.iter().rev().map(|&c| Visit::Enter(c)));
                }
                Visit::Exit(handle) => {
                    if self.nodes.contains_key(handle) {
                        post(self, handle);
                    }
                }
            }
        }
    }

    /// Pre-order traversal of every root's subtree.
    pub fn walk_all<F>(&mut self, mut pre: F)
    where
        F: FnMut(&mut SceneGraph, NodeHandle),
    {
        let roots = self.roots.clone();
        for root in roots {
            self.walk(root, &mut pre);
        }
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Schedules `node` and its subtree for destruction at the next
    /// [`deferred_destroy`](Self::deferred_destroy).
    ///
    /// Returns `false` if the node does not exist or is already scheduled.
    pub fn destroy(&mut self, node: NodeHandle) -> bool {
        let Some(n) = self.nodes.get_mut(node) else {
            return false;
        };
        if n.pending_destroy {
            return false;
        }
        n.pending_destroy = true;
        self.pending_destroy.push(node);
        true
    }

    /// Destroys every scheduled node. Returns the number of subtrees removed.
    pub fn deferred_destroy(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_destroy);
        let mut destroyed = 0;
        for handle in pending {
            if self.nodes.contains_key(handle) {
                self.destroy_immediate(handle);
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            log::debug!("Graph {}: destroyed {destroyed} scheduled subtrees", self.id);
        }
        destroyed
    }

    /// Removes `node` and its subtree right away: out of the parent's child
    /// list, out of the dirty table, out of the arena.
    pub fn destroy_immediate(&mut self, node: NodeHandle) {
        if !self.nodes.contains_key(node) {
            return;
        }
        self.unlink(node);

        let mut stack = vec![node];
        while let Some(handle) = stack.pop() {
            if let Some(removed) = self.nodes.remove(handle) {
                if let Some(slot) = removed.dirty_slot {
                    self.dirty_queue.set_dirty_node(slot, None);
                }
                stack.extend(removed.children);
            }
        }
    }
}
