//! Transform system
//!
//! World-matrix resolution over the node arena, decoupled from
//! [`SceneGraph`](crate::scene::SceneGraph) so it only borrows the nodes.
//!
//! Two entry points:
//! - [`resolve_node`]: lazy, ancestor-first resolution of a single node. Walks
//!   up to the topmost dirty ancestor and recomputes down to the node. This is
//!   what the dirty-queue consumer and every world-space getter use.
//! - [`update_hierarchy`]: full top-down pass over every root, for callers
//!   that prefer one sweep over the dirty table.
//!
//! Both clear the dirty bits of every node they recompute, and a clean node
//! is never recomputed by either.

use glam::Affine3A;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;
use crate::scene::transform::TransformBit;

/// Resolves `node`'s world state, recomputing dirty ancestors first.
///
/// Returns the number of nodes recomputed (0 if `node` and all its ancestors
/// were already clean).
pub fn resolve_node(nodes: &mut SlotMap<NodeHandle, Node>, node: NodeHandle) -> usize {
    // Chain from `node` up to the root; `top` is the highest dirty entry.
    let mut chain: Vec<NodeHandle> = Vec::new();
    let mut top = None;
    let mut cursor = Some(node);
    while let Some(handle) = cursor {
        let Some(current) = nodes.get(handle) else {
            break;
        };
        if !current.dirty_flags.is_empty() {
            top = Some(chain.len());
        }
        chain.push(handle);
        cursor = current.parent;
    }

    let Some(top) = top else {
        return 0;
    };

    for &handle in chain[..=top].iter().rev() {
        recompute(nodes, handle);
    }
    top + 1
}

/// Recomputes one node from its parent's (already resolved) world state.
fn recompute(nodes: &mut SlotMap<NodeHandle, Node>, handle: NodeHandle) {
    let parent_world = nodes
        .get(handle)
        .and_then(|n| n.parent)
        .and_then(|p| nodes.get(p))
        .map(|p| p.transform.world_state());

    let Some(node) = nodes.get_mut(handle) else {
        return;
    };
    node.transform.compose_world(parent_world);
    node.dirty_flags = TransformBit::empty();
    node.world_version = node.world_version.wrapping_add(1);
}

/// Updates every node reachable from `roots`, top-down.
///
/// A node is recomputed when it is dirty or when its parent was recomputed
/// in this pass. Uses an explicit stack to stay safe on deep hierarchies.
///
/// Returns the number of nodes recomputed.
pub fn update_hierarchy(nodes: &mut SlotMap<NodeHandle, Node>, roots: &[NodeHandle]) -> usize {
    // Work stack: (node handle, parent recomputed in this pass)
    let mut stack: Vec<(NodeHandle, bool)> = Vec::with_capacity(64);
    let mut recomputed = 0;

    for &root in roots.iter().rev() {
        stack.push((root, false));
    }

    while let Some((handle, parent_changed)) = stack.pop() {
        let Some(node) = nodes.get(handle) else {
            continue;
        };

        let needs_update = parent_changed || !node.dirty_flags.is_empty();
        if needs_update {
            recompute(nodes, handle);
            recomputed += 1;
        }

        // Children pushed in reverse to keep sibling order
        if let Some(node) = nodes.get(handle) {
            for &child in node.children.iter().rev() {
                stack.push((child, needs_update));
            }
        }
    }

    recomputed
}

/// World matrix of `node` composed from local transforms, root down,
/// ignoring every cache.
#[must_use]
pub fn world_matrix_uncached(nodes: &SlotMap<NodeHandle, Node>, node: NodeHandle) -> Affine3A {
    let mut matrix = Affine3A::IDENTITY;
    let mut cursor = Some(node);
    while let Some(handle) = cursor {
        let Some(current) = nodes.get(handle) else {
            break;
        };
        matrix = current.transform.local_matrix() * matrix;
        cursor = current.parent;
    }
    matrix
}
