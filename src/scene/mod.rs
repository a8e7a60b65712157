//! Scene graph
//!
//! Manages the transform hierarchy and its invalidation protocol:
//! - Node: hierarchy links, local transform, dirty and changed flags
//! - Transform: local TRS plus cached world-space state
//! - DirtyQueue: slot table of nodes awaiting world-matrix resolution
//! - SceneGraph: node arena and every structural/transform operation
//! - transform_system: ancestor-first resolution and full recomputation

pub mod dirty_queue;
pub mod graph;
pub mod node;
pub mod transform;
pub mod transform_system;

pub use dirty_queue::DirtyQueue;
pub use graph::SceneGraph;
pub use node::Node;
pub use transform::{Transform, TransformBit};

use slotmap::new_key_type;

new_key_type! {
    /// Stable generational handle of a node inside a [`SceneGraph`].
    pub struct NodeHandle;
}
