//! Scene Graph Settings
//!
//! Tunables for [`SceneGraph`](crate::scene::SceneGraph) storage and the
//! per-frame dirty protocol.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata::{SceneGraph, SceneSettings};
//!
//! // Defaults are fine for most scenes
//! let graph = SceneGraph::new();
//!
//! // Large scenes: pre-size the arena and the dirty table
//! let settings = SceneSettings {
//!     node_capacity: 16_384,
//!     dirty_queue_capacity: 4_096,
//!     ..Default::default()
//! };
//! let graph = SceneGraph::with_settings(&settings);
//!
//! // Or load them from a JSON document
//! let settings = SceneSettings::from_json(r#"{ "max_hierarchy_depth": 64 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StrataError};
use crate::scene::dirty_queue::DEFAULT_MAX_DIRTY_SLOTS;

/// Storage and frame-protocol settings for a [`SceneGraph`](crate::scene::SceneGraph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Initial capacity of the node arena.
    pub node_capacity: usize,

    /// Initial capacity of the dirty-node table.
    pub dirty_queue_capacity: usize,

    /// Explicit dirty-table writes at or past this slot are ignored.
    pub max_dirty_slots: usize,

    /// Resolving a chain of ancestors longer than this logs a warning.
    pub max_hierarchy_depth: usize,

    /// When `true`, [`SceneGraph::end_frame`](crate::scene::SceneGraph::end_frame)
    /// puts nodes that were mutated after the resolve pass back into the
    /// dirty table so the next frame still resolves them.
    pub carry_over_dirty_nodes: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            node_capacity: 256,
            dirty_queue_capacity: 128,
            max_dirty_slots: DEFAULT_MAX_DIRTY_SLOTS,
            max_hierarchy_depth: 256,
            carry_over_dirty_nodes: true,
        }
    }
}

impl SceneSettings {
    /// Parses settings from JSON. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every field is within its usable range.
    pub fn validate(&self) -> Result<()> {
        if self.max_hierarchy_depth == 0 {
            return Err(StrataError::InvalidSettings(
                "max_hierarchy_depth must be at least 1".to_string(),
            ));
        }
        if self.max_dirty_slots == 0 {
            return Err(StrataError::InvalidSettings(
                "max_dirty_slots must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
