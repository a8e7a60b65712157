//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`StrataError`] covers the failure modes of:
//! - Uniform handle construction and property lookup
//! - Uniform writes (type mismatches, out-of-range offsets)
//! - Scene-graph structural edits
//! - Settings and scene-info validation
//!
//! # Usage
//!
//! Fallible internals return [`Result<T>`], an alias for
//! `std::result::Result<T, StrataError>`. The outward-facing API
//! (`Pass::get_handle`, `Pass::set_uniform`, `RenderScene::initialize`, ...)
//! converts these into sentinel values or `bool` returns after logging.
//!
//! ```rust,ignore
//! use strata::errors::{StrataError, Result};
//!
//! fn lookup(pass: &Pass) -> Result<UniformHandle> {
//!     pass.try_get_handle("mainColor", 0, None)
//! }
//! ```

use thiserror::Error;

use crate::resources::uniforms::UniformType;

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum StrataError {
    // ========================================================================
    // Uniform & Pass Errors
    // ========================================================================
    /// No property with this name exists in the pass's reflected table.
    #[error("Unknown shader property: {0}")]
    UnknownProperty(String),

    /// Two reflected properties share the same name.
    #[error("Duplicate shader property: {0}")]
    DuplicateProperty(String),

    /// A field does not fit into its bit range in the packed handle.
    #[error("Uniform handle field `{field}` out of range: {value} (max {max})")]
    HandleFieldOverflow {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: u64,
        /// Largest accepted value
        max: u64,
    },

    /// The handle is the invalid sentinel or addresses the wrong property kind.
    #[error("Invalid uniform handle: {0:#018x}")]
    InvalidHandle(u64),

    /// The value written does not match the type encoded in the handle.
    #[error("Uniform type mismatch: handle expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Type encoded in the handle
        expected: UniformType,
        /// Type of the value supplied
        actual: UniformType,
    },

    /// A member or write extends past the end of its uniform block.
    #[error("Uniform access out of bounds: {offset} + {len} bytes exceeds block size {size}")]
    OutOfBounds {
        /// Byte offset inside the block
        offset: usize,
        /// Length of the access in bytes
        len: usize,
        /// Size of the block in bytes
        size: usize,
    },

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// A node handle does not refer to a live node.
    #[error("Scene node not found")]
    NodeNotFound,

    /// The requested re-parent would create a cycle.
    #[error("Cannot attach a node under itself or one of its descendants")]
    HierarchyCycle,

    /// `RenderSceneInfo` failed validation.
    #[error("Invalid render scene info: {0}")]
    InvalidSceneInfo(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// `SceneSettings` failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
