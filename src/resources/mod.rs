//! Shader property resources
//!
//! Device-independent data needed to feed a shader:
//! - [`uniforms`]: uniform types, std140 layout and reflection descriptors
//! - [`uniform_handle`]: packed property addresses
//! - [`pass`]: per-pass property table and staging buffer
//! - [`version_tracker`]: change counters

pub mod pass;
pub mod uniform_handle;
pub mod uniforms;
pub mod version_tracker;

pub use pass::Pass;
pub use uniform_handle::{
    PropertyKind, UniformHandle, get_binding_from_handle, get_count_from_handle,
    get_offset_from_handle, get_property_type_from_handle, get_type_from_handle,
};
pub use uniforms::{
    BlockMember, SamplerDesc, ShaderReflection, UniformBlockDesc, UniformType, UniformValue,
};
pub use version_tracker::{ChangeTracker, MutGuard};
