//! Graphics device boundary
//!
//! The scene core never records GPU commands. It only computes *where* uniform
//! data lives and hands finished byte ranges to an implementation of
//! [`GraphicsDevice`], which owns the actual buffers, textures and descriptor
//! sets.

/// Opaque identifier of a device-side uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Opaque identifier of a device-side texture (with its sampler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// One texture slot of a pass's descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub binding: u32,
    /// Element index for sampler arrays.
    pub index: u32,
    pub texture: TextureId,
}

/// The narrow interface a [`Pass`](crate::resources::Pass) needs from the
/// graphics backend.
pub trait GraphicsDevice {
    /// Minimum alignment of a uniform block inside a shared buffer.
    fn uniform_offset_alignment(&self) -> u32 {
        256
    }

    /// Allocates a uniform buffer of `size` bytes.
    ///
    /// Returns `None` when the device cannot provide the buffer.
    fn create_uniform_buffer(&mut self, size: usize, label: &str) -> Option<BufferId>;

    /// Copies `data` into `buffer` starting at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Releases a buffer created by [`create_uniform_buffer`](Self::create_uniform_buffer).
    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Rebuilds the descriptor set that binds `buffer` and `textures`.
    fn update_bindings(&mut self, buffer: Option<BufferId>, textures: &[TextureBinding]);
}
