//! Material pass
//!
//! A [`Pass`] is one shader + state combination of a material. It owns:
//! - the property table built from [`ShaderReflection`], mapping interned
//!   property names to packed [`UniformHandle`]s
//! - one root staging buffer holding every uniform block of the shader, each
//!   block starting on a [`BLOCK_ALIGNMENT`] boundary
//! - the texture slots of every sampler binding
//!
//! # Usage
//!
//! ```rust,ignore
//! let reflection = ShaderReflection::new().with_block(
//!     UniformBlockDesc::std140("Material", 0)
//!         .member("time", UniformType::Float)
//!         .member("mainColor", UniformType::Float4)
//!         .build(),
//! );
//! let mut pass = Pass::new("forward", &reflection)?;
//!
//! // Resolve once, write every frame
//! let color = pass.get_handle("mainColor");
//! pass.set_uniform(color, Vec4::new(1.0, 0.5, 0.2, 1.0));
//!
//! // Before drawing
//! pass.update(&mut device);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::device::{BufferId, GraphicsDevice, TextureBinding, TextureId};
use crate::errors::{Result, StrataError};
use crate::resources::uniform_handle::{PropertyKind, UniformHandle};
use crate::resources::uniforms::{ShaderReflection, UniformType, UniformValue};
use crate::resources::version_tracker::ChangeTracker;
use crate::utils::interner::{self, Symbol};

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

/// Alignment of each uniform block inside the root buffer.
pub const BLOCK_ALIGNMENT: usize = 256;

#[derive(Debug, Clone, Copy)]
struct BlockRange {
    base: usize,
    size: usize,
}

#[derive(Debug)]
pub struct Pass {
    id: u64,
    name: String,

    properties: FxHashMap<Symbol, UniformHandle>,
    block_ranges: FxHashMap<u32, BlockRange>,

    root_buffer: Vec<u8>,
    root_buffer_dirty: bool,

    textures: FxHashMap<u32, Vec<Option<TextureId>>>,
    descriptors_dirty: bool,

    buffer: Option<BufferId>,

    version: ChangeTracker,
    pipeline_version: ChangeTracker,
}

impl Pass {
    /// Builds the property table from reflection data.
    ///
    /// # Errors
    ///
    /// - `DuplicateProperty` if two members or samplers share a name, or two
    ///   blocks share a binding
    /// - `OutOfBounds` if a member extends past its block
    /// - `TypeMismatch` if a sampler binding declares a non-texture type
    /// - handle encoding errors for fields that do not fit a handle
    pub fn new(name: &str, reflection: &ShaderReflection) -> Result<Self> {
        let mut properties: FxHashMap<Symbol, UniformHandle> = FxHashMap::default();
        let mut block_ranges: FxHashMap<u32, BlockRange> = FxHashMap::default();
        let mut cursor = 0usize;

        for block in &reflection.blocks {
            let size = block.size as usize;
            for member in &block.members {
                let extent = member.extent();
                if member.offset as usize + extent > size {
                    return Err(StrataError::OutOfBounds {
                        offset: member.offset as usize,
                        len: extent,
                        size,
                    });
                }
                let handle =
                    UniformHandle::encode(member.ty, block.binding, member.offset, member.count.max(1))?;
                if properties
                    .insert(interner::intern(&member.name), handle)
                    .is_some()
                {
                    return Err(StrataError::DuplicateProperty(member.name.clone()));
                }
            }

            let base = cursor.next_multiple_of(BLOCK_ALIGNMENT);
            if block_ranges
                .insert(block.binding, BlockRange { base, size })
                .is_some()
            {
                return Err(StrataError::DuplicateProperty(block.name.clone()));
            }
            cursor = base + size;
        }

        let mut textures: FxHashMap<u32, Vec<Option<TextureId>>> = FxHashMap::default();
        for sampler in &reflection.samplers {
            if !sampler.ty.is_texture() {
                return Err(StrataError::TypeMismatch {
                    expected: UniformType::Sampler2D,
                    actual: sampler.ty,
                });
            }
            let count = sampler.count.max(1);
            let handle = UniformHandle::encode(sampler.ty, sampler.binding, 0, count)?;
            if properties
                .insert(interner::intern(&sampler.name), handle)
                .is_some()
            {
                return Err(StrataError::DuplicateProperty(sampler.name.clone()));
            }
            if block_ranges.contains_key(&sampler.binding)
                || textures
                    .insert(sampler.binding, vec![None; count as usize])
                    .is_some()
            {
                return Err(StrataError::DuplicateProperty(sampler.name.clone()));
            }
        }

        log::debug!(
            "Pass `{name}`: {} properties, {} blocks, {cursor} byte root buffer",
            properties.len(),
            block_ranges.len()
        );

        Ok(Self {
            id: NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            properties,
            block_ranges,
            root_buffer: vec![0; cursor],
            root_buffer_dirty: true,
            textures,
            descriptors_dirty: true,
            buffer: None,
            version: ChangeTracker::new(),
            pipeline_version: ChangeTracker::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        interner::get(name).is_some_and(|sym| self.properties.contains_key(&sym))
    }

    /// Bumped by every uniform or texture write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.version()
    }

    /// Bumped by [`on_global_pipeline_state_changed`](Self::on_global_pipeline_state_changed).
    #[must_use]
    pub fn pipeline_version(&self) -> u64 {
        self.pipeline_version.version()
    }

    #[must_use]
    pub fn root_buffer(&self) -> &[u8] {
        &self.root_buffer
    }

    #[must_use]
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    #[must_use]
    pub fn is_root_buffer_dirty(&self) -> bool {
        self.root_buffer_dirty
    }

    /// Start of the block bound at `binding` inside the root buffer.
    #[must_use]
    pub fn block_base(&self, binding: u32) -> Option<usize> {
        self.block_ranges.get(&binding).map(|r| r.base)
    }

    // ========================================================================
    // Handle lookup
    // ========================================================================

    /// Resolves `name` to a handle.
    ///
    /// `offset_in_array` selects an element of an array property: the handle
    /// then addresses that element and the remaining elements after it.
    /// `explicit_type` reinterprets the property as another type of the same
    /// kind.
    ///
    /// # Errors
    ///
    /// `UnknownProperty`, `OutOfBounds` (element past the end of the array) or
    /// `TypeMismatch` (texture/buffer kind change).
    pub fn try_get_handle(
        &self,
        name: &str,
        offset_in_array: u32,
        explicit_type: Option<UniformType>,
    ) -> Result<UniformHandle> {
        let handle = interner::get(name)
            .and_then(|sym| self.properties.get(&sym))
            .copied()
            .ok_or_else(|| StrataError::UnknownProperty(name.to_string()))?;

        if offset_in_array == 0 && explicit_type.is_none() {
            return Ok(handle);
        }

        let count = handle.count();
        if offset_in_array >= count {
            return Err(StrataError::OutOfBounds {
                offset: offset_in_array as usize,
                len: 1,
                size: count as usize,
            });
        }

        let declared = handle.ty();
        let ty = explicit_type.unwrap_or(declared);
        if PropertyKind::of(ty) != handle.property_kind() {
            return Err(StrataError::TypeMismatch {
                expected: declared,
                actual: ty,
            });
        }

        let offset = handle.offset() + offset_in_array * declared.array_stride() as u32;
        UniformHandle::encode(ty, handle.binding(), offset, count - offset_in_array)
    }

    /// Resolves `name`, returning [`UniformHandle::INVALID`] if it does not
    /// exist.
    #[must_use]
    pub fn get_handle(&self, name: &str) -> UniformHandle {
        self.get_handle_ext(name, 0, None)
    }

    #[must_use]
    pub fn get_handle_ext(
        &self,
        name: &str,
        offset_in_array: u32,
        explicit_type: Option<UniformType>,
    ) -> UniformHandle {
        match self.try_get_handle(name, offset_in_array, explicit_type) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Pass `{}`: {e}", self.name);
                UniformHandle::INVALID
            }
        }
    }

    /// Binding of the property `name`, if it exists.
    #[must_use]
    pub fn get_binding(&self, name: &str) -> Option<u32> {
        interner::get(name)
            .and_then(|sym| self.properties.get(&sym))
            .map(|h| h.binding())
    }

    // ========================================================================
    // Uniform writes
    // ========================================================================

    fn block_range(&self, handle: UniformHandle) -> Result<BlockRange> {
        if !handle.is_valid() || handle.property_kind() != PropertyKind::Buffer {
            return Err(StrataError::InvalidHandle(handle.raw()));
        }
        self.block_ranges
            .get(&handle.binding())
            .copied()
            .ok_or(StrataError::InvalidHandle(handle.raw()))
    }

    fn check_type<T: UniformValue>(handle: UniformHandle) -> Result<()> {
        if handle.ty() == T::TYPE {
            Ok(())
        } else {
            Err(StrataError::TypeMismatch {
                expected: handle.ty(),
                actual: T::TYPE,
            })
        }
    }

    /// Writes `value` at the handle's address.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `TypeMismatch` or `OutOfBounds`.
    pub fn try_set_uniform<T: UniformValue>(&mut self, handle: UniformHandle, value: &T) -> Result<()> {
        let range = self.block_range(handle)?;
        Self::check_type::<T>(handle)?;

        let offset = handle.offset() as usize;
        let len = T::TYPE.size();
        if offset + len > range.size {
            return Err(StrataError::OutOfBounds {
                offset,
                len,
                size: range.size,
            });
        }

        let start = range.base + offset;
        value.write_bytes(&mut self.root_buffer[start..start + len]);
        self.root_buffer_dirty = true;
        self.version.changed();
        Ok(())
    }

    /// Writes `value`; on failure logs a warning, leaves the buffer untouched
    /// and returns `false`.
    pub fn set_uniform<T: UniformValue>(&mut self, handle: UniformHandle, value: T) -> bool {
        match self.try_set_uniform(handle, &value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Pass `{}`: set_uniform failed: {e}", self.name);
                false
            }
        }
    }

    /// Writes consecutive array elements starting at the handle's element.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `TypeMismatch`, or `OutOfBounds` when `values` holds
    /// more elements than the handle's count.
    pub fn try_set_uniform_array<T: UniformValue>(
        &mut self,
        handle: UniformHandle,
        values: &[T],
    ) -> Result<()> {
        let range = self.block_range(handle)?;
        Self::check_type::<T>(handle)?;
        if values.is_empty() {
            return Ok(());
        }

        let offset = handle.offset() as usize;
        let size = T::TYPE.size();
        let stride = T::TYPE.array_stride();
        let len = stride * (values.len() - 1) + size;
        if values.len() > handle.count() as usize || offset + len > range.size {
            return Err(StrataError::OutOfBounds {
                offset,
                len,
                size: range.size,
            });
        }

        for (i, value) in values.iter().enumerate() {
            let start = range.base + offset + i * stride;
            value.write_bytes(&mut self.root_buffer[start..start + size]);
        }
        self.root_buffer_dirty = true;
        self.version.changed();
        Ok(())
    }

    pub fn set_uniform_array<T: UniformValue>(&mut self, handle: UniformHandle, values: &[T]) -> bool {
        match self.try_set_uniform_array(handle, values) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Pass `{}`: set_uniform_array failed: {e}", self.name);
                false
            }
        }
    }

    /// Reads the staged value at the handle's address.
    #[must_use]
    pub fn read_uniform<T: UniformValue>(&self, handle: UniformHandle) -> Option<T> {
        let range = self.block_range(handle).ok()?;
        Self::check_type::<T>(handle).ok()?;
        let offset = handle.offset() as usize;
        let len = T::TYPE.size();
        if offset + len > range.size {
            return None;
        }
        let start = range.base + offset;
        Some(T::read_bytes(&self.root_buffer[start..start + len]))
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// Binds `texture` to the slot addressed by a texture handle.
    pub fn set_texture(&mut self, handle: UniformHandle, texture: TextureId) -> bool {
        if !handle.is_valid() || handle.property_kind() != PropertyKind::Texture {
            log::warn!(
                "Pass `{}`: set_texture with non-texture handle {:#018x}",
                self.name,
                handle.raw()
            );
            return false;
        }
        self.bind_texture(handle.binding(), texture, handle.offset())
    }

    /// Binds `texture` to element `index` of the sampler at `binding`.
    pub fn bind_texture(&mut self, binding: u32, texture: TextureId, index: u32) -> bool {
        let Some(slot) = self
            .textures
            .get_mut(&binding)
            .and_then(|slots| slots.get_mut(index as usize))
        else {
            log::warn!(
                "Pass `{}`: no texture slot at binding {binding}, index {index}",
                self.name
            );
            return false;
        };
        if *slot != Some(texture) {
            *slot = Some(texture);
            self.descriptors_dirty = true;
            self.version.changed();
        }
        true
    }

    #[must_use]
    pub fn texture(&self, binding: u32, index: u32) -> Option<TextureId> {
        self.textures
            .get(&binding)
            .and_then(|slots| slots.get(index as usize))
            .copied()
            .flatten()
    }

    // ========================================================================
    // Device synchronisation
    // ========================================================================

    /// Creates the device-side uniform buffer.
    ///
    /// Returns `false` (leaving the pass re-initializable) when the device
    /// cannot allocate it.
    pub fn initialize(&mut self, device: &mut dyn GraphicsDevice) -> bool {
        if self.buffer.is_some() || self.root_buffer.is_empty() {
            return true;
        }

        let alignment = device.uniform_offset_alignment() as usize;
        if alignment == 0 || BLOCK_ALIGNMENT % alignment != 0 {
            log::warn!(
                "Pass `{}`: device uniform alignment {alignment} is incompatible with {BLOCK_ALIGNMENT}",
                self.name
            );
        }

        match device.create_uniform_buffer(self.root_buffer.len(), &self.name) {
            Some(buffer) => {
                self.buffer = Some(buffer);
                self.root_buffer_dirty = true;
                self.descriptors_dirty = true;
                true
            }
            None => {
                log::error!("Pass `{}`: failed to allocate uniform buffer", self.name);
                false
            }
        }
    }

    /// Uploads the root buffer if it changed and rebuilds descriptors if a
    /// binding changed.
    pub fn update(&mut self, device: &mut dyn GraphicsDevice) {
        if self.root_buffer_dirty
            && let Some(buffer) = self.buffer
        {
            device.write_buffer(buffer, 0, &self.root_buffer);
            self.root_buffer_dirty = false;
        }

        if self.descriptors_dirty {
            let mut bindings: Vec<TextureBinding> = self
                .textures
                .iter()
                .flat_map(|(&binding, slots)| {
                    slots.iter().enumerate().filter_map(move |(index, slot)| {
                        slot.map(|texture| TextureBinding {
                            binding,
                            index: index as u32,
                            texture,
                        })
                    })
                })
                .collect();
            bindings.sort_by_key(|b| (b.binding, b.index));

            device.update_bindings(self.buffer, &bindings);
            self.descriptors_dirty = false;
        }
    }

    /// Releases the device buffer. The staged data is kept.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
            self.root_buffer_dirty = true;
            self.descriptors_dirty = true;
        }
    }

    /// Pipeline-wide defines changed: the shader variant and its descriptor
    /// layout must be rebuilt.
    pub fn on_global_pipeline_state_changed(&mut self) {
        self.pipeline_version.changed();
        self.descriptors_dirty = true;
        log::trace!("Pass `{}`: pipeline state changed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::uniforms::UniformBlockDesc;
    use glam::Vec4;

    fn reflection() -> ShaderReflection {
        ShaderReflection::new()
            .with_block(
                UniformBlockDesc::std140("Material", 0)
                    .member("passTime", UniformType::Float)
                    .member("passColor", UniformType::Float4)
                    .build(),
            )
            .with_block(
                UniformBlockDesc::std140("Lights", 1)
                    .array("passLightColors", UniformType::Float4, 4)
                    .build(),
            )
    }

    #[test]
    fn blocks_start_on_aligned_bases() {
        let pass = Pass::new("unit", &reflection()).unwrap();
        let bases = [pass.block_base(0).unwrap(), pass.block_base(1).unwrap()];
        assert!(bases.contains(&0));
        assert!(bases.contains(&BLOCK_ALIGNMENT));
        assert_eq!(pass.root_buffer().len(), BLOCK_ALIGNMENT + 64);
    }

    #[test]
    fn array_element_handle_shifts_offset_and_count() {
        let pass = Pass::new("unit", &reflection()).unwrap();
        let h = pass.get_handle_ext("passLightColors", 2, None);
        assert_eq!(h.offset(), 32);
        assert_eq!(h.count(), 2);
        assert!(!pass.get_handle_ext("passLightColors", 4, None).is_valid());
    }

    #[test]
    fn write_lands_in_owning_block() {
        let mut pass = Pass::new("unit", &reflection()).unwrap();
        let h = pass.get_handle_ext("passLightColors", 1, None);
        assert!(pass.set_uniform(h, Vec4::ONE));

        let base = pass.block_base(1).unwrap();
        let bytes = &pass.root_buffer()[base + 16..base + 32];
        let written: [f32; 4] = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(written, [1.0; 4]);
    }
}
