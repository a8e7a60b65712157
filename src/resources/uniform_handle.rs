//! Packed uniform handles
//!
//! A [`UniformHandle`] addresses one shader property (or a tail of a property
//! array) in a single `u64`, so hot-path writes never touch the name table.
//!
//! ```text
//!  63    60 59      52 51      44 43      32 31                      0
//! +--------+----------+----------+----------+-------------------------+
//! |  kind  | binding  |   type   |  count   |   byte offset / index   |
//! +--------+----------+----------+----------+-------------------------+
//! ```
//!
//! - `kind`: [`PropertyKind`] (buffer member or texture slot)
//! - `binding`: descriptor binding, 0..=255
//! - `type`: [`UniformType`] discriminant, never 0 in a valid handle
//! - `count`: remaining array elements, 1..=4095
//! - `offset`: byte offset inside the pass's root buffer range for the
//!   binding; for textures, the array element index
//!
//! The raw value 0 is [`UniformHandle::INVALID`].
//!
//! Handles are trusted capability tokens. [`UniformHandle::encode`] is the
//! only producer of valid handles; decoding is a total, pure bit operation
//! that returns meaningless fields for forged values.

use crate::errors::{Result, StrataError};
use crate::resources::uniforms::UniformType;

const OFFSET_BITS: u32 = 32;
const COUNT_BITS: u32 = 12;
const TYPE_BITS: u32 = 8;
const BINDING_BITS: u32 = 8;
const KIND_BITS: u32 = 4;

const COUNT_SHIFT: u32 = OFFSET_BITS;
const TYPE_SHIFT: u32 = COUNT_SHIFT + COUNT_BITS;
const BINDING_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;
const KIND_SHIFT: u32 = BINDING_SHIFT + BINDING_BITS;

const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

pub const MAX_BINDING: u32 = mask(BINDING_BITS) as u32;
pub const MAX_COUNT: u32 = mask(COUNT_BITS) as u32;
pub const MAX_OFFSET: u32 = u32::MAX;

/// What a handle addresses.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// A member of a uniform block
    Buffer = 0,
    /// A sampler/texture slot
    Texture = 1,
}

impl PropertyKind {
    #[must_use]
    pub fn of(ty: UniformType) -> Self {
        if ty.is_texture() {
            Self::Texture
        } else {
            Self::Buffer
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct UniformHandle(u64);

impl UniformHandle {
    /// The sentinel returned by failed lookups.
    pub const INVALID: UniformHandle = UniformHandle(0);

    /// Packs a property address. The kind is derived from `ty`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for `UniformType::Unknown`, `HandleFieldOverflow` when
    /// `binding` or `count` do not fit (count must also be non-zero).
    pub fn encode(ty: UniformType, binding: u32, offset: u32, count: u32) -> Result<Self> {
        if ty == UniformType::Unknown {
            return Err(StrataError::InvalidHandle(0));
        }
        if binding > MAX_BINDING {
            return Err(StrataError::HandleFieldOverflow {
                field: "binding",
                value: u64::from(binding),
                max: u64::from(MAX_BINDING),
            });
        }
        if count == 0 || count > MAX_COUNT {
            return Err(StrataError::HandleFieldOverflow {
                field: "count",
                value: u64::from(count),
                max: u64::from(MAX_COUNT),
            });
        }

        let kind = PropertyKind::of(ty) as u64;
        let raw = (kind << KIND_SHIFT)
            | (u64::from(binding) << BINDING_SHIFT)
            | (u64::from(ty as u8) << TYPE_SHIFT)
            | (u64::from(count) << COUNT_SHIFT)
            | u64::from(offset);
        Ok(Self(raw))
    }

    /// Reinterprets a raw value, e.g. one cached by a scripting host.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// `true` for anything but the sentinel with a known type.
    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.ty() != UniformType::Unknown
    }

    #[inline]
    #[must_use]
    pub fn ty(self) -> UniformType {
        UniformType::from_u8(((self.0 >> TYPE_SHIFT) & mask(TYPE_BITS)) as u8)
    }

    #[inline]
    #[must_use]
    pub fn binding(self) -> u32 {
        ((self.0 >> BINDING_SHIFT) & mask(BINDING_BITS)) as u32
    }

    #[inline]
    #[must_use]
    pub fn offset(self) -> u32 {
        (self.0 & mask(OFFSET_BITS)) as u32
    }

    #[inline]
    #[must_use]
    pub fn count(self) -> u32 {
        ((self.0 >> COUNT_SHIFT) & mask(COUNT_BITS)) as u32
    }

    #[inline]
    #[must_use]
    pub fn property_kind(self) -> PropertyKind {
        if (self.0 >> KIND_SHIFT) & mask(KIND_BITS) == PropertyKind::Texture as u64 {
            PropertyKind::Texture
        } else {
            PropertyKind::Buffer
        }
    }

    /// Same address reinterpreted as `ty`.
    ///
    /// # Errors
    ///
    /// Same as [`encode`](Self::encode).
    pub fn with_type(self, ty: UniformType) -> Result<Self> {
        Self::encode(ty, self.binding(), self.offset(), self.count())
    }
}

impl From<UniformHandle> for u64 {
    fn from(handle: UniformHandle) -> Self {
        handle.0
    }
}

// Free-function decoders for host bindings that only carry the raw integer.

#[must_use]
pub fn get_type_from_handle(handle: u64) -> UniformType {
    UniformHandle::from_raw(handle).ty()
}

#[must_use]
pub fn get_binding_from_handle(handle: u64) -> u32 {
    UniformHandle::from_raw(handle).binding()
}

#[must_use]
pub fn get_offset_from_handle(handle: u64) -> u32 {
    UniformHandle::from_raw(handle).offset()
}

#[must_use]
pub fn get_count_from_handle(handle: u64) -> u32 {
    UniformHandle::from_raw(handle).count()
}

#[must_use]
pub fn get_property_type_from_handle(handle: u64) -> PropertyKind {
    UniformHandle::from_raw(handle).property_kind()
}
