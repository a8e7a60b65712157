use bytemuck::Pod;
use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

// ============================================================================
// 1. Uniform types
// ============================================================================

/// Declared type of a shader property.
///
/// The discriminant is what a [`UniformHandle`](super::UniformHandle) stores in
/// its type field, so `Unknown` (0) never appears in a valid handle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UniformType {
    #[default]
    Unknown = 0,
    Bool,
    Int,
    Int2,
    Int3,
    Int4,
    Uint,
    Uint2,
    Uint3,
    Uint4,
    Float,
    Float2,
    Float3,
    Float4,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
    Texture2D,
    TextureCube,
}

impl UniformType {
    const ALL: [UniformType; 20] = [
        Self::Unknown,
        Self::Bool,
        Self::Int,
        Self::Int2,
        Self::Int3,
        Self::Int4,
        Self::Uint,
        Self::Uint2,
        Self::Uint3,
        Self::Uint4,
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Mat3,
        Self::Mat4,
        Self::Sampler2D,
        Self::SamplerCube,
        Self::Texture2D,
        Self::TextureCube,
    ];

    /// Inverse of `as u8`. Unassigned values decode to `Unknown`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(Self::Unknown)
    }

    #[inline]
    #[must_use]
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            Self::Sampler2D | Self::SamplerCube | Self::Texture2D | Self::TextureCube
        )
    }

    /// Bytes occupied by one element in a std140 block (0 for textures).
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Int2 | Self::Uint2 | Self::Float2 => 8,
            Self::Int3 | Self::Uint3 | Self::Float3 => 12,
            Self::Int4 | Self::Uint4 | Self::Float4 => 16,
            // three vec4-padded columns
            Self::Mat3 => 48,
            Self::Mat4 => 64,
            Self::Unknown
            | Self::Sampler2D
            | Self::SamplerCube
            | Self::Texture2D
            | Self::TextureCube => 0,
        }
    }

    /// std140 base alignment of a single (non-array) member.
    #[must_use]
    pub fn alignment(self) -> usize {
        match self {
            Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Int2 | Self::Uint2 | Self::Float2 => 8,
            Self::Int3
            | Self::Uint3
            | Self::Float3
            | Self::Int4
            | Self::Uint4
            | Self::Float4
            | Self::Mat3
            | Self::Mat4 => 16,
            _ => 1,
        }
    }

    /// Distance between consecutive array elements. std140 rounds every
    /// array element up to a vec4. Texture arrays step by one element index.
    #[must_use]
    pub fn array_stride(self) -> usize {
        if self.is_texture() || self == Self::Unknown {
            return 1;
        }
        self.size().next_multiple_of(16)
    }
}

// ============================================================================
// 2. Host values
// ============================================================================

/// A host value that can be written into a uniform block.
pub trait UniformValue: Sized {
    /// Type a handle must carry to accept this value.
    const TYPE: UniformType;

    /// Writes the std140 representation into the start of `dst`.
    /// `dst` holds at least `Self::TYPE.size()` bytes.
    fn write_bytes(&self, dst: &mut [u8]);

    /// Reads a value back from its std140 representation.
    fn read_bytes(src: &[u8]) -> Self;
}

fn write_pod<T: Pod>(value: &T, dst: &mut [u8]) {
    let src = bytemuck::bytes_of(value);
    dst[..src.len()].copy_from_slice(src);
}

fn read_pod<T: Pod>(src: &[u8]) -> T {
    bytemuck::pod_read_unaligned(&src[..std::mem::size_of::<T>()])
}

macro_rules! impl_pod_uniform {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl UniformValue for $ty {
                const TYPE: UniformType = UniformType::$kind;

                fn write_bytes(&self, dst: &mut [u8]) {
                    write_pod(self, dst);
                }

                fn read_bytes(src: &[u8]) -> Self {
                    read_pod(src)
                }
            }
        )*
    };
}

impl_pod_uniform! {
    i32 => Int,
    IVec2 => Int2,
    IVec3 => Int3,
    IVec4 => Int4,
    u32 => Uint,
    UVec2 => Uint2,
    UVec3 => Uint3,
    UVec4 => Uint4,
    f32 => Float,
    Vec2 => Float2,
    Vec3 => Float3,
    Vec4 => Float4,
    Mat4 => Mat4,
}

impl UniformValue for bool {
    const TYPE: UniformType = UniformType::Bool;

    fn write_bytes(&self, dst: &mut [u8]) {
        write_pod(&u32::from(*self), dst);
    }

    fn read_bytes(src: &[u8]) -> Self {
        read_pod::<u32>(src) != 0
    }
}

impl UniformValue for Mat3 {
    const TYPE: UniformType = UniformType::Mat3;

    fn write_bytes(&self, dst: &mut [u8]) {
        let columns = [
            self.x_axis.extend(0.0),
            self.y_axis.extend(0.0),
            self.z_axis.extend(0.0),
        ];
        write_pod(&columns, dst);
    }

    fn read_bytes(src: &[u8]) -> Self {
        let [x, y, z] = read_pod::<[Vec4; 3]>(src);
        Mat3::from_cols(x.truncate(), y.truncate(), z.truncate())
    }
}

// ============================================================================
// 3. Reflection descriptors
// ============================================================================

/// One member of a uniform block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMember {
    pub name: String,
    pub ty: UniformType,
    /// Number of array elements (1 for a plain member).
    pub count: u32,
    /// Byte offset inside the block.
    pub offset: u32,
}

impl BlockMember {
    /// Bytes from the member's offset to the end of its last element.
    #[must_use]
    pub fn extent(&self) -> usize {
        if self.count <= 1 {
            self.ty.size()
        } else {
            self.ty.array_stride() * (self.count as usize - 1) + self.ty.size()
        }
    }
}

/// A reflected uniform block bound at `binding`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformBlockDesc {
    pub name: String,
    pub binding: u32,
    pub members: Vec<BlockMember>,
    /// Total size in bytes.
    pub size: u32,
}

impl UniformBlockDesc {
    /// Starts a block whose member offsets follow std140 packing.
    #[must_use]
    pub fn std140(name: &str, binding: u32) -> UniformBlockBuilder {
        UniformBlockBuilder {
            desc: UniformBlockDesc {
                name: name.to_string(),
                binding,
                members: Vec::new(),
                size: 0,
            },
            cursor: 0,
        }
    }
}

/// Builder returned by [`UniformBlockDesc::std140`].
pub struct UniformBlockBuilder {
    desc: UniformBlockDesc,
    cursor: usize,
}

impl UniformBlockBuilder {
    #[must_use]
    pub fn member(self, name: &str, ty: UniformType) -> Self {
        self.push(name, ty, 1)
    }

    #[must_use]
    pub fn array(self, name: &str, ty: UniformType, count: u32) -> Self {
        self.push(name, ty, count.max(1))
    }

    fn push(mut self, name: &str, ty: UniformType, count: u32) -> Self {
        let align = if count > 1 { 16 } else { ty.alignment() };
        let offset = self.cursor.next_multiple_of(align);
        let member = BlockMember {
            name: name.to_string(),
            ty,
            count,
            offset: offset as u32,
        };
        self.cursor = offset + member.extent();
        self.desc.members.push(member);
        self
    }

    #[must_use]
    pub fn build(mut self) -> UniformBlockDesc {
        self.desc.size = self.cursor.next_multiple_of(16) as u32;
        self.desc
    }
}

/// A reflected sampler or texture binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerDesc {
    pub name: String,
    pub binding: u32,
    pub ty: UniformType,
    pub count: u32,
}

/// Everything a [`Pass`](super::Pass) needs to know about its shader's
/// resource interface, as produced by the shader toolchain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderReflection {
    pub blocks: Vec<UniformBlockDesc>,
    pub samplers: Vec<SamplerDesc>,
}

impl ShaderReflection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_block(mut self, block: UniformBlockDesc) -> Self {
        self.blocks.push(block);
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, name: &str, binding: u32, ty: UniformType, count: u32) -> Self {
        self.samplers.push(SamplerDesc {
            name: name.to_string(),
            binding,
            ty,
            count: count.max(1),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_offsets() {
        let block = UniformBlockDesc::std140("Material", 0)
            .member("time", UniformType::Float)
            .member("mainColor", UniformType::Float4)
            .member("tint", UniformType::Float3)
            .member("strength", UniformType::Float)
            .array("weights", UniformType::Float, 4)
            .member("uvTransform", UniformType::Mat3)
            .build();

        let offsets: Vec<u32> = block.members.iter().map(|m| m.offset).collect();
        // vec3 followed by a scalar shares the 16-byte slot
        assert_eq!(offsets, vec![0, 16, 32, 44, 48, 112]);
        assert_eq!(block.size, 160);
    }

    #[test]
    fn type_discriminant_round_trip() {
        for ty in UniformType::ALL {
            assert_eq!(UniformType::from_u8(ty as u8), ty);
        }
        assert_eq!(UniformType::from_u8(200), UniformType::Unknown);
    }

    #[test]
    fn mat3_is_column_padded() {
        let m = Mat3::from_cols(Vec3::X, Vec3::Y * 2.0, Vec3::Z * 3.0);
        let mut bytes = [0u8; 48];
        m.write_bytes(&mut bytes);

        let floats: [f32; 12] = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(floats[4..8], [0.0, 2.0, 0.0, 0.0]);
        assert_eq!(Mat3::read_bytes(&bytes), m);
    }
}
