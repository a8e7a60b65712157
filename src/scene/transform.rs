use bitflags::bitflags;
use glam::{Affine3A, EulerRot, Mat3, Quat, Vec3};

bitflags! {
    /// Aspects of a node's cached world-space state.
    ///
    /// Used both as the dirty mask (what must be recomputed) and as the
    /// changed mask (what external observers should know changed this frame).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TransformBit: u32 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const SCALE    = 1 << 2;
        const RS       = Self::ROTATION.bits() | Self::SCALE.bits();
        const TRS      = Self::POSITION.bits() | Self::RS.bits();
    }
}

impl TransformBit {
    /// Bits a descendant receives when an ancestor is invalidated with `self`.
    ///
    /// Rotating or scaling a parent moves every child in world space, so
    /// rotation and scale also invalidate descendants' world position.
    #[inline]
    #[must_use]
    pub fn descendant_bits(self) -> Self {
        if self.intersects(Self::RS) {
            self | Self::POSITION
        } else {
            self
        }
    }
}

/// World-space state of a parent, as needed to compose a child.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParentWorld {
    pub matrix: Affine3A,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// Transform component
///
/// Local position, rotation (with a cached Euler-angle view) and scale, plus
/// the world-space values derived from them. The world values are only
/// meaningful while the owning node carries no dirty bit; every mutation goes
/// through [`SceneGraph`](crate::scene::SceneGraph) so that invalidation is
/// never skipped.
#[derive(Debug, Clone)]
pub struct Transform {
    // === Local state ===
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    /// XYZ Euler angles in radians, kept in sync with `rotation`
    pub(crate) euler: Vec3,

    // === World cache ===
    pub(crate) world_matrix: Affine3A,
    pub(crate) world_position: Vec3,
    pub(crate) world_rotation: Quat,
    pub(crate) world_scale: Vec3,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            euler: Vec3::ZERO,

            world_matrix: Affine3A::IDENTITY,
            world_position: Vec3::ZERO,
            world_rotation: Quat::IDENTITY,
            world_scale: Vec3::ONE,
        }
    }

    // ========================================================================
    // Local state
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local rotation as XYZ Euler angles (radians).
    #[inline]
    #[must_use]
    pub fn euler_angles(&self) -> Vec3 {
        self.euler
    }

    /// Local TRS composed into a matrix.
    #[must_use]
    pub fn local_matrix(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub(crate) fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        self.euler = Vec3::new(x, y, z);
    }

    pub(crate) fn set_rotation_from_euler(&mut self, euler: Vec3) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.euler = euler;
    }

    pub(crate) fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    /// Replaces the local TRS with the decomposition of `mat`.
    ///
    /// Shear cannot be represented and is lost.
    pub(crate) fn set_local_matrix(&mut self, mat: Affine3A) {
        let (scale, rotation, translation) = mat.to_scale_rotation_translation();
        self.position = translation;
        self.set_rotation(rotation);
        self.scale = scale;
    }

    /// Rotation that makes -Z point from `position` towards `target`.
    ///
    /// Both points and `up` live in the parent's space. Returns `None` when
    /// the view direction is (almost) collinear with `up`.
    #[must_use]
    pub fn look_at_rotation(position: Vec3, target: Vec3, up: Vec3) -> Option<Quat> {
        let forward = (target - position).normalize_or_zero();
        if forward.cross(up).length_squared() < 1e-4 {
            return None;
        }

        let right = forward.cross(up).normalize();
        let new_up = right.cross(forward).normalize();

        let rot_mat = Mat3::from_cols(right, new_up, -forward);
        Some(Quat::from_mat3(&rot_mat))
    }

    // ========================================================================
    // World cache
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }

    #[inline]
    #[must_use]
    pub fn world_rotation(&self) -> Quat {
        self.world_rotation
    }

    #[inline]
    #[must_use]
    pub fn world_scale(&self) -> Vec3 {
        self.world_scale
    }

    pub(crate) fn world_state(&self) -> ParentWorld {
        ParentWorld {
            matrix: self.world_matrix,
            rotation: self.world_rotation,
            scale: self.world_scale,
        }
    }

    /// Recomputes the world cache from the local state and the parent's
    /// resolved world state (`None` for roots).
    pub(crate) fn compose_world(&mut self, parent: Option<ParentWorld>) {
        let local = self.local_matrix();
        match parent {
            Some(parent) => {
                self.world_matrix = parent.matrix * local;
                self.world_rotation = (parent.rotation * self.rotation).normalize();
                self.world_scale = parent.scale * self.scale;
            }
            None => {
                self.world_matrix = local;
                self.world_rotation = self.rotation;
                self.world_scale = self.scale;
            }
        }
        self.world_position = Vec3::from(self.world_matrix.translation);
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
