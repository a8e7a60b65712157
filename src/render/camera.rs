use glam::{Affine3A, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::render::bounds::Aabb;
use crate::render::render_scene::SceneMember;
use crate::scene::{NodeHandle, SceneGraph};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

/// Creation parameters of a [`Camera`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraInfo {
    pub name: String,
    pub projection: ProjectionType,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Half height of the orthographic view volume
    pub ortho_size: f32,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            name: "Camera".to_string(),
            projection: ProjectionType::Perspective,
            fov: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            ortho_size: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub uuid: Uuid,
    pub name: String,

    // === Projection ===
    pub projection_type: ProjectionType,
    /// Radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub ortho_size: f32,

    node: Option<NodeHandle>,
    scene: Option<u32>,
    initialized: bool,

    // Cached matrices, read-only for the renderer
    pub(crate) world_matrix: Affine3A,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
    pub(crate) frustum: Frustum,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// An uninitialized camera; call [`initialize`](Self::initialize) before
    /// use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            projection_type: ProjectionType::Perspective,
            fov: 60f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
            ortho_size: 10.0,
            node: None,
            scene: None,
            initialized: false,
            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            frustum: Frustum::default(),
        }
    }

    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::new();
        let info = CameraInfo {
            fov,
            aspect,
            near,
            far,
            ..CameraInfo::default()
        };
        if !camera.initialize(&info) {
            log::warn!("Perspective camera created with invalid parameters");
        }
        camera
    }

    /// Applies `info`. Returns `false` and leaves the camera untouched when
    /// the parameters cannot form a projection.
    pub fn initialize(&mut self, info: &CameraInfo) -> bool {
        let valid_depth = info.near > 0.0 && info.far > info.near;
        let valid_shape = match info.projection {
            ProjectionType::Perspective => info.fov > 0.0 && info.fov < 180.0,
            ProjectionType::Orthographic => info.ortho_size > 0.0,
        };
        if !valid_depth || !valid_shape || info.aspect <= 0.0 || !info.aspect.is_finite() {
            log::error!("Camera `{}`: invalid camera info {info:?}", info.name);
            return false;
        }

        self.name.clone_from(&info.name);
        self.projection_type = info.projection;
        self.fov = info.fov.to_radians();
        self.aspect = info.aspect;
        self.near = info.near;
        self.far = info.far;
        self.ortho_size = info.ortho_size;
        self.initialized = true;
        self.update_projection_matrix();
        true
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_node(&mut self, node: Option<NodeHandle>) {
        self.node = node;
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect > 0.0 {
            self.aspect = aspect;
            self.update_projection_matrix();
        }
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection_type {
            // glam's *_rh projections target a [0, 1] depth range
            ProjectionType::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let w = self.ortho_size * self.aspect;
                let h = self.ortho_size;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        };

        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    pub fn update_view_projection(&mut self, world_transform: &Affine3A) {
        self.world_matrix = *world_transform;
        self.view_matrix = Mat4::from(*world_transform).inverse();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    /// Pulls the view transform from the bound node.
    pub fn update(&mut self, graph: &mut SceneGraph) {
        let Some(node) = self.node else {
            return;
        };
        match graph.world_matrix(node) {
            Some(world) => {
                if world != self.world_matrix {
                    self.update_view_projection(&world);
                }
            }
            None => {
                log::warn!("Camera `{}` is bound to a destroyed node", self.name);
                self.node = None;
            }
        }
    }

    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.world_matrix.translation)
    }
}

impl SceneMember for Camera {
    fn attach_to_scene(&mut self, scene: u32) {
        self.scene = Some(scene);
    }

    fn detach_from_scene(&mut self) {
        self.scene = None;
    }

    fn scene_id(&self) -> Option<u32> {
        self.scene
    }
}

/// View frustum as six inward-facing planes: left, right, bottom, top, near,
/// far.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann plane extraction for a [0, 1] depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];
        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }

    /// Conservative box test: rejects only boxes fully outside one plane.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        self.planes.iter().all(|p| {
            let normal = p.truncate();
            // corner furthest along the plane normal
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            normal.dot(positive) + p.w >= 0.0
        })
    }
}
