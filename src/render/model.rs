use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Mat3, Mat4, Vec4};

use crate::device::GraphicsDevice;
use crate::render::bounds::Aabb;
use crate::render::render_scene::SceneMember;
use crate::resources::Pass;
use crate::scene::{NodeHandle, SceneGraph};

/// Per-model uniform block (std140).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUniforms {
    pub world_matrix: Mat4,
    pub world_matrix_inverse: Mat4,
    /// Inverse-transpose of the upper 3x3, columns padded to vec4
    pub normal_matrix: [Vec4; 3],
}

impl Default for ModelUniforms {
    fn default() -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            world_matrix_inverse: Mat4::IDENTITY,
            normal_matrix: [Vec4::X, Vec4::Y, Vec4::Z],
        }
    }
}

impl ModelUniforms {
    #[must_use]
    pub fn from_world(world: &Affine3A) -> Self {
        let world_matrix = Mat4::from(*world);
        let normal = Mat3::from(world.matrix3).inverse().transpose();
        Self {
            world_matrix,
            world_matrix_inverse: world_matrix.inverse(),
            normal_matrix: [
                normal.x_axis.extend(0.0),
                normal.y_axis.extend(0.0),
                normal.z_axis.extend(0.0),
            ],
        }
    }
}

/// A renderable instance: a node binding, bounds and the passes that draw it.
#[derive(Debug)]
pub struct Model {
    pub name: String,
    /// Assigned by [`RenderScene::add_model`](crate::render::RenderScene::add_model); 0 until then.
    pub(crate) id: u64,
    pub enabled: bool,
    /// Layer mask matched against a camera's culling mask
    pub visibility: u32,

    node: Option<NodeHandle>,
    scene: Option<u32>,

    local_bounds: Aabb,
    world_bounds: Aabb,

    passes: Vec<Pass>,

    uniforms: ModelUniforms,
    uniforms_dirty: bool,
    /// Node world version the cached state was built from
    seen_world_version: Option<u64>,
    transform_updated_stamp: u64,
}

impl Model {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: 0,
            enabled: true,
            visibility: u32::MAX,
            node: None,
            scene: None,
            local_bounds: Aabb::EMPTY,
            world_bounds: Aabb::EMPTY,
            passes: Vec::new(),
            uniforms: ModelUniforms::default(),
            uniforms_dirty: true,
            seen_world_version: None,
            transform_updated_stamp: 0,
        }
    }

    #[must_use]
    pub fn with_node(name: &str, node: NodeHandle) -> Self {
        let mut model = Self::new(name);
        model.node = Some(node);
        model
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_node(&mut self, node: Option<NodeHandle>) {
        self.node = node;
        self.seen_world_version = None;
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn set_local_bounds(&mut self, bounds: Aabb) {
        self.local_bounds = bounds;
        self.seen_world_version = None;
    }

    #[must_use]
    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }

    #[must_use]
    pub fn world_bounds(&self) -> &Aabb {
        &self.world_bounds
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    #[must_use]
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn passes_mut(&mut self) -> &mut [Pass] {
        &mut self.passes
    }

    #[must_use]
    pub fn uniforms(&self) -> &ModelUniforms {
        &self.uniforms
    }

    /// Frame stamp of the last update that saw a new world transform.
    #[must_use]
    pub fn transform_updated_stamp(&self) -> u64 {
        self.transform_updated_stamp
    }

    /// Pulls the node's resolved world matrix. Returns `true` if the world
    /// transform changed since the last call.
    pub fn update_transform(&mut self, graph: &mut SceneGraph, stamp: u64) -> bool {
        let Some(node) = self.node else {
            return false;
        };
        let Some(world) = graph.world_matrix(node) else {
            log::warn!("Model `{}` is bound to a destroyed node", self.name);
            self.node = None;
            return false;
        };
        let version = graph.world_version(node);
        if version.is_some() && version == self.seen_world_version {
            return false;
        }

        self.seen_world_version = version;
        self.world_bounds = self.local_bounds.transform(&world);
        self.uniforms = ModelUniforms::from_world(&world);
        self.uniforms_dirty = true;
        self.transform_updated_stamp = stamp;
        true
    }

    /// Publishes the model uniforms to every pass that declares them.
    /// Returns `true` if anything was written.
    pub fn update_ubos(&mut self, stamp: u64) -> bool {
        if !self.uniforms_dirty {
            return false;
        }
        let normal = Mat3::from_cols(
            self.uniforms.normal_matrix[0].truncate(),
            self.uniforms.normal_matrix[1].truncate(),
            self.uniforms.normal_matrix[2].truncate(),
        );
        for pass in &mut self.passes {
            if pass.has_property("worldMatrix") {
                let handle = pass.get_handle("worldMatrix");
                pass.set_uniform(handle, self.uniforms.world_matrix);
            }
            if pass.has_property("worldMatrixInverse") {
                let handle = pass.get_handle("worldMatrixInverse");
                pass.set_uniform(handle, self.uniforms.world_matrix_inverse);
            }
            if pass.has_property("normalMatrix") {
                let handle = pass.get_handle("normalMatrix");
                pass.set_uniform(handle, normal);
            }
        }
        self.uniforms_dirty = false;
        log::trace!("Model {} uniforms published at frame {stamp}", self.id);
        true
    }

    /// Uploads every pass's staged data. Returns `false` if a pass could not
    /// allocate its buffer.
    pub fn flush_passes(&mut self, device: &mut dyn GraphicsDevice) -> bool {
        let mut ok = true;
        for pass in &mut self.passes {
            if pass.initialize(device) {
                pass.update(device);
            } else {
                ok = false;
            }
        }
        ok
    }

    pub fn on_global_pipeline_state_changed(&mut self) {
        for pass in &mut self.passes {
            pass.on_global_pipeline_state_changed();
        }
    }
}

impl SceneMember for Model {
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
