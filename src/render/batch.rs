use glam::Vec2;

use crate::device::TextureId;
use crate::render::render_scene::SceneMember;
use crate::scene::{NodeHandle, SceneGraph};

/// A batch of screen-space quads sharing one texture.
#[derive(Debug, Clone)]
pub struct DrawBatch2D {
    pub name: String,
    pub visibility: u32,
    pub texture: Option<TextureId>,
    /// Quad rectangles as (min, max) pairs in batch space
    pub quads: Vec<(Vec2, Vec2)>,

    node: Option<NodeHandle>,
    scene: Option<u32>,
    seen_world_version: Option<u64>,
}

impl DrawBatch2D {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visibility: u32::MAX,
            texture: None,
            quads: Vec::new(),
            node: None,
            scene: None,
            seen_world_version: None,
        }
    }

    pub fn set_node(&mut self, node: Option<NodeHandle>) {
        self.node = node;
        self.seen_world_version = None;
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    /// `true` if the bound node's world transform changed since the last call.
    pub fn update(&mut self, graph: &mut SceneGraph) -> bool {
        let Some(node) = self.node else {
            return false;
        };
        graph.update_world_transform(node);
        let version = graph.world_version(node);
        if version.is_none() {
            self.node = None;
            return false;
        }
        let changed = version != self.seen_world_version;
        self.seen_world_version = version;
        changed
    }
}

impl SceneMember for DrawBatch2D {
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
