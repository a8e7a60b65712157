#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod device;
pub mod errors;
pub mod render;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;

pub use device::{BufferId, GraphicsDevice, TextureBinding, TextureId};
pub use errors::{Result, StrataError};
pub use render::{
    Aabb, Camera, CameraInfo, DrawBatch2D, Environment, Light, LightKind, Model, RenderScene,
    RenderSceneInfo, SceneMember, SceneState,
};
pub use resources::{Pass, PropertyKind, ShaderReflection, UniformHandle, UniformType};
pub use scene::{DirtyQueue, Node, NodeHandle, SceneGraph, Transform, TransformBit};
pub use settings::SceneSettings;
