//! Render scene
//!
//! Everything a frame needs besides the node hierarchy:
//! - [`RenderScene`]: registry of models, cameras, lights and batches
//! - [`Model`], [`Camera`], [`Light`], [`DrawBatch2D`]: scene members that
//!   pull their world transforms from a [`SceneGraph`](crate::scene::SceneGraph)
//! - [`Environment`]: ambient, fog and skybox parameters

pub mod batch;
pub mod bounds;
pub mod camera;
pub mod environment;
pub mod light;
pub mod model;
pub mod render_scene;

pub use batch::DrawBatch2D;
pub use bounds::Aabb;
pub use camera::{Camera, CameraInfo, Frustum, ProjectionType};
pub use environment::{Environment, EnvironmentUniforms, Fog, FogMode, Skybox};
pub use light::{DirectionalLight, Light, LightKind, SphereLight, SpotLight};
pub use model::{Model, ModelUniforms};
pub use render_scene::{
    RenderScene, RenderSceneInfo, SceneMember, SceneState, SharedBatch, SharedCamera,
    SharedLight, SharedModel,
};
