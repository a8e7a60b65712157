//! Render scene registry
//!
//! A [`RenderScene`] is the list of everything renderable for one logical
//! scene: models, cameras, the three light kinds and 2D batches, plus the
//! designated main light and the scene-wide [`Environment`].
//!
//! Members are shared with whoever created them (`Rc<RefCell<T>>`); the scene
//! only registers and unregisters them. Identity is pointer identity.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize(ok)--> Active --destroy()--> Destroyed
//!       ^   |
//!       +---+ initialize(fails)
//! ```
//!
//! Every operation other than `initialize` logs an error and does nothing
//! unless the scene is `Active`.
//!
//! # Frame
//!
//! [`RenderScene::update`] resolves the graph and leaves its changed flags
//! set so observers can still read them. The frame is only closed by
//! [`SceneGraph::end_frame`]; without it the dirty table keeps growing.
//! [`RenderScene::update_and_end_frame`] does both when nothing else needs
//! the flags.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StrataError};
use crate::render::batch::DrawBatch2D;
use crate::render::camera::Camera;
use crate::render::environment::{Environment, EnvironmentUniforms};
use crate::render::light::{Light, LightKind};
use crate::render::model::Model;
use crate::resources::version_tracker::{ChangeTracker, MutGuard};
use crate::scene::SceneGraph;
use crate::utils::interner;

static NEXT_SCENE_ID: AtomicU32 = AtomicU32::new(1);

/// Capability shared by everything a [`RenderScene`] can register.
pub trait SceneMember {
    fn attach_to_scene(&mut self, scene: u32);
    fn detach_from_scene(&mut self);
    /// Id of the scene the member is registered with.
    fn scene_id(&self) -> Option<u32>;
}

pub type SharedModel = Rc<RefCell<Model>>;
pub type SharedCamera = Rc<RefCell<Camera>>;
pub type SharedLight = Rc<RefCell<Light>>;
pub type SharedBatch = Rc<RefCell<DrawBatch2D>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Uninitialized,
    Active,
    Destroyed,
}

/// Creation parameters of a [`RenderScene`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSceneInfo {
    pub name: String,
    pub environment: Environment,
}

impl Default for RenderSceneInfo {
    fn default() -> Self {
        Self {
            name: "Scene".to_string(),
            environment: Environment::default(),
        }
    }
}

impl RenderSceneInfo {
    /// # Errors
    ///
    /// `InvalidSceneInfo` for an empty name or an inconsistent environment.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StrataError::InvalidSceneInfo(
                "scene name must not be empty".to_string(),
            ));
        }
        self.environment.validate()
    }

    /// # Errors
    ///
    /// JSON errors and validation errors.
    pub fn from_json(json: &str) -> Result<Self> {
        let info: Self = serde_json::from_str(json)?;
        info.validate()?;
        Ok(info)
    }
}

// Registry helpers shared by every member list.

fn attach<T: SceneMember>(item: &Rc<RefCell<T>>, scene: u32) {
    match item.try_borrow_mut() {
        Ok(mut member) => member.attach_to_scene(scene),
        Err(_) => log::warn!("Scene {scene}: member is borrowed, scene link not recorded"),
    }
}

fn detach<T: SceneMember>(item: &Rc<RefCell<T>>) {
    match item.try_borrow_mut() {
        Ok(mut member) => member.detach_from_scene(),
        Err(_) => log::warn!("Member is borrowed, scene link not cleared"),
    }
}

fn remove_shared<T: SceneMember>(list: &mut Vec<Rc<RefCell<T>>>, item: &Rc<RefCell<T>>) -> bool {
    let Some(index) = list.iter().position(|x| Rc::ptr_eq(x, item)) else {
        return false;
    };
    detach(&list.swap_remove(index));
    true
}

fn remove_shared_at<T: SceneMember>(
    list: &mut Vec<Rc<RefCell<T>>>,
    index: usize,
) -> Option<Rc<RefCell<T>>> {
    if index >= list.len() {
        log::warn!("Remove index {index} out of range ({} entries)", list.len());
        return None;
    }
    let removed = list.swap_remove(index);
    detach(&removed);
    Some(removed)
}

fn clear_shared<T: SceneMember>(list: &mut Vec<Rc<RefCell<T>>>) {
    for item in list.drain(..) {
        detach(&item);
    }
}

#[derive(Clone, Copy)]
enum LightList {
    Directional,
    Sphere,
    Spot,
}

impl LightList {
    fn add_op(self) -> &'static str {
        match self {
            Self::Directional => "add_directional_light",
            Self::Sphere => "add_sphere_light",
            Self::Spot => "add_spot_light",
        }
    }

    fn accepts(self, kind: &LightKind) -> bool {
        matches!(
            (self, kind),
            (Self::Directional, LightKind::Directional(_))
                | (Self::Sphere, LightKind::Sphere(_))
                | (Self::Spot, LightKind::Spot(_))
        )
    }
}

pub struct RenderScene {
    id: u32,
    name: String,
    state: SceneState,

    next_model_id: u64,

    models: Vec<SharedModel>,
    cameras: Vec<SharedCamera>,
    directional_lights: Vec<SharedLight>,
    sphere_lights: Vec<SharedLight>,
    spot_lights: Vec<SharedLight>,
    batches: Vec<SharedBatch>,

    main_light: Option<SharedLight>,

    environment: Environment,
    environment_version: ChangeTracker,
    synced_environment_version: Option<u64>,
    environment_uniforms: EnvironmentUniforms,

    last_stamp: u64,
}

impl Default for RenderScene {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed),
            name: String::new(),
            state: SceneState::Uninitialized,
            next_model_id: 1,
            models: Vec::new(),
            cameras: Vec::new(),
            directional_lights: Vec::new(),
            sphere_lights: Vec::new(),
            spot_lights: Vec::new(),
            batches: Vec::new(),
            main_light: None,
            environment: Environment::default(),
            environment_version: ChangeTracker::new(),
            synced_environment_version: None,
            environment_uniforms: EnvironmentUniforms::default(),
            last_stamp: 0,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validates `info` and activates the scene. On failure the scene stays
    /// uninitialized and can be initialized again.
    pub fn initialize(&mut self, info: &RenderSceneInfo) -> bool {
        match self.state {
            SceneState::Active => {
                log::warn!("Render scene `{}` is already initialized", self.name);
                return false;
            }
            SceneState::Destroyed => {
                log::error!("Cannot initialize a destroyed render scene");
                return false;
            }
            SceneState::Uninitialized => {}
        }

        if let Err(e) = info.validate() {
            log::error!("Render scene initialization failed: {e}");
            return false;
        }

        interner::preload_common_properties();

        self.name.clone_from(&info.name);
        self.environment = info.environment.clone();
        self.environment_version.changed();
        self.state = SceneState::Active;
        log::info!("Render scene `{}` ({}) initialized", self.name, self.id);
        true
    }

    /// Unregisters every member and moves the scene to `Destroyed`.
    pub fn destroy(&mut self) {
        if self.state == SceneState::Destroyed {
            log::warn!("Render scene `{}` destroyed twice", self.name);
            return;
        }
        clear_shared(&mut self.models);
        clear_shared(&mut self.cameras);
        clear_shared(&mut self.directional_lights);
        clear_shared(&mut self.sphere_lights);
        clear_shared(&mut self.spot_lights);
        clear_shared(&mut self.batches);
        self.main_light = None;
        self.state = SceneState::Destroyed;
        log::info!("Render scene `{}` ({}) destroyed", self.name, self.id);
    }

    fn ensure_active(&self, op: &str) -> bool {
        if self.state == SceneState::Active {
            return true;
        }
        log::error!(
            "RenderScene::{op} called on a {:?} scene `{}`",
            self.state,
            self.name
        );
        false
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> SceneState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SceneState::Active
    }

    /// Stamp passed to the last [`update`](Self::update).
    #[must_use]
    pub fn last_stamp(&self) -> u64 {
        self.last_stamp
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Issues a new model id. Ids start at 1, increase strictly and are
    /// never reused by this scene. Returns 0 if the scene is not active.
    pub fn generate_model_id(&mut self) -> u64 {
        if !self.ensure_active("generate_model_id") {
            return 0;
        }
        let id = self.next_model_id;
        self.next_model_id += 1;
        id
    }

    /// Registers `model` and assigns it a fresh id.
    pub fn add_model(&mut self, model: &SharedModel) {
        if !self.ensure_active("add_model") {
            return;
        }
        let id = self.generate_model_id();
        match model.try_borrow_mut() {
            Ok(mut m) => {
                m.id = id;
                m.attach_to_scene(self.id);
            }
            Err(_) => {
                log::warn!("Scene `{}`: model is borrowed, not added", self.name);
                return;
            }
        }
        self.models.push(Rc::clone(model));
    }

    /// Unregisters `model`. Returns `false` if it was not registered.
    pub fn remove_model(&mut self, model: &SharedModel) -> bool {
        self.ensure_active("remove_model") && remove_shared(&mut self.models, model)
    }

    pub fn remove_model_at(&mut self, index: usize) -> Option<SharedModel> {
        if !self.ensure_active("remove_model_at") {
            return None;
        }
        remove_shared_at(&mut self.models, index)
    }

    pub fn remove_models(&mut self) {
        if self.ensure_active("remove_models") {
            clear_shared(&mut self.models);
        }
    }

    #[must_use]
    pub fn models(&self) -> &[SharedModel] {
        &self.models
    }

    // ========================================================================
    // Cameras
    // ========================================================================

    pub fn add_camera(&mut self, camera: &SharedCamera) {
        if !self.ensure_active("add_camera") {
            return;
        }
        attach(camera, self.id);
        self.cameras.push(Rc::clone(camera));
    }

    pub fn remove_camera(&mut self, camera: &SharedCamera) -> bool {
        self.ensure_active("remove_camera") && remove_shared(&mut self.cameras, camera)
    }

    pub fn remove_camera_at(&mut self, index: usize) -> Option<SharedCamera> {
        if !self.ensure_active("remove_camera_at") {
            return None;
        }
        remove_shared_at(&mut self.cameras, index)
    }

    pub fn remove_cameras(&mut self) {
        if self.ensure_active("remove_cameras") {
            clear_shared(&mut self.cameras);
        }
    }

    #[must_use]
    pub fn cameras(&self) -> &[SharedCamera] {
        &self.cameras
    }

    // ========================================================================
    // Lights
    // ========================================================================

    fn add_light(&mut self, light: &SharedLight, list: LightList) -> bool {
        if !self.ensure_active(list.add_op()) {
            return false;
        }
        if !light.try_borrow().is_ok_and(|l| list.accepts(&l.kind)) {
            log::warn!(
                "RenderScene::{}: light has the wrong kind (or is borrowed)",
                list.add_op()
            );
            return false;
        }
        attach(light, self.id);
        let lights = match list {
            LightList::Directional => &mut self.directional_lights,
            LightList::Sphere => &mut self.sphere_lights,
            LightList::Spot => &mut self.spot_lights,
        };
        lights.push(Rc::clone(light));
        true
    }

    /// Registers a directional light. Returns `false` for other kinds.
    pub fn add_directional_light(&mut self, light: &SharedLight) -> bool {
        self.add_light(light, LightList::Directional)
    }

    pub fn add_sphere_light(&mut self, light: &SharedLight) -> bool {
        self.add_light(light, LightList::Sphere)
    }

    pub fn add_spot_light(&mut self, light: &SharedLight) -> bool {
        self.add_light(light, LightList::Spot)
    }

    pub fn remove_directional_light(&mut self, light: &SharedLight) -> bool {
        self.ensure_active("remove_directional_light")
            && remove_shared(&mut self.directional_lights, light)
    }

    pub fn remove_sphere_light(&mut self, light: &SharedLight) -> bool {
        self.ensure_active("remove_sphere_light") && remove_shared(&mut self.sphere_lights, light)
    }

    pub fn remove_spot_light(&mut self, light: &SharedLight) -> bool {
        self.ensure_active("remove_spot_light") && remove_shared(&mut self.spot_lights, light)
    }

    pub fn remove_directional_light_at(&mut self, index: usize) -> Option<SharedLight> {
        if !self.ensure_active("remove_directional_light_at") {
            return None;
        }
        remove_shared_at(&mut self.directional_lights, index)
    }

    pub fn remove_sphere_light_at(&mut self, index: usize) -> Option<SharedLight> {
        if !self.ensure_active("remove_sphere_light_at") {
            return None;
        }
        remove_shared_at(&mut self.sphere_lights, index)
    }

    pub fn remove_spot_light_at(&mut self, index: usize) -> Option<SharedLight> {
        if !self.ensure_active("remove_spot_light_at") {
            return None;
        }
        remove_shared_at(&mut self.spot_lights, index)
    }

    pub fn remove_directional_lights(&mut self) {
        if self.ensure_active("remove_directional_lights") {
            clear_shared(&mut self.directional_lights);
        }
    }

    pub fn remove_sphere_lights(&mut self) {
        if self.ensure_active("remove_sphere_lights") {
            clear_shared(&mut self.sphere_lights);
        }
    }

    pub fn remove_spot_lights(&mut self) {
        if self.ensure_active("remove_spot_lights") {
            clear_shared(&mut self.spot_lights);
        }
    }

    #[must_use]
    pub fn directional_lights(&self) -> &[SharedLight] {
        &self.directional_lights
    }

    #[must_use]
    pub fn sphere_lights(&self) -> &[SharedLight] {
        &self.sphere_lights
    }

    #[must_use]
    pub fn spot_lights(&self) -> &[SharedLight] {
        &self.spot_lights
    }

    /// Designates `light` as the main light. Membership is independent: the
    /// light does not have to be registered. Only directional lights qualify.
    pub fn set_main_light(&mut self, light: &SharedLight) -> bool {
        if !self.ensure_active("set_main_light") {
            return false;
        }
        if !light.try_borrow().is_ok_and(|l| l.is_directional()) {
            log::warn!("Scene `{}`: main light must be a directional light", self.name);
            return false;
        }
        self.main_light = Some(Rc::clone(light));
        true
    }

    /// Clears the main light only if it is `light`.
    pub fn unset_main_light(&mut self, light: &SharedLight) {
        if !self.ensure_active("unset_main_light") {
            return;
        }
        if self
            .main_light
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, light))
        {
            self.main_light = None;
        }
    }

    #[must_use]
    pub fn main_light(&self) -> Option<&SharedLight> {
        self.main_light.as_ref()
    }

    // ========================================================================
    // Batches
    // ========================================================================

    pub fn add_batch(&mut self, batch: &SharedBatch) {
        if !self.ensure_active("add_batch") {
            return;
        }
        attach(batch, self.id);
        self.batches.push(Rc::clone(batch));
    }

    pub fn remove_batch(&mut self, batch: &SharedBatch) -> bool {
        self.ensure_active("remove_batch") && remove_shared(&mut self.batches, batch)
    }

    pub fn remove_batch_at(&mut self, index: usize) -> Option<SharedBatch> {
        if !self.ensure_active("remove_batch_at") {
            return None;
        }
        remove_shared_at(&mut self.batches, index)
    }

    pub fn remove_batches(&mut self) {
        if self.ensure_active("remove_batches") {
            clear_shared(&mut self.batches);
        }
    }

    #[must_use]
    pub fn batches(&self) -> &[SharedBatch] {
        &self.batches
    }

    // ========================================================================
    // Environment
    // ========================================================================

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Mutable access; the uniforms are re-synced at the next update.
    pub fn environment_mut(&mut self) -> MutGuard<'_, Environment> {
        MutGuard::new(&mut self.environment, &mut self.environment_version)
    }

    /// Snapshot taken at the last update.
    #[must_use]
    pub fn environment_uniforms(&self) -> &EnvironmentUniforms {
        &self.environment_uniforms
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Frame-boundary update:
    /// 1. resolve the graph's dirty nodes
    /// 2. pull node transforms into lights, cameras, enabled models, batches
    /// 3. re-sync environment uniforms if the environment changed
    /// 4. flush deferred node destruction
    ///
    /// Changed flags are left for observers; call
    /// [`SceneGraph::end_frame`] once they have been read.
    pub fn update(&mut self, graph: &mut SceneGraph, stamp: u64) {
        if !self.ensure_active("update") {
            return;
        }

        let resolved = graph.resolve_dirty_nodes();

        for light in self
            .directional_lights
            .iter()
            .chain(&self.sphere_lights)
            .chain(&self.spot_lights)
        {
            if let Ok(mut light) = light.try_borrow_mut() {
                light.update(graph);
            }
        }

        for camera in &self.cameras {
            if let Ok(mut camera) = camera.try_borrow_mut() {
                camera.update(graph);
            }
        }

        let mut moved = 0usize;
        for model in &self.models {
            let Ok(mut model) = model.try_borrow_mut() else {
                continue;
            };
            if !model.enabled {
                continue;
            }
            if model.update_transform(graph, stamp) {
                moved += 1;
            }
            model.update_ubos(stamp);
        }

        for batch in &self.batches {
            if let Ok(mut batch) = batch.try_borrow_mut() {
                batch.update(graph);
            }
        }

        if self
            .environment_version
            .is_newer_than(self.synced_environment_version)
        {
            self.environment_uniforms = EnvironmentUniforms::from(&self.environment);
            self.synced_environment_version = Some(self.environment_version.version());
        }

        let destroyed = graph.deferred_destroy();
        self.last_stamp = stamp;

        log::debug!(
            "Scene `{}` frame {stamp}: {resolved} nodes resolved, {moved} models moved, {destroyed} subtrees destroyed",
            self.name
        );
    }

    /// [`update`](Self::update) followed by [`SceneGraph::end_frame`].
    pub fn update_and_end_frame(&mut self, graph: &mut SceneGraph, stamp: u64) {
        if !self.ensure_active("update_and_end_frame") {
            return;
        }
        self.update(graph, stamp);
        graph.end_frame();
    }

    /// Broadcasts a pipeline-wide state change to every model and light.
    pub fn on_global_pipeline_state_changed(&mut self) {
        if !self.ensure_active("on_global_pipeline_state_changed") {
            return;
        }
        for model in &self.models {
            if let Ok(mut model) = model.try_borrow_mut() {
                model.on_global_pipeline_state_changed();
            }
        }
        for light in self
            .directional_lights
            .iter()
            .chain(&self.sphere_lights)
            .chain(&self.spot_lights)
        {
            if let Ok(mut light) = light.try_borrow_mut() {
                light.on_global_pipeline_state_changed();
            }
        }
    }
}

impl Drop for RenderScene {
    fn drop(&mut self) {
        if self.state != SceneState::Destroyed {
            self.destroy();
        }
    }
}
