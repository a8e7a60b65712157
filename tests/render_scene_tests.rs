//! Render scene tests
//!
//! Tests for:
//! - Lifecycle (uninitialized, active, destroyed)
//! - Member registration and removal by identity and by index
//! - Model id generation
//! - Main light designation
//! - Frame update pulling resolved node transforms into members
//! - Environment change tracking

use std::cell::RefCell;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

use glam::{Mat4, Quat, Vec3};
use strata::render::{
    Aabb, Camera, DrawBatch2D, Environment, FogMode, Light, Model, RenderScene, RenderSceneInfo,
    SceneMember, SceneState, SharedLight, SharedModel,
};
use strata::resources::{Pass, ShaderReflection, UniformBlockDesc, UniformType};
use strata::scene::SceneGraph;
use strata::StrataError;

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).abs().max_element() < EPSILON
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn active_scene() -> RenderScene {
    init_logger();
    let mut scene = RenderScene::new();
    assert!(scene.initialize(&RenderSceneInfo::default()));
    scene
}

fn shared_model(name: &str) -> SharedModel {
    Rc::new(RefCell::new(Model::new(name)))
}

fn directional() -> SharedLight {
    Rc::new(RefCell::new(Light::new_directional(Vec3::ONE, 10.0)))
}

fn model_pass() -> Pass {
    let reflection = ShaderReflection::new().with_block(
        UniformBlockDesc::std140("Model", 0)
            .member("worldMatrix", UniformType::Mat4)
            .member("worldMatrixInverse", UniformType::Mat4)
            .member("normalMatrix", UniformType::Mat3)
            .build(),
    );
    Pass::new("model", &reflection).unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn operations_before_initialize_are_ignored() {
    init_logger();
    let mut scene = RenderScene::new();
    assert_eq!(scene.state(), SceneState::Uninitialized);

    let model = shared_model("early");
    scene.add_model(&model);
    assert!(scene.models().is_empty());
    assert_eq!(model.borrow().scene_id(), None);
    assert_eq!(scene.generate_model_id(), 0);
    assert!(!scene.add_directional_light(&directional()));
}

#[test]
fn failed_initialize_can_be_retried() {
    init_logger();
    let mut scene = RenderScene::new();

    let nameless = RenderSceneInfo {
        name: "  ".to_string(),
        ..RenderSceneInfo::default()
    };
    assert!(!scene.initialize(&nameless));
    assert_eq!(scene.state(), SceneState::Uninitialized);

    let mut bad_fog = RenderSceneInfo::default();
    bad_fog.environment.fog.enabled = true;
    bad_fog.environment.fog.start = 50.0;
    bad_fog.environment.fog.end = 10.0;
    assert!(!scene.initialize(&bad_fog));
    assert_eq!(scene.state(), SceneState::Uninitialized);

    let info = RenderSceneInfo {
        name: "Level".to_string(),
        ..RenderSceneInfo::default()
    };
    assert!(scene.initialize(&info));
    assert!(scene.is_active());
    assert_eq!(scene.name(), "Level");

    // Second initialize is rejected without changing state
    assert!(!scene.initialize(&RenderSceneInfo::default()));
    assert_eq!(scene.name(), "Level");
}

#[test]
fn destroy_unregisters_every_member() {
    let mut scene = active_scene();
    let model = shared_model("m");
    let camera = Rc::new(RefCell::new(Camera::new_perspective(60.0, 1.0, 0.1, 100.0)));
    let sun = directional();
    let batch = Rc::new(RefCell::new(DrawBatch2D::new("hud")));

    scene.add_model(&model);
    scene.add_camera(&camera);
    scene.add_directional_light(&sun);
    scene.set_main_light(&sun);
    scene.add_batch(&batch);
    assert_eq!(model.borrow().scene_id(), Some(scene.id()));

    scene.destroy();
    assert_eq!(scene.state(), SceneState::Destroyed);
    assert!(scene.models().is_empty());
    assert!(scene.cameras().is_empty());
    assert!(scene.directional_lights().is_empty());
    assert!(scene.batches().is_empty());
    assert!(scene.main_light().is_none());

    // Members survive, unlinked
    assert_eq!(model.borrow().scene_id(), None);
    assert_eq!(camera.borrow().scene_id(), None);
    assert_eq!(sun.borrow().scene_id(), None);
    assert_eq!(batch.borrow().scene_id(), None);
    assert_eq!(Rc::strong_count(&model), 1);

    // Terminal state
    assert!(!scene.initialize(&RenderSceneInfo::default()));
    scene.add_model(&model);
    assert!(scene.models().is_empty());
    scene.destroy();
    assert_eq!(scene.state(), SceneState::Destroyed);
}

#[test]
fn dropping_scene_detaches_members() {
    let model = shared_model("m");
    {
        let mut scene = active_scene();
        scene.add_model(&model);
        assert!(model.borrow().scene_id().is_some());
    }
    assert_eq!(model.borrow().scene_id(), None);
    assert_eq!(Rc::strong_count(&model), 1);
}

#[test]
fn scene_info_from_json() -> anyhow::Result<()> {
    let info = RenderSceneInfo::from_json(
        r#"{ "name": "Night", "environment": { "ambient_intensity": 0.5, "fog": { "enabled": true, "mode": "Exponential", "density": 0.2 } } }"#,
    )?;
    assert_eq!(info.name, "Night");
    assert!((info.environment.ambient_intensity - 0.5).abs() < EPSILON);
    assert_eq!(info.environment.fog.mode, FogMode::Exponential);
    assert!(!info.environment.skybox.enabled);

    assert!(matches!(
        RenderSceneInfo::from_json(r#"{ "name": "" }"#),
        Err(StrataError::InvalidSceneInfo(_))
    ));
    assert!(matches!(
        RenderSceneInfo::from_json("{ name"),
        Err(StrataError::JsonError(_))
    ));
    Ok(())
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn model_ids_increase_and_are_never_reused() {
    let mut scene = active_scene();
    let models: Vec<SharedModel> = (0..3).map(|i| shared_model(&format!("m{i}"))).collect();
    for model in &models {
        scene.add_model(model);
    }

    let generated: Vec<u64> = (0..3).map(|_| scene.generate_model_id()).collect();
    assert!(generated.windows(2).all(|w| w[0] < w[1]));

    let mut seen: Vec<u64> = models.iter().map(|m| m.borrow().id()).collect();
    seen.extend(&generated);
    let max_seen = *seen.iter().max().unwrap();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 6);
    assert!(!seen.contains(&0));

    assert!(scene.remove_model(&models[1]));
    let fresh = shared_model("fresh");
    scene.add_model(&fresh);
    assert!(fresh.borrow().id() > max_seen);
}

#[test]
fn remove_by_identity() {
    let mut scene = active_scene();
    let a = shared_model("a");
    let b = shared_model("b");
    let twin = Rc::new(RefCell::new(Model::new("a")));

    scene.add_model(&a);
    scene.add_model(&b);

    // Same contents, different object
    assert!(!scene.remove_model(&twin));
    assert_eq!(scene.models().len(), 2);

    assert!(scene.remove_model(&a));
    assert!(!scene.remove_model(&a));
    assert_eq!(scene.models().len(), 1);
    assert!(Rc::ptr_eq(&scene.models()[0], &b));
    assert_eq!(a.borrow().scene_id(), None);
}

#[test]
fn remove_by_index_swaps_last_into_place() {
    let mut scene = active_scene();
    let models: Vec<SharedModel> = ["a", "b", "c", "d"].iter().map(|n| shared_model(n)).collect();
    for model in &models {
        scene.add_model(model);
    }

    let removed = scene.remove_model_at(1).unwrap();
    assert!(Rc::ptr_eq(&removed, &models[1]));
    assert_eq!(removed.borrow().scene_id(), None);

    let order: Vec<String> = scene.models().iter().map(|m| m.borrow().name.clone()).collect();
    assert_eq!(order, ["a", "d", "c"]);

    assert!(scene.remove_model_at(3).is_none());
    assert_eq!(scene.models().len(), 3);
}

#[test]
fn bulk_removal_keeps_members_alive() {
    let mut scene = active_scene();
    let cameras: Vec<_> = (0..3)
        .map(|_| Rc::new(RefCell::new(Camera::new_perspective(45.0, 1.0, 0.1, 10.0))))
        .collect();
    for camera in &cameras {
        scene.add_camera(camera);
    }
    scene.remove_cameras();
    assert!(scene.cameras().is_empty());
    for camera in &cameras {
        assert!(camera.borrow().is_initialized());
        assert_eq!(camera.borrow().scene_id(), None);
    }

    let batch = Rc::new(RefCell::new(DrawBatch2D::new("ui")));
    scene.add_batch(&batch);
    assert!(Rc::ptr_eq(&scene.remove_batch_at(0).unwrap(), &batch));
    scene.add_batch(&batch);
    scene.remove_batches();
    assert!(scene.batches().is_empty());
}

#[test]
fn lights_are_sorted_by_kind() {
    let mut scene = active_scene();
    let sun = directional();
    let bulb = Rc::new(RefCell::new(Light::new_sphere(Vec3::ONE, 100.0, 5.0)));
    let torch = Rc::new(RefCell::new(Light::new_spot(Vec3::ONE, 100.0, 5.0, 0.6)));

    assert!(!scene.add_directional_light(&bulb));
    assert!(!scene.add_sphere_light(&torch));
    assert!(!scene.add_spot_light(&sun));
    assert_eq!(bulb.borrow().scene_id(), None);

    assert!(scene.add_directional_light(&sun));
    assert!(scene.add_sphere_light(&bulb));
    assert!(scene.add_spot_light(&torch));
    assert_eq!(
        (
            scene.directional_lights().len(),
            scene.sphere_lights().len(),
            scene.spot_lights().len()
        ),
        (1, 1, 1)
    );

    assert!(!scene.remove_directional_light(&bulb));
    assert!(scene.remove_sphere_light(&bulb));
    assert!(Rc::ptr_eq(&scene.remove_spot_light_at(0).unwrap(), &torch));
    scene.remove_directional_lights();
    assert!(scene.directional_lights().is_empty());
    assert_eq!(sun.borrow().scene_id(), None);
}

// ============================================================================
// Main light
// ============================================================================

#[test]
fn main_light_must_be_directional() {
    let mut scene = active_scene();
    let bulb = Rc::new(RefCell::new(Light::new_sphere(Vec3::ONE, 100.0, 5.0)));
    assert!(!scene.set_main_light(&bulb));
    assert!(scene.main_light().is_none());

    // Registration is not required
    let sun = directional();
    assert!(scene.set_main_light(&sun));
    assert!(scene.directional_lights().is_empty());
    assert!(Rc::ptr_eq(scene.main_light().unwrap(), &sun));
}

#[test]
fn unset_main_light_ignores_stale_reference() {
    let mut scene = active_scene();
    let first = directional();
    let second = directional();

    scene.set_main_light(&first);
    scene.set_main_light(&second);

    // Clearing the replaced light must not clear its successor
    scene.unset_main_light(&first);
    assert!(Rc::ptr_eq(scene.main_light().unwrap(), &second));

    scene.unset_main_light(&second);
    assert!(scene.main_light().is_none());
}

#[test]
fn removing_registered_main_light_keeps_designation() {
    let mut scene = active_scene();
    let sun = directional();
    scene.add_directional_light(&sun);
    scene.set_main_light(&sun);
    assert!(scene.remove_directional_light(&sun));
    assert!(Rc::ptr_eq(scene.main_light().unwrap(), &sun));
}

// ============================================================================
// Frame update
// ============================================================================

#[test]
fn update_pulls_world_transforms_into_members() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();

    let rig = graph.create_node("rig");
    graph.set_position(rig, Vec3::new(10.0, 0.0, 0.0));
    let body = graph.create_child(rig, "body");
    graph.set_position(body, Vec3::new(0.0, 2.0, 0.0));
    let eye = graph.create_child(rig, "eye");
    graph.set_position(eye, Vec3::new(0.0, 0.0, 5.0));
    let lamp = graph.create_child(rig, "lamp");
    graph.set_rotation(lamp, Quat::from_rotation_y(FRAC_PI_2));

    let model = Rc::new(RefCell::new(Model::with_node("body", body)));
    model.borrow_mut().set_local_bounds(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    model.borrow_mut().add_pass(model_pass());
    let camera = Rc::new(RefCell::new(Camera::new_perspective(60.0, 1.0, 0.1, 100.0)));
    camera.borrow_mut().set_node(Some(eye));
    let torch = Rc::new(RefCell::new(Light::new_spot(Vec3::ONE, 100.0, 20.0, 0.8)));
    torch.borrow_mut().set_node(Some(lamp));

    scene.add_model(&model);
    scene.add_camera(&camera);
    scene.add_spot_light(&torch);

    scene.update(&mut graph, 1);
    assert_eq!(scene.last_stamp(), 1);

    {
        let m = model.borrow();
        let translation = m.uniforms().world_matrix.w_axis.truncate();
        assert!(vec3_approx(translation, Vec3::new(10.0, 2.0, 0.0)));
        assert!(vec3_approx(m.world_bounds().min, Vec3::new(9.0, 1.0, -1.0)));
        assert!(vec3_approx(m.world_bounds().max, Vec3::new(11.0, 3.0, 1.0)));
        assert_eq!(m.transform_updated_stamp(), 1);

        let pass = &m.passes()[0];
        let published: Mat4 = pass.read_uniform(pass.get_handle("worldMatrix")).unwrap();
        assert_eq!(published, m.uniforms().world_matrix);
    }

    assert!(vec3_approx(camera.borrow().position(), Vec3::new(10.0, 0.0, 5.0)));

    {
        let light = torch.borrow();
        let spot = light.as_spot().unwrap();
        assert!(vec3_approx(spot.position, Vec3::new(10.0, 0.0, 0.0)));
        // -Z rotated a quarter turn about +Y
        assert!(vec3_approx(spot.direction, Vec3::NEG_X));
    }
}

#[test]
fn unchanged_models_are_not_republished() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();
    let a = graph.create_node("a");
    let b = graph.create_node("b");

    let still = Rc::new(RefCell::new(Model::with_node("still", a)));
    let moving = Rc::new(RefCell::new(Model::with_node("moving", b)));
    scene.add_model(&still);
    scene.add_model(&moving);

    scene.update(&mut graph, 1);
    graph.end_frame();

    graph.set_position(b, Vec3::X);
    scene.update(&mut graph, 2);

    assert_eq!(still.borrow().transform_updated_stamp(), 1);
    assert_eq!(moving.borrow().transform_updated_stamp(), 2);
}

#[test]
fn update_and_end_frame_closes_the_frame() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();
    let node = graph.create_node("n");
    let model = Rc::new(RefCell::new(Model::with_node("m", node)));
    scene.add_model(&model);

    for stamp in 1..=20 {
        let churn = graph.create_child(node, "churn");
        graph.set_position(node, Vec3::splat(stamp as f32));
        graph.destroy_immediate(churn);
        scene.update_and_end_frame(&mut graph, stamp);

        assert!(graph.dirty_queue().is_empty());
        assert!(graph.changed_flags(node).is_empty());
        assert_eq!(model.borrow().transform_updated_stamp(), stamp);
    }

    // Inactive scenes leave the graph alone
    scene.destroy();
    graph.set_position(node, Vec3::ZERO);
    scene.update_and_end_frame(&mut graph, 21);
    assert!(!graph.dirty_queue().is_empty());
}

#[test]
fn disabled_models_are_skipped() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();
    let node = graph.create_node("n");
    graph.set_position(node, Vec3::Y);

    let model = Rc::new(RefCell::new(Model::with_node("hidden", node)));
    model.borrow_mut().enabled = false;
    scene.add_model(&model);
    scene.update(&mut graph, 7);

    assert_eq!(model.borrow().transform_updated_stamp(), 0);
    assert_eq!(model.borrow().uniforms().world_matrix, Mat4::IDENTITY);
}

#[test]
fn update_flushes_deferred_destruction() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();
    let root = graph.create_node("root");
    let child = graph.create_child(root, "child");

    let model = Rc::new(RefCell::new(Model::with_node("child", child)));
    scene.add_model(&model);

    graph.destroy(root);
    scene.update(&mut graph, 1);
    assert!(!graph.contains(root));
    assert!(!graph.contains(child));

    // Next frame notices the dangling node and unbinds it
    scene.update(&mut graph, 2);
    assert_eq!(model.borrow().node(), None);
    assert_eq!(scene.models().len(), 1);
}

#[test]
fn batch_reports_node_motion() {
    let mut graph = SceneGraph::new();
    let node = graph.create_node("hud");
    let mut batch = DrawBatch2D::new("hud");
    batch.set_node(Some(node));

    assert!(batch.update(&mut graph));
    assert!(!batch.update(&mut graph));
    graph.set_scale(node, Vec3::splat(2.0));
    assert!(batch.update(&mut graph));
}

#[test]
fn pipeline_change_reaches_models_and_lights() {
    let mut scene = active_scene();
    let model = shared_model("m");
    model.borrow_mut().add_pass(model_pass());
    let sun = directional();
    scene.add_model(&model);
    scene.add_directional_light(&sun);

    scene.on_global_pipeline_state_changed();
    assert_eq!(model.borrow().passes()[0].pipeline_version(), 1);
    assert_eq!(sun.borrow().pipeline_version(), 1);
}

// ============================================================================
// Environment
// ============================================================================

#[test]
fn environment_changes_resync_uniforms() {
    let mut scene = active_scene();
    let mut graph = SceneGraph::new();

    scene.update(&mut graph, 1);
    let defaults = *scene.environment_uniforms();
    assert!((defaults.ambient[0] - 0.2).abs() < EPSILON);

    scene.environment_mut().set_ambient(Vec3::new(1.0, 0.5, 0.0), 2.0);
    // Not visible until the next update
    assert_eq!(*scene.environment_uniforms(), defaults);

    scene.update(&mut graph, 2);
    let ambient = scene.environment_uniforms().ambient;
    assert!((ambient[0] - 2.0).abs() < EPSILON);
    assert!((ambient[1] - 1.0).abs() < EPSILON);
    assert_eq!(scene.environment().ambient_intensity, 2.0);
}

#[test]
fn environment_validation() {
    let mut env = Environment::new();
    assert!(env.validate().is_ok());
    env.ambient_intensity = -1.0;
    assert!(env.validate().is_err());
}
