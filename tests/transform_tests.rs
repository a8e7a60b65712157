//! Transform and dirty-propagation tests
//!
//! Tests for:
//! - Lazy, ancestor-first world resolution
//! - Dirty bits on descendants (rotation/scale imply position)
//! - Idempotent resolution (world_version stays put)
//! - Incremental resolution against from-scratch composition
//! - World-space setters and look_at
//! - Dirty-table frame protocol (resolve, end_frame, carry-over, slots)

use glam::{Affine3A, EulerRot, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;
use strata::scene::{NodeHandle, SceneGraph, TransformBit};
use strata::settings::SceneSettings;

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn quat_approx(a: Quat, b: Quat) -> bool {
    a.dot(b).abs() > 1.0 - EPSILON
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// World matrix composed from local transforms, root down, with no caching.
fn uncached_world(graph: &SceneGraph, node: NodeHandle) -> Affine3A {
    let mut matrix = Affine3A::IDENTITY;
    let mut cursor = Some(node);
    while let Some(handle) = cursor {
        let n = graph.get(handle).unwrap();
        matrix = n.transform().local_matrix() * matrix;
        cursor = n.parent();
    }
    matrix
}

/// Deterministic xorshift64 generator.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }

    /// Uniform in [lo, hi)
    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        let unit = (self.next() >> 40) as f32 / (1u64 << 24) as f32;
        lo + (hi - lo) * unit
    }

    fn vec3(&mut self, lo: f32, hi: f32) -> Vec3 {
        Vec3::new(self.range(lo, hi), self.range(lo, hi), self.range(lo, hi))
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn child_world_position_follows_parent() {
    init_logger();
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");

    g.set_position(b, Vec3::new(1.0, 0.0, 0.0));
    g.update_world_transform(a);
    assert!(vec3_approx(g.world_position(b).unwrap(), Vec3::new(1.0, 0.0, 0.0)));

    // Parent moves; child is flagged before any resolution happens
    g.set_position(a, Vec3::new(5.0, 0.0, 0.0));
    assert!(g.dirty_flags(b).contains(TransformBit::POSITION));

    g.update_world_transform(b);
    assert!(g.dirty_flags(b).is_empty());
    assert!(g.dirty_flags(a).is_empty());
    assert!(vec3_approx(g.world_position(b).unwrap(), Vec3::new(6.0, 0.0, 0.0)));
}

#[test]
fn parent_rotation_flags_descendant_position() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    let c = g.create_child(b, "C");
    g.resolve_dirty_nodes();
    g.end_frame();

    g.set_rotation(a, Quat::from_rotation_y(0.5));
    assert_eq!(g.dirty_flags(a), TransformBit::ROTATION);
    assert_eq!(g.dirty_flags(b), TransformBit::ROTATION | TransformBit::POSITION);
    assert_eq!(g.dirty_flags(c), TransformBit::ROTATION | TransformBit::POSITION);

    g.set_scale(b, Vec3::splat(2.0));
    assert_eq!(g.dirty_flags(a), TransformBit::ROTATION);
    assert!(g.dirty_flags(c).contains(TransformBit::SCALE | TransformBit::POSITION));
}

#[test]
fn position_change_does_not_flag_descendant_rotation() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    g.resolve_dirty_nodes();

    g.set_position(a, Vec3::ONE);
    assert_eq!(g.dirty_flags(b), TransformBit::POSITION);
}

#[test]
fn invalidate_children_skips_self() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    let c = g.create_child(b, "C");
    g.resolve_dirty_nodes();

    g.invalidate_children(a, TransformBit::SCALE);
    assert!(g.dirty_flags(a).is_empty());
    assert_eq!(g.dirty_flags(b), TransformBit::SCALE);
    assert_eq!(g.dirty_flags(c), TransformBit::SCALE);
}

#[test]
fn resolution_is_idempotent() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    g.set_position(a, Vec3::new(1.0, 2.0, 3.0));
    g.set_rotation(b, Quat::from_rotation_z(0.7));

    let first = g.world_matrix(b).unwrap();
    let version = g.world_version(b).unwrap();
    assert!(g.dirty_flags(b).is_empty());

    let second = g.world_matrix(b).unwrap();
    assert_eq!(first, second);
    assert_eq!(g.world_version(b).unwrap(), version);
}

#[test]
fn full_pass_matches_lazy_resolution() {
    let mut g = SceneGraph::new();
    let root = g.create_node("root");
    let a = g.create_child(root, "a");
    let b = g.create_child(a, "b");
    g.set_position(root, Vec3::new(0.0, 1.0, 0.0));
    g.set_rotation(a, Quat::from_rotation_x(0.4));
    g.set_position(b, Vec3::new(0.0, 0.0, 2.0));

    assert_eq!(g.update_hierarchy(), 3);
    assert_eq!(g.update_hierarchy(), 0);
    assert!(g.get(b).unwrap().world_matrix().abs_diff_eq(uncached_world(&g, b), EPSILON));

    // Moving the root recomputes the whole chain
    g.set_position(root, Vec3::ZERO);
    assert_eq!(g.update_hierarchy(), 3);
}

#[test]
fn incremental_resolution_matches_full_recomputation() {
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut g = SceneGraph::new();

    let mut nodes = vec![g.create_node("n0")];
    for i in 1..48 {
        let parent = nodes[rng.below(nodes.len())];
        nodes.push(g.create_child(parent, &format!("n{i}")));
    }

    for step in 0..400 {
        let node = nodes[rng.below(nodes.len())];
        match rng.below(5) {
            0 => g.set_position(node, rng.vec3(-5.0, 5.0)),
            1 => g.set_rotation_from_euler(node, rng.vec3(-1.5, 1.5)),
            2 => g.set_scale(node, Vec3::splat(rng.range(0.8, 1.2))),
            3 => {
                // Read somewhere in the middle of a mutation sequence
                let _ = g.world_matrix(node);
            }
            _ => {
                let parent = nodes[rng.below(nodes.len())];
                let keep = rng.below(2) == 0;
                // Cycles and self-attach are rejected and leave the tree intact
                let _ = g.set_parent(node, Some(parent), keep);
            }
        }

        if step % 50 == 49 {
            g.resolve_dirty_nodes();
            g.end_frame();
        }
    }

    for &node in &nodes {
        let resolved = g.world_matrix(node).unwrap();
        let expected = uncached_world(&g, node);
        assert!(
            resolved.abs_diff_eq(expected, 1e-3),
            "node {:?}: {resolved:?} != {expected:?}",
            g.get(node).unwrap().name
        );
    }
}

// ============================================================================
// Setters
// ============================================================================

#[test]
fn euler_setter_keeps_cache_in_sync() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let euler = Vec3::new(0.1, 0.2, 0.3);
    g.set_rotation_from_euler(a, euler);

    let t = g.transform(a).unwrap();
    assert!(vec3_approx(t.euler_angles(), euler));
    assert!(quat_approx(
        t.rotation(),
        Quat::from_euler(EulerRot::XYZ, 0.1, 0.2, 0.3)
    ));

    g.set_rotation(a, Quat::from_rotation_y(0.5));
    assert!(vec3_approx(
        g.transform(a).unwrap().euler_angles(),
        Vec3::new(0.0, 0.5, 0.0)
    ));
}

#[test]
fn world_setters_under_transformed_parent() {
    let mut g = SceneGraph::new();
    let parent = g.create_node("parent");
    g.set_position(parent, Vec3::new(3.0, 0.0, 0.0));
    g.set_rotation(parent, Quat::from_rotation_y(FRAC_PI_2));
    g.set_scale(parent, Vec3::splat(2.0));
    let child = g.create_child(parent, "child");

    let target = Vec3::new(1.0, 1.0, 1.0);
    g.set_world_position(child, target);
    assert!(vec3_approx(g.world_position(child).unwrap(), target));

    let rotation = Quat::from_rotation_x(0.3);
    g.set_world_rotation(child, rotation);
    assert!(quat_approx(g.world_rotation(child).unwrap(), rotation));
    assert!(vec3_approx(g.world_scale(child).unwrap(), Vec3::splat(2.0)));
}

#[test]
fn look_at_points_negative_z_at_target() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    g.look_at(a, Vec3::new(5.0, 0.0, 0.0), Vec3::Y);

    let forward = g.world_rotation(a).unwrap() * Vec3::NEG_Z;
    assert!(vec3_approx(forward, Vec3::X));

    // Degenerate up vector leaves the rotation alone
    let before = g.transform(a).unwrap().rotation();
    g.look_at(a, Vec3::new(0.0, 5.0, 0.0), Vec3::Y);
    assert_eq!(g.transform(a).unwrap().rotation(), before);
}

// ============================================================================
// Frame protocol
// ============================================================================

#[test]
fn frame_protocol_resets_changed_flags() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    assert_eq!(g.dirty_queue().iter().count(), 2);
    assert_eq!(g.get_dirty_node(0), Some(a));

    assert_eq!(g.resolve_dirty_nodes(), 2);
    assert!(g.dirty_flags(b).is_empty());
    assert_eq!(g.changed_flags(b), TransformBit::TRS);

    g.end_frame();
    assert!(g.changed_flags(a).is_empty());
    assert!(g.changed_flags(b).is_empty());
    assert!(g.dirty_queue().is_empty());

    g.set_rotation(a, Quat::from_rotation_y(1.0));
    assert_eq!(g.changed_flags(a), TransformBit::ROTATION);
    assert_eq!(g.changed_flags(b), TransformBit::ROTATION | TransformBit::POSITION);
    assert_eq!(g.dirty_queue().iter().count(), 2);
}

#[test]
fn node_is_queued_once_per_frame() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    g.resolve_dirty_nodes();
    g.end_frame();

    g.set_position(a, Vec3::X);
    g.set_position(a, Vec3::Y);
    g.set_scale(a, Vec3::splat(3.0));
    assert_eq!(g.dirty_queue().iter().count(), 1);
    assert_eq!(g.changed_flags(a), TransformBit::POSITION | TransformBit::SCALE);
}

#[test]
fn late_mutations_carry_over_to_next_frame() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    g.resolve_dirty_nodes();

    // Mutated after the resolve pass of this frame
    g.set_position(b, Vec3::X);
    g.end_frame();

    assert_eq!(g.dirty_queue().iter().collect::<Vec<_>>(), vec![b]);
    assert_eq!(g.changed_flags(b), TransformBit::POSITION);
    assert!(g.changed_flags(a).is_empty());
}

#[test]
fn without_carry_over_lazy_reads_stay_correct() {
    let settings = SceneSettings {
        carry_over_dirty_nodes: false,
        ..SceneSettings::default()
    };
    let mut g = SceneGraph::with_settings(&settings);
    let a = g.create_node("A");
    g.resolve_dirty_nodes();
    g.set_position(a, Vec3::new(0.0, 4.0, 0.0));
    g.end_frame();

    assert!(g.dirty_queue().is_empty());
    assert_eq!(g.dirty_flags(a), TransformBit::POSITION);
    assert!(vec3_approx(g.world_position(a).unwrap(), Vec3::new(0.0, 4.0, 0.0)));
}

#[test]
fn explicit_dirty_slots() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_node("B");
    g.resolve_dirty_nodes();
    g.end_frame();

    g.set_dirty_node(3, Some(a));
    assert_eq!(g.get_dirty_node(3), Some(a));
    assert_eq!(g.get_dirty_node(0), None);
    assert_eq!(g.dirty_queue().len(), 4);

    // `a` loses its slot, so the next mutation queues it again
    g.set_dirty_node(3, Some(b));
    g.set_position(a, Vec3::X);
    assert_eq!(g.get_dirty_node(4), Some(a));

    g.set_dirty_node(3, None);
    assert_eq!(g.get_dirty_node(3), None);

    g.clear_node_array();
    assert!(g.dirty_queue().is_empty());
    // Still dirty: a later mutation can queue it again
    g.set_scale(a, Vec3::splat(2.0));
    assert_eq!(g.get_dirty_node(0), Some(a));
}

#[test]
fn dirty_slots_past_limit_are_ignored() {
    let settings = SceneSettings {
        max_dirty_slots: 16,
        ..SceneSettings::default()
    };
    let mut g = SceneGraph::with_settings(&settings);
    let a = g.create_node("A");
    assert_eq!(g.get_dirty_node(0), Some(a));

    g.set_dirty_node(usize::MAX, Some(a));
    g.set_dirty_node(1 << 40, Some(a));
    g.set_dirty_node(16, Some(a));

    // Rejected writes leave the table and the node's slot untouched
    assert_eq!(g.dirty_queue().len(), 1);
    assert_eq!(g.get_dirty_node(0), Some(a));

    g.set_dirty_node(15, Some(a));
    assert_eq!(g.get_dirty_node(15), Some(a));
    assert_eq!(g.get_dirty_node(0), None);
}

#[test]
fn raw_dirty_flags_do_not_propagate() {
    let mut g = SceneGraph::new();
    let a = g.create_node("A");
    let b = g.create_child(a, "B");
    g.resolve_dirty_nodes();
    g.end_frame();

    g.set_dirty_flags(a, TransformBit::SCALE);
    assert_eq!(g.dirty_flags(a), TransformBit::SCALE);
    assert!(g.dirty_flags(b).is_empty());
    assert_eq!(g.get_dirty_node(0), Some(a));

    g.resolve_dirty_nodes();
    assert!(g.dirty_flags(a).is_empty());
}
