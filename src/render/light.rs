use glam::Vec3;
use uuid::Uuid;

use crate::render::render_scene::SceneMember;
use crate::scene::{NodeHandle, SceneGraph};

const MIN_RANGE: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Lux
    illuminance: f32,
    /// World-space direction the light travels in
    pub direction: Vec3,
}

impl DirectionalLight {
    #[must_use]
    pub fn illuminance(&self) -> f32 {
        self.illuminance
    }

    pub fn set_illuminance(&mut self, lux: f32) {
        self.illuminance = lux.max(0.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SphereLight {
    /// Emitter radius
    size: f32,
    range: f32,
    /// Candela
    pub luminance: f32,
    pub position: Vec3,
}

impl SphereLight {
    #[must_use]
    pub fn size(&self) -> f32 {
        self.size
    }

    #[must_use]
    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range.max(MIN_RANGE);
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = size.max(0.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    size: f32,
    range: f32,
    /// Full cone angle in radians
    spot_angle: f32,
    /// Cosine of the half angle, as the shader consumes it
    angle_cos: f32,
    pub luminance: f32,
    pub position: Vec3,
    pub direction: Vec3,
}

impl SpotLight {
    #[must_use]
    pub fn size(&self) -> f32 {
        self.size
    }

    #[must_use]
    pub fn range(&self) -> f32 {
        self.range
    }

    #[must_use]
    pub fn spot_angle(&self) -> f32 {
        self.spot_angle
    }

    #[must_use]
    pub fn angle_cos(&self) -> f32 {
        self.angle_cos
    }

    /// Sets the full cone angle, clamped to (0, π).
    pub fn set_spot_angle(&mut self, radians: f32) {
        self.spot_angle = radians.clamp(1e-3, std::f32::consts::PI - 1e-3);
        self.angle_cos = (self.spot_angle * 0.5).cos();
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range.max(MIN_RANGE);
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = size.max(0.0);
    }
}

/// Kind-specific light data. Operations that only make sense for one kind
/// are reached by narrowing with [`Light::as_spot_mut`] and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Directional(DirectionalLight),
    Sphere(SphereLight),
    Spot(SpotLight),
}

#[derive(Debug, Clone)]
pub struct Light {
    pub uuid: Uuid,
    pub name: String,
    pub color: Vec3,
    pub kind: LightKind,

    node: Option<NodeHandle>,
    scene: Option<u32>,
    pipeline_version: u64,
}

impl Light {
    fn with_kind(kind: LightKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            color: Vec3::ONE,
            kind,
            node: None,
            scene: None,
            pipeline_version: 0,
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, illuminance: f32) -> Self {
        let mut light = Self::with_kind(LightKind::Directional(DirectionalLight {
            illuminance: illuminance.max(0.0),
            direction: Vec3::NEG_Z,
        }));
        light.color = color;
        light
    }

    #[must_use]
    pub fn new_sphere(color: Vec3, luminance: f32, range: f32) -> Self {
        let mut light = Self::with_kind(LightKind::Sphere(SphereLight {
            size: 0.0,
            range: range.max(MIN_RANGE),
            luminance,
            position: Vec3::ZERO,
        }));
        light.color = color;
        light
    }

    #[must_use]
    pub fn new_spot(color: Vec3, luminance: f32, range: f32, spot_angle: f32) -> Self {
        let mut spot = SpotLight {
            size: 0.0,
            range: range.max(MIN_RANGE),
            spot_angle: 0.0,
            angle_cos: 1.0,
            luminance,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
        };
        spot.set_spot_angle(spot_angle);
        let mut light = Self::with_kind(LightKind::Spot(spot));
        light.color = color;
        light
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Binds the light to a scene-graph node that drives its position and
    /// direction.
    pub fn set_node(&mut self, node: Option<NodeHandle>) {
        self.node = node;
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    #[must_use]
    pub fn pipeline_version(&self) -> u64 {
        self.pipeline_version
    }

    // === Narrowing ===

    #[must_use]
    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional(_))
    }

    #[must_use]
    pub fn as_directional(&self) -> Option<&DirectionalLight> {
        match &self.kind {
            LightKind::Directional(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_directional_mut(&mut self) -> Option<&mut DirectionalLight> {
        match &mut self.kind {
            LightKind::Directional(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sphere(&self) -> Option<&SphereLight> {
        match &self.kind {
            LightKind::Sphere(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sphere_mut(&mut self) -> Option<&mut SphereLight> {
        match &mut self.kind {
            LightKind::Sphere(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_spot(&self) -> Option<&SpotLight> {
        match &self.kind {
            LightKind::Spot(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_spot_mut(&mut self) -> Option<&mut SpotLight> {
        match &mut self.kind {
            LightKind::Spot(s) => Some(s),
            _ => None,
        }
    }

    /// Pulls position and direction from the bound node. Lights face -Z.
    pub fn update(&mut self, graph: &mut SceneGraph) {
        let Some(node) = self.node else {
            return;
        };
        let Some(world) = graph.world_matrix(node) else {
            log::warn!("Light `{}` is bound to a destroyed node", self.name);
            self.node = None;
            return;
        };

        let position = Vec3::from(world.translation);
        let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or(Vec3::NEG_Z);
        match &mut self.kind {
            LightKind::Directional(d) => d.direction = direction,
            LightKind::Sphere(s) => s.position = position,
            LightKind::Spot(s) => {
                s.position = position;
                s.direction = direction;
            }
        }
    }

    pub fn on_global_pipeline_state_changed(&mut self) {
        self.pipeline_version = self.pipeline_version.wrapping_add(1);
    }
}

impl SceneMember for Light {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_angle_updates_cosine() {
        let mut light = Light::new_spot(Vec3::ONE, 100.0, 10.0, 1.0);
        let spot = light.as_spot_mut().unwrap();
        spot.set_spot_angle(std::f32::consts::FRAC_PI_2);
        assert!((spot.angle_cos() - std::f32::consts::FRAC_PI_4.cos()).abs() < 1e-6);
    }

    #[test]
    fn constructors_clamp_like_setters() {
        let light = Light::new_spot(Vec3::ONE, 100.0, -3.0, 10.0);
        let spot = light.as_spot().unwrap();
        assert!(spot.range() > 0.0);
        assert!(spot.spot_angle() < std::f32::consts::PI);
        assert!((spot.angle_cos() - (spot.spot_angle() * 0.5).cos()).abs() < 1e-6);

        let sun = Light::new_directional(Vec3::ONE, -5.0);
        assert!(sun.as_directional().unwrap().illuminance().abs() < 1e-6);
    }

    #[test]
    fn narrowing_rejects_other_kinds() {
        let mut light = Light::new_sphere(Vec3::ONE, 10.0, 5.0);
        assert!(light.as_spot_mut().is_none());
        assert!(light.as_directional().is_none());
        light.as_sphere_mut().unwrap().set_range(-1.0);
        assert!(light.as_sphere().unwrap().range() > 0.0);
    }
}
