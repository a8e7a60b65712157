//! Scene-scoped lighting state: ambient term, fog and skybox.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StrataError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FogMode {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fog {
    pub enabled: bool,
    pub mode: FogMode,
    pub color: Vec3,
    pub density: f32,
    pub start: f32,
    pub end: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FogMode::Linear,
            color: Vec3::splat(0.5),
            density: 0.01,
            start: 10.0,
            end: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skybox {
    pub enabled: bool,
    pub intensity: f32,
    /// Rotation around +Y in radians
    pub rotation: f32,
}

impl Default for Skybox {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 1.0,
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub fog: Fog,
    pub skybox: Skybox,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::splat(0.2),
            ambient_intensity: 1.0,
            fog: Fog::default(),
            skybox: Skybox::default(),
        }
    }
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ambient(&mut self, color: Vec3, intensity: f32) {
        self.ambient_color = color;
        self.ambient_intensity = intensity.max(0.0);
    }

    /// # Errors
    ///
    /// `InvalidSceneInfo` describing the first inconsistent parameter.
    pub fn validate(&self) -> Result<()> {
        if self.ambient_intensity < 0.0 {
            return Err(StrataError::InvalidSceneInfo(
                "ambient intensity must be non-negative".to_string(),
            ));
        }
        if self.fog.enabled {
            if self.fog.density < 0.0 {
                return Err(StrataError::InvalidSceneInfo(
                    "fog density must be non-negative".to_string(),
                ));
            }
            if self.fog.mode == FogMode::Linear && self.fog.end <= self.fog.start {
                return Err(StrataError::InvalidSceneInfo(
                    "linear fog end must be greater than start".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// GPU layout of [`Environment`] (std140, vec4-packed).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct EnvironmentUniforms {
    /// rgb = ambient color * intensity
    pub ambient: [f32; 4],
    /// rgb = fog color, a = enabled
    pub fog_color: [f32; 4],
    /// x = density, y = start, z = end, w = mode (0 linear, 1 exponential)
    pub fog_params: [f32; 4],
    /// x = enabled, y = intensity, z = rotation
    pub skybox: [f32; 4],
}

impl From<&Environment> for EnvironmentUniforms {
    fn from(env: &Environment) -> Self {
        let ambient = env.ambient_color * env.ambient_intensity;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        Self {
            ambient: [ambient.x, ambient.y, ambient.z, 1.0],
            fog_color: [env.fog.color.x, env.fog.color.y, env.fog.color.z, flag(env.fog.enabled)],
            fog_params: [
                env.fog.density,
                env.fog.start,
                env.fog.end,
                match env.fog.mode {
                    FogMode::Linear => 0.0,
                    FogMode::Exponential => 1.0,
                },
            ],
            skybox: [flag(env.skybox.enabled), env.skybox.intensity, env.skybox.rotation, 0.0],
        }
    }
}
