// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renderer configuration, stored as RON.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use umbra_core::math::LinearRgba;
use umbra_core::renderer::uniforms::{MAX_CASCADES, MAX_OCCLUSION_SAMPLES};
use umbra_core::renderer::LightSettings;

/// Shadow map settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Edge length of every cascade's depth target, in texels.
    pub map_size: u32,
    /// Object capacity of each cascade's private sorter.
    pub max_objects: usize,
    /// Cascades rendered per light (clamped to four).
    pub cascades: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 2048,
            max_objects: 1000,
            cascades: MAX_CASCADES,
        }
    }
}

/// Lighting constants written to the light buffer header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Colour of the implicit ambient light.
    pub ambient_color: LinearRgba,
    /// Intensity of the implicit ambient light.
    pub ambient_intensity: f32,
    /// Depth bias applied to shadow lookups.
    pub shadow_bias: f32,
    /// Radius of the shadow filter kernel, in texels.
    pub shadow_sample_radius: f32,
    /// Samples per axis of the shadow filter.
    pub shadow_samples: i32,
    /// World-space offset along the normal before the shadow lookup.
    pub normal_offset: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        let settings = LightSettings::default();
        Self {
            ambient_color: settings.ambient_color,
            ambient_intensity: settings.ambient_intensity,
            shadow_bias: settings.shadow_bias,
            shadow_sample_radius: settings.shadow_sample_radius,
            shadow_samples: settings.shadow_samples,
            normal_offset: settings.normal_offset,
        }
    }
}

impl LightingConfig {
    /// The light buffer header for these settings (count filled at flush).
    pub fn settings(&self) -> LightSettings {
        LightSettings {
            ambient_color: self.ambient_color,
            ambient_intensity: self.ambient_intensity,
            shadow_bias: self.shadow_bias,
            shadow_sample_radius: self.shadow_sample_radius,
            shadow_samples: self.shadow_samples,
            normal_offset: self.normal_offset,
            ..LightSettings::default()
        }
    }
}

/// Screen-space ambient occlusion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Whether the occlusion and blur passes run at all.
    pub enabled: bool,
    /// Hemisphere samples per texel (at most 32).
    pub samples: u32,
    /// Sampling radius in view-space units.
    pub radius: f32,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Exponent applied to the visibility term.
    pub power: f32,
    /// Seed of the sample kernel and rotation noise.
    pub seed: u64,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: MAX_OCCLUSION_SAMPLES as u32,
            radius: 0.4,
            bias: 0.02,
            power: 2.6,
            seed: 42,
        }
    }
}

/// Post-process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Asset path of the colour grading lookup table.
    pub lut: String,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            lut: "textures/color_grading/none.png".to_owned(),
        }
    }
}

/// Every tunable of the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Frames the CPU may prepare while the GPU executes earlier ones.
    pub frames_in_flight: usize,
    /// Object buffer capacity of each material instance.
    pub max_objects: usize,
    /// Light buffer capacity (excluding the header slot).
    pub max_lights: usize,
    /// Texture slots per material instance.
    pub max_textures: usize,
    /// Shadow settings.
    pub shadow: ShadowConfig,
    /// Lighting settings.
    pub lighting: LightingConfig,
    /// Ambient occlusion settings.
    pub occlusion: OcclusionConfig,
    /// Post-process settings.
    pub post_process: PostProcessConfig,
    /// Colour the output image is cleared to.
    pub clear_color: LinearRgba,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            max_objects: 2000,
            max_lights: 256,
            max_textures: 100,
            shadow: ShadowConfig::default(),
            lighting: LightingConfig::default(),
            occlusion: OcclusionConfig::default(),
            post_process: PostProcessConfig::default(),
            clear_color: LinearRgba::BLACK,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from RON text; missing fields take defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serializes the configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Writes the configuration to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Rejects values the renderer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.frames_in_flight, "frames_in_flight"),
            (self.max_objects, "max_objects"),
            (self.max_lights, "max_lights"),
            (self.max_textures, "max_textures"),
            (self.shadow.max_objects, "shadow.max_objects"),
            (self.shadow.map_size as usize, "shadow.map_size"),
        ];
        if let Some((_, name)) = checks.iter().find(|(value, _)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        if self.shadow.cascades > MAX_CASCADES {
            return Err(ConfigError::Invalid(format!(
                "shadow.cascades must be at most {MAX_CASCADES}"
            )));
        }
        if !(1..=MAX_OCCLUSION_SAMPLES as u32).contains(&self.occlusion.samples) {
            return Err(ConfigError::Invalid(format!(
                "occlusion.samples must be between 1 and {MAX_OCCLUSION_SAMPLES}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_light_settings() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.lighting.settings(), LightSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let config = RendererConfig::from_ron_str(
            "(frames_in_flight: 3, shadow: (map_size: 1024), post_process: (lut: \"warm.png\"))",
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.shadow.map_size, 1024);
        assert_eq!(config.shadow.max_objects, 1000);
        assert_eq!(config.post_process.lut, "warm.png");
        assert_eq!(config.max_objects, 2000);
        assert!(config.occlusion.enabled);
        assert_eq!(config.occlusion.samples, 32);
    }

    #[test]
    fn test_ron_roundtrip() {
        let mut config = RendererConfig::default();
        config.max_lights = 8;
        config.lighting.shadow_bias = 0.01;
        let text = config.to_ron_string().unwrap();
        assert_eq!(RendererConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let err = RendererConfig::from_ron_str("(max_objects: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("max_objects")));
        assert!(matches!(
            RendererConfig::from_ron_str("(shadow: (cascades: 9))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(occlusion: (samples: 0))"),
            Err(ConfigError::Invalid(ref msg)) if msg.contains("occlusion.samples")
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(max_objects: "),
            Err(ConfigError::Parse(_))
        ));
    }
}
