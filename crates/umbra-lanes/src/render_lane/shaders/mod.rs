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

//! Built-in WGSL sources of the passes.
//!
//! Every source is prefixed with the shared declarations of `common.wgsl`
//! (and `lights.wgsl` for lit shaders). Register [`BUILTIN_SHADERS`] with the
//! shader provider before the first frame:
//!
//! ```ignore
//! for shader in umbra_lanes::render_lane::shaders::BUILTIN_SHADERS {
//!     library.register(shader.name, shader.source, shader.texture_slots)?;
//! }
//! ```

/// A named shader source and the material texture slots it samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinShader {
    /// Registry name, as referenced by material definitions.
    pub name: &'static str,
    /// WGSL source with `vs_main` and `fs_main` entry points.
    pub source: &'static str,
    /// Texture slots, in object record order.
    pub texture_slots: &'static [&'static str],
}

/// Depth-only geometry.
pub const DEPTH_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("depth.wgsl"));

/// Shadow cascade depth.
pub const SHADOW_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("shadow.wgsl"));

/// G-buffer fill.
pub const DEFERRED_TEXTURED_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("deferred_textured.wgsl")
);

/// Full-screen deferred lighting.
pub const LIGHTING_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("lights.wgsl"),
    include_str!("lighting.wgsl")
);

/// Lit forward geometry.
pub const FORWARD_TEXTURED_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("lights.wgsl"),
    include_str!("forward_textured.wgsl")
);

/// Unlit debug lines.
pub const FORWARD_LINES_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("forward_lines.wgsl")
);

/// Half-resolution ambient occlusion from the depth pre-pass.
pub const SSAO_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("ssao.wgsl"));

/// Box blur of the raw ambient occlusion.
pub const BLUR_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("blur.wgsl"));

/// Tone mapping and LUT colour grading.
pub const POSTPROCESS_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("postprocess.wgsl")
);

/// Blit to the presentation target.
pub const OUTPUT_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("output.wgsl"));

/// Screen-space quads.
pub const UI_QUAD_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("ui_quad.wgsl"));

/// Every built-in shader.
pub const BUILTIN_SHADERS: &[BuiltinShader] = &[
    BuiltinShader {
        name: "pass/depth",
        source: DEPTH_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "pass/shadow",
        source: SHADOW_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "pass/ssao",
        source: SSAO_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "pass/blur",
        source: BLUR_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "pass/lighting",
        source: LIGHTING_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "pass/postprocess",
        source: POSTPROCESS_WGSL,
        texture_slots: &["lut"],
    },
    BuiltinShader {
        name: "pass/output",
        source: OUTPUT_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "deferred/textured",
        source: DEFERRED_TEXTURED_WGSL,
        texture_slots: &["diffuse", "normal"],
    },
    BuiltinShader {
        name: "forward/textured",
        source: FORWARD_TEXTURED_WGSL,
        texture_slots: &["diffuse", "normal"],
    },
    BuiltinShader {
        name: "forward/lines",
        source: FORWARD_LINES_WGSL,
        texture_slots: &[],
    },
    BuiltinShader {
        name: "ui/quad",
        source: UI_QUAD_WGSL,
        texture_slots: &["diffuse"],
    },
];

/// Looks up a built-in shader by registry name.
pub fn builtin(name: &str) -> Option<&'static BuiltinShader> {
    BUILTIN_SHADERS.iter().find(|shader| shader.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::renderer::MaterialDef;

    #[test]
    fn test_every_shader_has_both_entry_points() {
        for shader in BUILTIN_SHADERS {
            assert!(shader.source.contains("fn vs_main("), "{}", shader.name);
            assert!(shader.source.contains("fn fs_main("), "{}", shader.name);
        }
    }

    #[test]
    fn test_material_presets_reference_builtins() {
        for def in [
            MaterialDef::standard_deferred(),
            MaterialDef::standard_forward(),
            MaterialDef::transparent_forward(),
            MaterialDef::ui(),
            MaterialDef::lines(),
        ] {
            assert!(builtin(&def.shader).is_some(), "{}", def.shader);
        }
    }

    #[test]
    fn test_lit_shaders_include_light_declarations() {
        assert!(LIGHTING_WGSL.contains("fn light_header()"));
        assert!(FORWARD_TEXTURED_WGSL.contains("fn light_header()"));
        assert!(!DEPTH_WGSL.contains("fn light_header()"));
    }

    #[test]
    fn test_occlusion_bindings_match_lighting() {
        assert!(SSAO_WGSL.contains("@binding(5) var<uniform> params"));
        assert!(BLUR_WGSL.contains("@binding(4) var raw_occlusion"));
        assert!(LIGHTING_WGSL.contains("@binding(7) var occlusion"));
    }
}
