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

//! GPU-side record layouts shared by the passes and the shaders.
//!
//! All types are `#[repr(C)]` and `Pod` so staging buffers can be flushed with
//! a single byte copy.

use crate::math::{LinearRgba, Mat4, Vec3, Vec4};
use crate::renderer::traits::GpuMesh;
use bytemuck::{Pod, Zeroable};

/// Maximum number of shadow cascades a light record can carry.
pub const MAX_CASCADES: usize = 4;

/// Number of texture slots an object record can reference.
pub const OBJECT_TEXTURE_SLOTS: usize = 4;

/// Size of the ambient occlusion sample kernel.
pub const MAX_OCCLUSION_SAMPLES: usize = 32;

/// Per-object instance data, indexed by `instance_index` in the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ObjectRecord {
    /// Object to world transform.
    pub model: Mat4,
    /// Sampler table slots, in the order of the shader's texture slots.
    pub textures: [u32; OBJECT_TEXTURE_SLOTS],
    /// Device address of the vertex data (0 when unused).
    pub vertices: u64,
    /// Device address of the index data (0 when unused).
    pub indices: u64,
}

impl ObjectRecord {
    /// Builds a record for an object drawn with `mesh`.
    pub fn new(
        model: Mat4,
        textures: [u32; OBJECT_TEXTURE_SLOTS],
        mesh: Option<&GpuMesh>,
    ) -> Self {
        Self {
            model,
            textures,
            vertices: mesh.map_or(0, |m| m.vertex_address),
            indices: mesh.map_or(0, |m| m.index_address),
        }
    }
}

/// Camera data bound as a uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct CameraUniform {
    /// Projection.
    pub proj: Mat4,
    /// View.
    pub view: Mat4,
    /// Projection * view.
    pub view_proj: Mat4,
    /// Inverse projection.
    pub proj_inv: Mat4,
    /// Inverse view.
    pub view_inv: Mat4,
    /// Inverse view-projection.
    pub view_proj_inv: Mat4,
    /// Eye position (w = 1).
    pub eye: Vec4,
    /// Forward direction (w = 0).
    pub forward: Vec4,
    /// Viewport size in pixels.
    pub viewport: [f32; 2],
    /// Viewport scale (DPI factor).
    pub scale: f32,
    /// Padding.
    pub _pad: f32,
}

impl CameraUniform {
    /// Builds the uniform from view and projection, deriving every inverse.
    pub fn new(
        view: Mat4,
        proj: Mat4,
        eye: Vec3,
        forward: Vec3,
        viewport: [f32; 2],
        scale: f32,
    ) -> Self {
        let view_proj = proj * view;
        Self {
            proj,
            view,
            view_proj,
            proj_inv: proj.inverse_or_identity(),
            view_inv: view.inverse_or_identity(),
            view_proj_inv: view_proj.inverse_or_identity(),
            eye: eye.extend(1.0),
            forward: forward.extend(0.0),
            viewport,
            scale,
            _pad: 0.0,
        }
    }
}

/// One light in the light buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct LightRecord {
    /// Light-space view-projection per cascade.
    pub view_proj: [Mat4; MAX_CASCADES],
    /// Far split distance per cascade, in view space.
    pub distance: [f32; MAX_CASCADES],
    /// Sampler table slot of each cascade's shadow map (0 = no shadow).
    pub shadowmap: [u32; MAX_CASCADES],
    /// Linear colour.
    pub color: LinearRgba,
    /// World position (w = 1) or direction (w = 0).
    pub position: Vec4,
    /// Constant, linear and quadratic attenuation (w unused).
    pub attenuation: Vec4,
    /// `LightKind` discriminant.
    pub kind: u32,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Range of point lights.
    pub range: f32,
    /// Padding.
    pub _pad: f32,
}

/// The header stored in slot 0 of every light buffer.
///
/// It has the same size as [`LightRecord`] so the light buffer is a plain
/// array of equally sized records.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightSettings {
    /// Ambient colour.
    pub ambient_color: LinearRgba,
    /// Ambient intensity.
    pub ambient_intensity: f32,
    /// Number of light records that follow the header.
    pub count: i32,
    /// PCF kernel samples per axis.
    pub shadow_samples: i32,
    /// PCF kernel radius in texels.
    pub shadow_sample_radius: f32,
    /// Depth bias.
    pub shadow_bias: f32,
    /// Normal offset applied before the shadow lookup.
    pub normal_offset: f32,
    /// Padding.
    pub _pad: [f32; 2],
    /// Unused, pads the header to the size of a light record.
    pub _reserved: [[f32; 4]; 19],
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            ambient_color: LinearRgba::WHITE,
            ambient_intensity: 0.33,
            count: 0,
            shadow_samples: 1,
            shadow_sample_radius: 1.0,
            shadow_bias: 0.005,
            normal_offset: 0.1,
            _pad: [0.0; 2],
            _reserved: [[0.0; 4]; 19],
        }
    }
}

const _: () = assert!(std::mem::size_of::<LightSettings>() == std::mem::size_of::<LightRecord>());

/// Parameters of the screen-space ambient occlusion shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OcclusionParams {
    /// Hemisphere sample offsets in tangent space (w unused).
    pub kernel: [Vec4; MAX_OCCLUSION_SAMPLES],
    /// Number of kernel entries used.
    pub samples: u32,
    /// Sampling radius in view-space units.
    pub radius: f32,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Exponent applied to the final visibility.
    pub power: f32,
    /// Screen texels per noise texel, per axis.
    pub noise_scale: [f32; 2],
    /// Ratio between the depth buffer and the occlusion target size.
    pub scale: f32,
    /// Padding.
    pub _pad: f32,
}
