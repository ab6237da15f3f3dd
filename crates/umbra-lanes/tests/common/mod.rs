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

//! Shared fixture for end-to-end frame recording on the headless device.

#![allow(dead_code)]

use std::sync::Arc;
use umbra_core::math::{Extent2D, Mat4, Vec3};
use umbra_core::renderer::{GpuAssets, GraphicsDevice, MeshRef, TextureRef};
use umbra_infra::graphics::headless::Submission;
use umbra_infra::{HeadlessDevice, MeshStore, ShaderLibrary, TextureStore};
use umbra_lanes::config::ShadowConfig;
use umbra_lanes::render_lane::shaders::BUILTIN_SHADERS;
use umbra_lanes::{FrameArgs, RenderContext, Renderer, RendererConfig};

pub const EXTENT: Extent2D = Extent2D {
    width: 64,
    height: 64,
};

pub const BROKEN_SOURCE: &str = "@vertex fn vs_main() {}";

pub struct Harness {
    pub device: HeadlessDevice,
    pub shaders: Arc<ShaderLibrary>,
    pub meshes: Arc<MeshStore>,
    pub textures: Arc<TextureStore>,
    pub quad: MeshRef,
}

impl Harness {
    /// Every built-in shader compiled, a quad mesh and the default LUT resident.
    pub fn new() -> Self {
        let harness = Self::uncompiled();
        harness.compile();
        harness.upload_lut();
        harness
    }

    /// Built-in shaders registered but not compiled, no LUT.
    pub fn uncompiled() -> Self {
        umbra_infra::logging::init_for_tests();
        let device = HeadlessDevice::new();
        let handle: Arc<dyn GraphicsDevice> = Arc::new(device.clone());

        let shaders = Arc::new(ShaderLibrary::new());
        for shader in BUILTIN_SHADERS {
            shaders
                .register(shader.name, shader.source, shader.texture_slots.iter().copied())
                .unwrap();
        }

        let meshes = Arc::new(MeshStore::new(Arc::clone(&handle)));
        let vertices = [[0.0f32; 8]; 4];
        let quad = meshes.upload(&vertices, &[0, 1, 2, 2, 3, 0]).unwrap();
        let textures = Arc::new(TextureStore::new(handle).unwrap());

        Self {
            device,
            shaders,
            meshes,
            textures,
            quad,
        }
    }

    pub fn compile(&self) {
        self.shaders.queue_all().unwrap();
        self.shaders.process_pending(&self.device).unwrap();
    }

    pub fn lut(&self) -> TextureRef {
        TextureRef::from_path(&RendererConfig::default().post_process.lut)
    }

    pub fn upload_lut(&self) {
        self.textures
            .upload_path(
                &RendererConfig::default().post_process.lut,
                Extent2D::new(16, 4),
                &[128; 16 * 4 * 4],
            )
            .unwrap();
    }

    pub fn assets(&self) -> GpuAssets {
        GpuAssets {
            shaders: self.shaders.clone(),
            meshes: self.meshes.clone(),
            textures: self.textures.clone(),
        }
    }

    pub fn context(&self, config: RendererConfig) -> RenderContext {
        RenderContext::new(Arc::new(self.device.clone()), self.assets(), config, EXTENT).unwrap()
    }

    pub fn renderer(&self) -> Renderer {
        self.renderer_with(config())
    }

    pub fn renderer_with(&self, config: RendererConfig) -> Renderer {
        Renderer::new(self.context(config)).unwrap()
    }

    /// The single submission of the last rendered frame.
    pub fn last_submission(&self) -> Submission {
        let mut submissions = self.device.take_submissions();
        assert_eq!(submissions.len(), 1, "one command buffer per frame");
        submissions.remove(0)
    }

    pub fn live(&self) -> usize {
        self.device.live_resources().unwrap().total()
    }

    pub fn destroy_assets(&self) {
        self.meshes.destroy().unwrap();
        self.textures.destroy().unwrap();
        self.shaders.destroy(&self.device).unwrap();
    }
}

/// A renderer configuration small enough to keep tests fast.
pub fn config() -> RendererConfig {
    RendererConfig {
        max_objects: 64,
        max_lights: 8,
        max_textures: 16,
        shadow: ShadowConfig {
            map_size: 128,
            max_objects: 64,
            cascades: 2,
        },
        ..RendererConfig::default()
    }
}

/// A camera at (0, 0, 5) looking at the origin.
pub fn frame(frame_index: u64) -> FrameArgs {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y).unwrap();
    let projection = Mat4::perspective_rh_zo(1.0, 1.0, 0.1, 100.0).unwrap();
    FrameArgs::new(frame_index, view, projection, EXTENT)
}

/// Pipeline labels of every draw, in submission order.
pub fn draw_labels(submission: &Submission) -> Vec<String> {
    submission
        .draws
        .iter()
        .map(|draw| draw.pipeline_label.clone().unwrap_or_default())
        .collect()
}

/// Number of draws whose pipeline carries `label`.
pub fn count(submission: &Submission, label: &str) -> usize {
    submission
        .draws
        .iter()
        .filter(|draw| draw.pipeline_label.as_deref() == Some(label))
        .count()
}
