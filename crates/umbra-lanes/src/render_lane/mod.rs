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

//! Rendering lane - the passes of a frame.
//!
//! Every pass owns its caches, staging buffers and render plan; nothing is
//! shared between passes except the render targets and the shadow cascade
//! cache, which the shadow pass writes and the lit passes read.

mod blur;
mod deferred;
mod depth;
mod forward;
mod output;
mod post_process;
mod renderer;
pub mod shaders;
mod shadow;
mod ssao;
mod targets;
mod ui;

pub use blur::*;
pub use deferred::*;
pub use depth::*;
pub use forward::*;
pub use output::*;
pub use post_process::*;
pub use renderer::*;
pub use shadow::*;
pub use ssao::*;
pub use targets::*;
pub use ui::*;

use crate::config::RendererConfig;
use crate::error::PassError;
use crate::frame::FrameArgs;
use crate::material::{
    MaterialSorter, PassTarget, PipelineCache, PipelineMaker, SorterMaker, SorterOptions,
};
use std::sync::Arc;
use umbra_core::math::Extent2D;
use umbra_core::renderer::{
    AddressMode, ClearValue, CommandEncoder, CompareFunction, CullMode, DrawPass, FilterMode,
    GpuAssets, GpuTexture, GraphicsDevice, MaterialDef, PipelineLayoutId, PrimitiveTopology,
    RenderPassLayout, ResourceError, SamplerDescriptor, TextureDescriptor, TextureFormat,
    TextureId, TextureUsage, TextureViewDescriptor, VertexLayout,
};
use umbra_core::scene::SceneNode;

/// One stage of a frame.
///
/// A pass is stateless between frames apart from its caches: everything a
/// frame needs arrives through [`FrameArgs`] and the scene root.
pub trait Pass: Send + Sync {
    /// A human-readable identifier, for diagnostics.
    fn name(&self) -> &'static str;

    /// Records the pass for one frame.
    ///
    /// Work whose shaders or assets are still loading is skipped silently.
    /// Errors are fatal: GPU failures, capacity overflows, and pass shaders
    /// that can never compile.
    fn record(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        frame: &FrameArgs,
        scene: &dyn SceneNode,
    ) -> Result<(), PassError>;

    /// Releases every GPU object the pass owns. Must be called before the
    /// device is destroyed; recording afterwards fails.
    fn destroy(&mut self) -> Result<(), PassError>;
}

/// Everything passes are built from.
#[derive(Debug)]
pub struct RenderContext {
    /// The device every GPU object is created on.
    pub device: Arc<dyn GraphicsDevice>,
    /// Shader, mesh and texture lookups.
    pub assets: GpuAssets,
    /// Renderer settings.
    pub config: Arc<RendererConfig>,
    /// Size of the render targets.
    pub extent: Extent2D,
    fallback_texture: TextureId,
    fallback: GpuTexture,
}

impl RenderContext {
    /// Creates the context and its 1x1 white fallback texture.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: GpuAssets,
        config: RendererConfig,
        extent: Extent2D,
    ) -> Result<Self, ResourceError> {
        let fallback_texture = device.create_texture(&TextureDescriptor {
            label: Some("fallback".into()),
            size: Extent2D::square(1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        })?;
        device.write_texture(fallback_texture, &[255; 4])?;
        let view = device.create_texture_view(fallback_texture, &TextureViewDescriptor::default())?;
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("fallback".into()),
            filter: FilterMode::Nearest,
            address_mode: AddressMode::ClampToEdge,
        })?;
        Ok(Self {
            device,
            assets,
            config: Arc::new(config),
            extent,
            fallback_texture,
            fallback: GpuTexture { view, sampler },
        })
    }

    /// Texture bound to every empty sampler slot. Its sampler also reads
    /// the pass inputs (nearest, clamped).
    pub fn fallback(&self) -> GpuTexture {
        self.fallback
    }

    /// Number of frames in flight.
    pub fn frames(&self) -> usize {
        self.config.frames_in_flight
    }

    /// A material sorter drawing into `target`.
    pub fn sorter(
        &self,
        target: PassTarget,
        max_objects: usize,
        lit: bool,
        default: MaterialDef,
    ) -> Result<MaterialSorter, ResourceError> {
        let options = SorterOptions {
            max_objects,
            max_lights: lit.then_some(self.config.max_lights),
            max_textures: self.config.max_textures,
        };
        let maker = SorterMaker::new(
            Arc::clone(&self.device),
            self.assets.clone(),
            target,
            options,
            self.fallback,
        )?;
        Ok(MaterialSorter::new(maker, self.frames(), default))
    }

    /// A pipeline cache for a pass that owns its descriptor sets.
    pub fn pipelines(
        &self,
        layout: PipelineLayoutId,
        target: PassTarget,
        default: MaterialDef,
    ) -> PipelineCache {
        let maker = PipelineMaker::new(
            Arc::clone(&self.device),
            Arc::clone(&self.assets.shaders),
            layout,
            target,
        );
        PipelineCache::new(maker, 1, default)
    }

    /// Destroys the fallback texture.
    pub fn destroy(&self) -> Result<(), ResourceError> {
        self.device.destroy_sampler(self.fallback.sampler)?;
        self.device.destroy_texture_view(self.fallback.view)?;
        self.device.destroy_texture(self.fallback_texture)
    }
}

/// The material of a pass-owned full-screen triangle: no vertex input, no
/// depth, no culling.
pub fn fullscreen_material(shader: &str) -> MaterialDef {
    MaterialDef {
        shader: shader.to_owned(),
        vertex_layout: VertexLayout::Generated,
        depth_test: false,
        depth_write: false,
        depth_clamp: false,
        depth_func: CompareFunction::Always,
        cull_mode: CullMode::None,
        primitive: PrimitiveTopology::TriangleList,
        transparent: false,
        pass: DrawPass::Deferred,
    }
}

/// Fails when a destroyed pass is recorded.
pub(crate) fn ensure_alive(destroyed: bool, name: &'static str) -> Result<(), PassError> {
    if destroyed {
        Err(PassError::Destroyed(name))
    } else {
        Ok(())
    }
}

/// One clear value per attachment of `layout`, in attachment order.
pub(crate) fn clear_values(layout: &RenderPassLayout) -> Vec<ClearValue> {
    layout
        .color_attachments
        .iter()
        .map(|attachment| ClearValue::Color(attachment.clear))
        .chain(
            layout
                .depth
                .iter()
                .map(|depth| ClearValue::Depth(depth.clear_depth)),
        )
        .collect()
}
