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

use super::{clear_values, ensure_alive, Pass, RenderContext, RenderTarget};
use crate::config::RendererConfig;
use crate::error::PassError;
use crate::frame::FrameArgs;
use crate::material::{
    DrawOrder, MaterialSorter, PassTarget, ShadowMaps, SorterMaker, SorterOptions,
};
use ahash::AHashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use umbra_core::math::Extent2D;
use umbra_core::renderer::{
    AccessFlags, AddressMode, CameraUniform, ClearValue, CommandEncoder, CullMode,
    DepthAttachment, DrawPass, FilterMode, FramebufferDescriptor, FramebufferId, GpuAssets,
    GpuTexture, GraphicsDevice, ImageLayout, LoadOp, MaterialDef, PipelineStages,
    RenderGraphDescriptor, RenderPassBeginInfo, RenderPassId, RenderPassLayout, ResourceError,
    SamplerDescriptor, SamplerId, StoreOp, Subpass, SubpassDependency, SubpassRef,
    TextureFormat, TextureUsage, TextureViewId, VertexLayout,
};
use umbra_core::scene::{Drawable, Light, LightId, LightKind, Query, SceneNode};

/// The depth map of one cascade and the sorter that renders it.
#[derive(Debug)]
pub struct ShadowCascade {
    /// The sampled depth target.
    pub target: RenderTarget,
    /// Framebuffer over `target`.
    pub framebuffer: FramebufferId,
    /// Casters drawn from the light's point of view.
    pub sorter: MaterialSorter,
}

impl ShadowCascade {
    fn destroy(&mut self, device: &dyn GraphicsDevice) -> Result<(), PassError> {
        self.sorter.destroy()?;
        device.destroy_framebuffer(self.framebuffer)?;
        Ok(self.target.destroy(device)?)
    }
}

/// Everything needed to create a cascade on first use.
#[derive(Debug)]
struct CascadeFactory {
    device: Arc<dyn GraphicsDevice>,
    assets: GpuAssets,
    config: Arc<RendererConfig>,
    fallback: GpuTexture,
    layout: RenderPassLayout,
    render_pass: RenderPassId,
}

impl CascadeFactory {
    fn create(&self, light: LightId, index: usize) -> Result<ShadowCascade, PassError> {
        let device = self.device.as_ref();
        let label = format!("shadow {:#x}/{index}", light.0);
        let extent = Extent2D::square(self.config.shadow.map_size);
        let target = RenderTarget::new(
            device,
            &label,
            extent,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED,
        )?;
        let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
            label: Some(label.as_str().into()),
            render_pass: self.render_pass,
            attachments: vec![target.view].into(),
            extent,
        })?;
        let maker = SorterMaker::new(
            Arc::clone(&self.device),
            self.assets.clone(),
            PassTarget::new(ShadowPass::NAME, &self.layout, self.render_pass, 0),
            SorterOptions {
                max_objects: self.config.shadow.max_objects,
                max_lights: None,
                max_textures: self.config.max_textures,
            },
            self.fallback,
        )?;
        let sorter = MaterialSorter::new(
            maker,
            self.config.frames_in_flight,
            MaterialDef::standard_deferred(),
        )
        .with_transform(Box::new(ShadowPass::shadow_material));
        Ok(ShadowCascade {
            target,
            framebuffer,
            sorter,
        })
    }
}

/// Shadow maps keyed by light and cascade, created the first time a
/// cascade is rendered.
///
/// Written by the [`ShadowPass`], read by every lit pass through
/// [`ShadowMaps`]. Destroying maps bumps the generation so readers drop
/// the sampler slots that pointed at them.
#[derive(Debug)]
pub struct ShadowCascadeCache {
    factory: CascadeFactory,
    clear_values: Vec<ClearValue>,
    sampler: SamplerId,
    cascades: AHashMap<(LightId, usize), ShadowCascade>,
    generation: u64,
}

impl ShadowCascadeCache {
    /// Compiles the shadow render pass and creates the comparison sampler.
    pub fn new(context: &RenderContext) -> Result<Self, PassError> {
        let device = Arc::clone(&context.device);
        let layout = ShadowPass::graph().compile()?;
        let render_pass = device.create_render_pass(&layout)?;
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("shadow maps".into()),
            filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
        })?;
        Ok(Self {
            clear_values: clear_values(&layout),
            factory: CascadeFactory {
                device,
                assets: context.assets.clone(),
                config: Arc::clone(&context.config),
                fallback: context.fallback(),
                layout,
                render_pass,
            },
            sampler,
            cascades: AHashMap::new(),
            generation: 0,
        })
    }

    /// The shadow render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.factory.render_pass
    }

    /// The cascade of `light`, created on first request.
    pub fn get_or_create(
        &mut self,
        light: LightId,
        index: usize,
    ) -> Result<&mut ShadowCascade, PassError> {
        match self.cascades.entry((light, index)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let cascade = self.factory.create(light, index)?;
                log::info!(
                    "ShadowCascadeCache: Created cascade {index} of light {:#x}",
                    light.0
                );
                Ok(entry.insert(cascade))
            }
        }
    }

    /// The cascade of `light`, if it was rendered before.
    pub fn get(&self, light: LightId, index: usize) -> Option<&ShadowCascade> {
        self.cascades.get(&(light, index))
    }

    /// Number of cascades alive.
    pub fn len(&self) -> usize {
        self.cascades.len()
    }

    /// Returns `true` before the first cascade is rendered.
    pub fn is_empty(&self) -> bool {
        self.cascades.is_empty()
    }

    /// Destroys every cascade of `light`.
    ///
    /// Returns the number of cascades destroyed.
    pub fn invalidate(&mut self, light: LightId) -> Result<usize, PassError> {
        let keys = self
            .cascades
            .keys()
            .filter(|(owner, _)| *owner == light)
            .copied()
            .collect::<Vec<_>>();
        for key in &keys {
            if let Some(mut cascade) = self.cascades.remove(key) {
                cascade.destroy(self.factory.device.as_ref())?;
            }
        }
        if !keys.is_empty() {
            self.generation += 1;
            log::debug!(
                "ShadowCascadeCache: Dropped {} cascades of light {:#x}",
                keys.len(),
                light.0
            );
        }
        Ok(keys.len())
    }

    /// Destroys every cascade, the sampler and the render pass.
    pub fn destroy(&mut self) -> Result<(), PassError> {
        let device = Arc::clone(&self.factory.device);
        for (_, mut cascade) in self.cascades.drain() {
            cascade.destroy(device.as_ref())?;
        }
        self.generation += 1;
        device.destroy_sampler(self.sampler)?;
        device.destroy_render_pass(self.factory.render_pass)?;
        Ok(())
    }
}

impl ShadowMaps for ShadowCascadeCache {
    fn shadowmap(&self, light: LightId, cascade: usize) -> Option<GpuTexture> {
        self.get(light, cascade).map(|cascade| GpuTexture {
            view: cascade.target.view,
            sampler: self.sampler,
        })
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn cascade_limit(&self) -> usize {
        self.factory.config.shadow.cascades
    }
}

fn poisoned(e: impl std::fmt::Display) -> PassError {
    PassError::Resource(ResourceError::BackendError(format!(
        "Mutex poisoned (shadow cascades): {e}"
    )))
}

/// Shared read access for the lit passes.
pub(crate) fn read_cascades(
    cascades: &RwLock<ShadowCascadeCache>,
) -> Result<RwLockReadGuard<'_, ShadowCascadeCache>, PassError> {
    cascades.read().map_err(poisoned)
}

pub(crate) fn write_cascades(
    cascades: &RwLock<ShadowCascadeCache>,
) -> Result<RwLockWriteGuard<'_, ShadowCascadeCache>, PassError> {
    cascades.write().map_err(poisoned)
}

/// Renders the cascaded shadow maps of every shadow-casting directional
/// light.
///
/// Cascades are created lazily, the first frame a light needs them, and
/// live until the light is invalidated or the pass destroyed. Casters are
/// not culled against the viewer: geometry outside the view still throws
/// shadows into it.
#[derive(Debug)]
pub struct ShadowPass {
    cascades: Arc<RwLock<ShadowCascadeCache>>,
    destroyed: bool,
}

impl ShadowPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "shadow";

    /// The render graph of one cascade.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .depth(
                DepthAttachment::new("shadowmap")
                    .ops(LoadOp::Clear, StoreOp::Store)
                    .layouts(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
            )
            .subpass(Subpass::new("shadow").with_depth())
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("shadow"),
                src_stages: PipelineStages::FRAGMENT_SHADER,
                dst_stages: PipelineStages::EARLY_FRAGMENT_TESTS,
                src_access: AccessFlags::SHADER_READ,
                dst_access: AccessFlags::DEPTH_ATTACHMENT_WRITE,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named("shadow"),
                dst: SubpassRef::External,
                src_stages: PipelineStages::LATE_FRAGMENT_TESTS,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::DEPTH_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                by_region: false,
            })
    }

    /// Casters draw depth only, culling front faces, with depth clamping so
    /// geometry behind the light's near plane still casts.
    pub fn shadow_material(def: &MaterialDef) -> MaterialDef {
        def.with_shader("pass/shadow")
            .with_cull_mode(CullMode::Front)
            .with_depth(true, true, true)
            .with_transparent(false)
    }

    /// Creates the pass and its (empty) cascade cache.
    pub fn new(context: &RenderContext) -> Result<Self, PassError> {
        let cascades = ShadowCascadeCache::new(context)?;
        log::info!(
            "ShadowPass: Created ({}x{} maps, up to {} cascades)",
            context.config.shadow.map_size,
            context.config.shadow.map_size,
            context.config.shadow.cascades
        );
        Ok(Self {
            cascades: Arc::new(RwLock::new(cascades)),
            destroyed: false,
        })
    }

    /// The cascade cache, shared with the passes that sample it.
    pub fn cascades(&self) -> Arc<RwLock<ShadowCascadeCache>> {
        Arc::clone(&self.cascades)
    }

    /// The view of a cascade's depth map, once the cascade was rendered.
    pub fn shadowmap(&self, light: LightId, cascade: usize) -> Option<TextureViewId> {
        read_cascades(&self.cascades)
            .ok()?
            .shadowmap(light, cascade)
            .map(|texture| texture.view)
    }

    /// Destroys the cascades of a light that left the scene or changed.
    pub fn invalidate(&self, light: LightId) -> Result<usize, PassError> {
        write_cascades(&self.cascades)?.invalidate(light)
    }
}

impl Pass for ShadowPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn record(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        frame: &FrameArgs,
        scene: &dyn SceneNode,
    ) -> Result<(), PassError> {
        ensure_alive(self.destroyed, Self::NAME)?;
        let lights = Query::<dyn Light>::new()
            .filter(|l| l.kind() == LightKind::Directional && l.cast_shadows())
            .collect(scene);
        if lights.is_empty() {
            return Ok(());
        }
        let casters = Query::<dyn Drawable>::new()
            .filter(|d| d.cast_shadows() && d.draw_pass() != DrawPass::Ui)
            .filter(|d| d.vertex_layout() == VertexLayout::Standard)
            .collect(scene);

        let mut cache = write_cascades(&self.cascades)?;
        let map_size = cache.factory.config.shadow.map_size as f32;
        let max_cascades = cache.factory.config.shadow.cascades;
        let render_pass = cache.render_pass();
        let clear_values = cache.clear_values.clone();

        for light in lights {
            for index in 0..light.cascade_count().min(max_cascades) {
                let Some(view) = light.cascade(index) else {
                    continue;
                };
                let camera = CameraUniform::new(
                    view.view,
                    view.proj,
                    view.view.inverse_or_identity().translation(),
                    light.direction(),
                    [map_size, map_size],
                    1.0,
                );
                let cascade = cache.get_or_create(light.id(), index)?;
                let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
                    render_pass,
                    framebuffer: cascade.framebuffer,
                    clear_values: clear_values.clone(),
                });
                cascade.sorter.draw(
                    pass.as_mut(),
                    frame,
                    &camera,
                    &casters,
                    None,
                    DrawOrder::Coalesced,
                )?;
            }
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        write_cascades(&self.cascades)?.destroy()
    }
}
