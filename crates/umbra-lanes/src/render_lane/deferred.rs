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

use super::shadow::read_cascades;
use super::{
    clear_values, ensure_alive, fullscreen_material, GBuffer, Pass, RenderContext, RenderTargets,
    ShadowCascadeCache,
};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{
    DrawOrder, MaterialSorter, PassPipeline, PassTarget, PipelineCache, SamplerTable, ShadowMaps,
    ShadowSlots, CAMERA_BINDING, LIGHTS_BINDING, TEXTURES_BINDING,
};
use crate::staging::LightBuffer;
use std::borrow::Cow;
use std::sync::{Arc, RwLock};
use umbra_core::math::LinearRgba;
use umbra_core::renderer::{
    AccessFlags, BindingType, BlendMode, BufferDescriptor, BufferId, CameraUniform, ClearValue,
    ColorAttachment, CommandEncoder, DepthAttachment, DescriptorBinding, DescriptorSetId,
    DescriptorSetLayoutDescriptor, DescriptorSetLayoutId, DescriptorWrite, DrawPass,
    FramebufferId, GpuTexture, GraphicsDevice, ImageLayout, LightSettings, LoadOp, MaterialDef,
    PipelineLayoutDescriptor, PipelineLayoutId, PipelineStages, RenderGraphDescriptor,
    RenderPassBeginInfo, RenderPassId, ResourceError, ShaderStages, StoreOp, Subpass,
    SubpassDependency, SubpassRef, TextureFormat,
};
use umbra_core::scene::{AmbientLight, Drawable, Light, NoShadows, Query, SceneNode};

/// Input attachment bindings of the lighting set, in G-buffer order.
pub const GBUFFER_BINDINGS: [u32; 3] = [4, 5, 6];

/// Binding of the blurred ambient occlusion in the lighting set.
pub const OCCLUSION_BINDING: u32 = 7;

/// Per-frame resources of the lighting subpass.
#[derive(Debug)]
struct LightingFrame {
    descriptor_set: DescriptorSetId,
    camera: BufferId,
    lights: LightBuffer,
    textures: SamplerTable,
    shadow_generation: u64,
}

impl LightingFrame {
    fn new(
        device: &dyn GraphicsDevice,
        layout: DescriptorSetLayoutId,
        gbuffer: &GBuffer,
        max_lights: usize,
        max_textures: usize,
        fallback: GpuTexture,
        occlusion: GpuTexture,
    ) -> Result<Self, ResourceError> {
        let descriptor_set = device.create_descriptor_set(layout)?;
        let camera =
            device.create_buffer(&BufferDescriptor::uniform::<CameraUniform>("lighting camera"))?;
        let lights = LightBuffer::new(device, max_lights)?;
        let views = [gbuffer.diffuse.view, gbuffer.normal.view, gbuffer.position.view];
        let mut writes = vec![
            DescriptorWrite::buffer(CAMERA_BINDING, camera),
            DescriptorWrite::buffer(LIGHTS_BINDING, lights.buffer()),
            DescriptorWrite::texture(OCCLUSION_BINDING, 0, occlusion.view, occlusion.sampler),
        ];
        writes.extend(
            GBUFFER_BINDINGS
                .iter()
                .zip(views)
                .map(|(&binding, view)| DescriptorWrite::input(binding, view)),
        );
        device.update_descriptor_set(descriptor_set, &writes)?;
        Ok(Self {
            descriptor_set,
            camera,
            lights,
            textures: SamplerTable::new(descriptor_set, TEXTURES_BINDING, max_textures, fallback),
            shadow_generation: 0,
        })
    }

    fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.lights.destroy(device)?;
        device.destroy_buffer(self.camera)?;
        device.destroy_descriptor_set(self.descriptor_set)
    }
}

/// Deferred shading of opaque geometry.
///
/// The geometry subpass writes albedo, normal and position into the
/// G-buffer; the lighting subpass reads them back as input attachments and
/// adds one full-screen triangle per light into the HDR output. Light 0 of
/// the buffer is the configured ambient term, attenuated by the blurred
/// ambient occlusion when that is enabled.
#[derive(Debug)]
pub struct DeferredPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    gbuffers: PerFrame<GBuffer>,
    framebuffers: PerFrame<FramebufferId>,
    geometry: MaterialSorter,
    lighting: PipelineCache,
    lighting_def: MaterialDef,
    set_layout: DescriptorSetLayoutId,
    pipeline_layout: PipelineLayoutId,
    frames: PerFrame<LightingFrame>,
    ambient: AmbientLight,
    settings: LightSettings,
    shadows: Option<Arc<RwLock<ShadowCascadeCache>>>,
    destroyed: bool,
}

impl DeferredPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "deferred";
    /// Name of the first subpass.
    pub const GEOMETRY: &'static str = "geometry";
    /// Name of the second subpass.
    pub const LIGHTING: &'static str = "lighting";

    /// The render graph of the pass.
    pub fn graph(clear_color: LinearRgba) -> RenderGraphDescriptor {
        let gbuffer = |name: &str, format| {
            ColorAttachment::new(name, format).ops(LoadOp::Clear, StoreOp::Discard)
        };
        RenderGraphDescriptor::new(Self::NAME)
            .color(gbuffer("diffuse", TextureFormat::Rgba8Unorm))
            .color(gbuffer("normal", TextureFormat::Rgba16Float))
            .color(gbuffer("position", TextureFormat::Rgba32Float))
            .color(
                ColorAttachment::new("output", TextureFormat::Rgba16Float)
                    .clear(clear_color)
                    .blend(BlendMode::Additive),
            )
            .depth(
                DepthAttachment::new("depth")
                    .ops(LoadOp::Load, StoreOp::Store)
                    .layouts(ImageLayout::DepthAttachment, ImageLayout::DepthAttachment),
            )
            .subpass(
                Subpass::new(Self::GEOMETRY)
                    .writes(["diffuse", "normal", "position"])
                    .with_depth(),
            )
            .subpass(
                Subpass::new(Self::LIGHTING)
                    .reads(["diffuse", "normal", "position"])
                    .writes(["output"]),
            )
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named(Self::GEOMETRY),
                src_stages: PipelineStages::LATE_FRAGMENT_TESTS,
                dst_stages: PipelineStages::EARLY_FRAGMENT_TESTS
                    | PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::DEPTH_ATTACHMENT_WRITE,
                dst_access: AccessFlags::DEPTH_ATTACHMENT_READ
                    | AccessFlags::COLOR_ATTACHMENT_WRITE,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named(Self::LIGHTING),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named(Self::GEOMETRY),
                dst: SubpassRef::named(Self::LIGHTING),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::INPUT_ATTACHMENT_READ,
                by_region: true,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named(Self::LIGHTING),
                dst: SubpassRef::External,
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT
                    | PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::SHADER_READ,
                by_region: false,
            })
    }

    /// Builds the pass against the frame targets.
    pub fn new(context: &RenderContext, targets: &RenderTargets) -> Result<Self, PassError> {
        let device = Arc::clone(&context.device);
        let config = &context.config;
        let layout = Self::graph(config.clear_color).compile()?;
        let render_pass = device.create_render_pass(&layout)?;

        let gbuffers = PerFrame::try_new(context.frames(), |_| {
            GBuffer::new(device.as_ref(), targets.extent())
        })?;
        let framebuffers =
            targets.framebuffers(device.as_ref(), Self::NAME, render_pass, |index, frame| {
                let gbuffer = gbuffers.get(index as u64);
                vec![
                    gbuffer.diffuse.view,
                    gbuffer.normal.view,
                    gbuffer.position.view,
                    frame.output.view,
                    frame.depth.view,
                ]
            })?;

        let geometry = context.sorter(
            PassTarget::new(Self::NAME, &layout, render_pass, 0),
            config.max_objects,
            false,
            MaterialDef::standard_deferred(),
        )?;

        let mut bindings = vec![
            DescriptorBinding::new(CAMERA_BINDING, ShaderStages::ALL, BindingType::UniformBuffer),
            DescriptorBinding::new(
                LIGHTS_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::StorageBuffer,
            ),
            DescriptorBinding::new(
                TEXTURES_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::SampledTextureArray {
                    count: config.max_textures as u32,
                },
            ),
        ];
        bindings.extend(GBUFFER_BINDINGS.iter().map(|&binding| {
            DescriptorBinding::new(binding, ShaderStages::FRAGMENT, BindingType::InputAttachment)
        }));
        bindings.push(DescriptorBinding::new(
            OCCLUSION_BINDING,
            ShaderStages::FRAGMENT,
            BindingType::SampledTexture,
        ));
        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: Some("lighting set 0".into()),
            bindings: bindings.into(),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("lighting".into()),
            set_layouts: Cow::Owned(vec![set_layout]),
        })?;
        let lighting_def = fullscreen_material("pass/lighting");
        let lighting = context.pipelines(
            pipeline_layout,
            PassTarget::new(Self::NAME, &layout, render_pass, 1),
            lighting_def.clone(),
        );

        let fallback = context.fallback();
        let frames = PerFrame::try_new(context.frames(), |index| {
            // Unoccluded white when the occlusion passes are off.
            let occlusion = if config.occlusion.enabled {
                GpuTexture {
                    view: targets.frame(index as u64).occlusion_blur.view,
                    sampler: fallback.sampler,
                }
            } else {
                fallback
            };
            LightingFrame::new(
                device.as_ref(),
                set_layout,
                gbuffers.get(index as u64),
                config.max_lights + 1,
                config.max_textures,
                fallback,
                occlusion,
            )
        })?;

        log::info!(
            "DeferredPass: Created ({} frames, {} lights max)",
            context.frames(),
            config.max_lights
        );
        Ok(Self {
            device,
            render_pass,
            clear_values: clear_values(&layout),
            gbuffers,
            framebuffers,
            geometry,
            lighting,
            lighting_def,
            set_layout,
            pipeline_layout,
            frames,
            ambient: AmbientLight::new(
                config.lighting.ambient_color,
                config.lighting.ambient_intensity,
            ),
            settings: config.lighting.settings(),
            shadows: None,
            destroyed: false,
        })
    }

    /// Samples the shadow maps of `cascades` while lighting.
    pub fn with_shadows(mut self, cascades: Arc<RwLock<ShadowCascadeCache>>) -> Self {
        self.shadows = Some(cascades);
        self
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The geometry sorter, for inspection.
    pub fn geometry(&self) -> &MaterialSorter {
        &self.geometry
    }

    /// The G-buffer of a frame.
    pub fn gbuffer(&self, frame_index: u64) -> &GBuffer {
        self.gbuffers.get(frame_index)
    }

    /// The light buffer of a frame, as staged by the last recording.
    pub fn lights(&self, frame_index: u64) -> &LightBuffer {
        &self.frames.get(frame_index).lights
    }

    fn stage_lights(
        &mut self,
        frame: &FrameArgs,
        scene: &dyn SceneNode,
    ) -> Result<usize, PassError> {
        let lights = Query::<dyn Light>::new().collect(scene);
        let guard = match &self.shadows {
            Some(cascades) => Some(read_cascades(cascades)?),
            None => None,
        };
        let maps = guard.as_deref().map(|cache| cache as &dyn ShadowMaps);

        let device = self.device.as_ref();
        let state = self.frames.get_mut(frame.frame_index);
        if let Some(maps) = maps {
            if maps.generation() != state.shadow_generation {
                state.textures.clear();
                state.shadow_generation = maps.generation();
            }
        }
        state.lights.reset();
        state.lights.set_settings(self.settings);
        state.lights.store(self.ambient.light_record(&mut NoShadows))?;
        for light in lights {
            let record = match maps {
                Some(maps) => light.light_record(&mut ShadowSlots::new(maps, &mut state.textures)),
                None => light.light_record(&mut NoShadows),
            };
            state.lights.store(record)?;
        }
        let count = state.lights.flush(device)?;
        state.textures.flush(device)?;
        device.write_buffer(state.camera, 0, bytemuck::bytes_of(&frame.camera_uniform()))?;
        Ok(count)
    }
}

impl Pass for DeferredPass {
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
        let frustum = frame.frustum();
        let drawables = Query::<dyn Drawable>::new()
            .filter(|d| d.draw_pass() == DrawPass::Deferred)
            .filter(|d| frustum.intersects_sphere(&d.bounding_sphere()))
            .collect(scene);
        let lighting = self.lighting.require(Self::NAME, &self.lighting_def)?;
        let light_count = self.stage_lights(frame, scene)?;

        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        self.geometry.draw(
            pass.as_mut(),
            frame,
            &frame.camera_uniform(),
            &drawables,
            None,
            DrawOrder::Coalesced,
        )?;

        pass.next_subpass();
        match lighting {
            PassPipeline::Ready(entry) => {
                pass.set_pipeline(entry.pipeline);
                pass.set_descriptor_set(0, self.frames.get(frame.frame_index).descriptor_set);
                pass.draw(0..3, 1..light_count as u32);
            }
            PassPipeline::Pending => {
                log::trace!("DeferredPass: Lighting shader not ready, skipping");
            }
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let device = self.device.as_ref();
        self.geometry.destroy()?;
        self.lighting.destroy()?;
        for state in self.frames.iter() {
            state.destroy(device)?;
        }
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        device.destroy_descriptor_set_layout(self.set_layout)?;
        for framebuffer in self.framebuffers.iter() {
            device.destroy_framebuffer(*framebuffer)?;
        }
        for gbuffer in self.gbuffers.iter() {
            gbuffer.destroy(device)?;
        }
        device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}
