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

use super::{
    clear_values, ensure_alive, fullscreen_material, Pass, RenderContext, RenderTarget,
    RenderTargets, SOURCE_BINDING,
};
use crate::config::OcclusionConfig;
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{PassPipeline, PassTarget, PipelineCache, CAMERA_BINDING};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::borrow::Cow;
use std::sync::Arc;
use umbra_core::math::{Extent2D, LinearRgba, Vec3, Vec4};
use umbra_core::renderer::{
    AccessFlags, AddressMode, BindingType, BufferDescriptor, BufferId, CameraUniform, ClearValue,
    ColorAttachment, CommandEncoder, DescriptorBinding, DescriptorSetId,
    DescriptorSetLayoutDescriptor, DescriptorSetLayoutId, DescriptorWrite, FilterMode,
    FramebufferId, GraphicsDevice, ImageLayout, LoadOp, MaterialDef, OcclusionParams,
    PipelineLayoutDescriptor, PipelineLayoutId, PipelineStages, RenderGraphDescriptor,
    RenderPassBeginInfo, RenderPassId, SamplerDescriptor, SamplerId, ShaderStages, StoreOp,
    Subpass, SubpassDependency, SubpassRef, TextureFormat, TextureUsage, MAX_OCCLUSION_SAMPLES,
};
use umbra_core::scene::SceneNode;

/// Binding of the sample kernel and its settings.
pub const OCCLUSION_PARAMS_BINDING: u32 = 5;

/// Binding of the rotation noise tile.
pub const NOISE_BINDING: u32 = 6;

/// Edge length of the rotation noise tile.
pub const NOISE_SIZE: u32 = 4;

/// Hemisphere sample offsets around +z, denser near the origin.
///
/// The same seed always yields the same kernel.
pub fn occlusion_kernel(samples: u32, seed: u64) -> Vec<Vec4> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..samples)
        .map(|i| {
            let direction = Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.01..1.0),
            )
            .normalize();
            let t = i as f32 / samples as f32;
            let scale = 0.1 + t * t * 0.9;
            (direction * (rng.random_range(0.0..1.0f32) * scale)).extend(0.0)
        })
        .collect()
}

/// Texels of the rotation noise tile: random unit vectors in the xy plane,
/// packed as `0.5 * v + 0.5`.
pub fn occlusion_noise(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut texels = Vec::with_capacity((NOISE_SIZE * NOISE_SIZE * 4) as usize);
    for _ in 0..NOISE_SIZE * NOISE_SIZE {
        let xy = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            0.0,
        )
        .normalize();
        let pack = |c: f32| ((c * 0.5 + 0.5) * 255.0).round() as u8;
        texels.extend_from_slice(&[pack(xy.x), pack(xy.y), 128, 255]);
    }
    texels
}

/// The uniform block of the occlusion shader for targets of `extent`.
pub fn occlusion_params(config: &OcclusionConfig, extent: Extent2D) -> OcclusionParams {
    let mut kernel = [Vec4::ZERO; MAX_OCCLUSION_SAMPLES];
    let samples = occlusion_kernel(config.samples, config.seed);
    for (slot, sample) in kernel.iter_mut().zip(samples) {
        *slot = sample;
    }
    OcclusionParams {
        kernel,
        samples: config.samples.min(MAX_OCCLUSION_SAMPLES as u32),
        radius: config.radius,
        bias: config.bias,
        power: config.power,
        noise_scale: [
            extent.width as f32 / NOISE_SIZE as f32,
            extent.height as f32 / NOISE_SIZE as f32,
        ],
        scale: 2.0,
        _pad: 0.0,
    }
}

/// The render graph shared by the two occlusion passes: one half-resolution
/// `R16Float` target, cleared to unoccluded and left readable.
///
/// `input_stages` and `input_access` describe how the image the pass
/// samples was written.
pub(crate) fn occlusion_graph(
    name: &str,
    input_stages: PipelineStages,
    input_access: AccessFlags,
) -> RenderGraphDescriptor {
    RenderGraphDescriptor::new(name)
        .color(
            ColorAttachment::new("occlusion", TextureFormat::R16Float)
                .clear(LinearRgba::WHITE)
                .ops(LoadOp::Clear, StoreOp::Store)
                .layouts(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
        )
        .subpass(Subpass::new("main").writes(["occlusion"]))
        .dependency(SubpassDependency {
            src: SubpassRef::External,
            dst: SubpassRef::named("main"),
            src_stages: input_stages,
            dst_stages: PipelineStages::FRAGMENT_SHADER,
            src_access: input_access,
            dst_access: AccessFlags::SHADER_READ,
            by_region: false,
        })
        .dependency(SubpassDependency {
            src: SubpassRef::named("main"),
            dst: SubpassRef::External,
            src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: PipelineStages::FRAGMENT_SHADER,
            src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::SHADER_READ,
            by_region: false,
        })
}

#[derive(Debug)]
struct SsaoFrame {
    descriptor_set: DescriptorSetId,
    camera: BufferId,
}

/// Screen-space ambient occlusion from the depth pre-pass, at half
/// resolution.
///
/// The kernel and noise tile are generated once from the configured seed.
/// The raw result is noisy; [`BlurPass`](super::BlurPass) smooths it before
/// deferred lighting reads it.
#[derive(Debug)]
pub struct SsaoPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    pipelines: PipelineCache,
    material: MaterialDef,
    set_layout: DescriptorSetLayoutId,
    pipeline_layout: PipelineLayoutId,
    frames: PerFrame<SsaoFrame>,
    params: BufferId,
    noise: RenderTarget,
    noise_sampler: SamplerId,
    destroyed: bool,
}

impl SsaoPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "ssao";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        occlusion_graph(
            Self::NAME,
            PipelineStages::LATE_FRAGMENT_TESTS,
            AccessFlags::DEPTH_ATTACHMENT_WRITE,
        )
    }

    /// Builds the pass against the frame targets.
    pub fn new(context: &RenderContext, targets: &RenderTargets) -> Result<Self, PassError> {
        let device = Arc::clone(&context.device);
        let layout = Self::graph().compile()?;
        let render_pass = device.create_render_pass(&layout)?;
        let extent = targets.occlusion_extent();
        let framebuffers = targets.framebuffers_sized(
            device.as_ref(),
            Self::NAME,
            render_pass,
            extent,
            |_, frame| vec![frame.occlusion.view],
        )?;

        let bindings = [
            DescriptorBinding::new(CAMERA_BINDING, ShaderStages::ALL, BindingType::UniformBuffer),
            DescriptorBinding::new(
                SOURCE_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::SampledTexture,
            ),
            DescriptorBinding::new(
                OCCLUSION_PARAMS_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::UniformBuffer,
            ),
            DescriptorBinding::new(
                NOISE_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::SampledTexture,
            ),
        ];
        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: Some("ssao set 0".into()),
            bindings: Cow::Borrowed(&bindings),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(Self::NAME.into()),
            set_layouts: Cow::Owned(vec![set_layout]),
        })?;
        let material = fullscreen_material("pass/ssao");
        let pipelines = context.pipelines(
            pipeline_layout,
            PassTarget::new(Self::NAME, &layout, render_pass, 0),
            material.clone(),
        );

        let config = &context.config.occlusion;
        let params =
            device.create_buffer(&BufferDescriptor::uniform::<OcclusionParams>("ssao params"))?;
        device.write_buffer(
            params,
            0,
            bytemuck::bytes_of(&occlusion_params(config, extent)),
        )?;
        let noise = RenderTarget::new(
            device.as_ref(),
            "ssao noise",
            Extent2D::square(NOISE_SIZE),
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        )?;
        device.write_texture(noise.texture, &occlusion_noise(config.seed))?;
        let noise_sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("ssao noise".into()),
            filter: FilterMode::Nearest,
            address_mode: AddressMode::Repeat,
        })?;

        let fallback = context.fallback();
        let frames = PerFrame::try_new(context.frames(), |index| {
            let descriptor_set = device.create_descriptor_set(set_layout)?;
            let camera =
                device.create_buffer(&BufferDescriptor::uniform::<CameraUniform>("ssao camera"))?;
            let depth = targets.frame(index as u64).depth.view;
            device.update_descriptor_set(
                descriptor_set,
                &[
                    DescriptorWrite::buffer(CAMERA_BINDING, camera),
                    DescriptorWrite::texture(SOURCE_BINDING, 0, depth, fallback.sampler),
                    DescriptorWrite::buffer(OCCLUSION_PARAMS_BINDING, params),
                    DescriptorWrite::texture(NOISE_BINDING, 0, noise.view, noise_sampler),
                ],
            )?;
            Ok::<_, PassError>(SsaoFrame {
                descriptor_set,
                camera,
            })
        })?;

        log::info!(
            "SsaoPass: Created ({}x{}, {} samples)",
            extent.width,
            extent.height,
            config.samples
        );
        Ok(Self {
            device,
            render_pass,
            clear_values: clear_values(&layout),
            framebuffers,
            pipelines,
            material,
            set_layout,
            pipeline_layout,
            frames,
            params,
            noise,
            noise_sampler,
            destroyed: false,
        })
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The uniform buffer holding the kernel.
    pub fn params(&self) -> BufferId {
        self.params
    }
}

impl Pass for SsaoPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn record(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        frame: &FrameArgs,
        _scene: &dyn SceneNode,
    ) -> Result<(), PassError> {
        ensure_alive(self.destroyed, Self::NAME)?;
        let pipeline = self.pipelines.require(Self::NAME, &self.material)?;
        let state = self.frames.get(frame.frame_index);
        self.device.write_buffer(
            state.camera,
            0,
            bytemuck::bytes_of(&frame.camera_uniform()),
        )?;

        // Cleared to unoccluded even while the shader compiles.
        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        if let PassPipeline::Ready(entry) = pipeline {
            pass.set_pipeline(entry.pipeline);
            pass.set_descriptor_set(0, state.descriptor_set);
            pass.draw(0..3, 0..1);
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let device = self.device.as_ref();
        self.pipelines.destroy()?;
        for state in self.frames.iter() {
            device.destroy_descriptor_set(state.descriptor_set)?;
            device.destroy_buffer(state.camera)?;
        }
        device.destroy_buffer(self.params)?;
        device.destroy_sampler(self.noise_sampler)?;
        self.noise.destroy(device)?;
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        device.destroy_descriptor_set_layout(self.set_layout)?;
        for framebuffer in self.framebuffers.iter() {
            device.destroy_framebuffer(*framebuffer)?;
        }
        device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}
