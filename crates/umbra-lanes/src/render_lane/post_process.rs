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
    RenderTargets,
};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{PassPipeline, PassTarget, PipelineCache, SamplerTable, TEXTURES_BINDING};
use std::borrow::Cow;
use std::sync::Arc;
use umbra_core::math::Extent2D;
use umbra_core::renderer::{
    AccessFlags, BindingType, ClearValue, ColorAttachment, CommandEncoder, DescriptorBinding,
    DescriptorSetId, DescriptorSetLayoutDescriptor, DescriptorSetLayoutId, DescriptorWrite, Fetch,
    FramebufferId, GpuAssets, GpuTexture, GraphicsDevice, ImageLayout, LoadOp, MaterialDef,
    PipelineLayoutDescriptor, PipelineLayoutId, PipelineStages, RenderGraphDescriptor,
    RenderPassBeginInfo, RenderPassId, SamplerId, ShaderStages, StoreOp, Subpass,
    SubpassDependency, SubpassRef, TextureFormat, TextureRef, TextureUsage,
};
use umbra_core::scene::SceneNode;

/// Binding of the image a full-screen pass reads.
pub const SOURCE_BINDING: u32 = 4;

/// Table slot of the colour grading lookup table.
pub const LUT_SLOT: u32 = 1;

/// Edge length of the colour cube a grading lookup table encodes.
pub const LUT_SIZE: u32 = 16;

/// Texels of the lookup table that leaves colours unchanged.
///
/// The cube is stored as a `LUT_SIZE² x LUT_SIZE` RGBA8 strip: blue selects
/// the slice, red runs along x inside a slice and green along y.
pub fn identity_lut() -> Vec<u8> {
    let step = 255 / (LUT_SIZE - 1);
    let mut texels = Vec::with_capacity((LUT_SIZE * LUT_SIZE * LUT_SIZE * 4) as usize);
    for g in 0..LUT_SIZE {
        for b in 0..LUT_SIZE {
            for r in 0..LUT_SIZE {
                let texel = [r * step, g * step, b * step, 255].map(|c| c as u8);
                texels.extend_from_slice(&texel);
            }
        }
    }
    texels
}

#[derive(Debug)]
struct PostFrame {
    descriptor_set: DescriptorSetId,
    textures: SamplerTable,
}

/// Tone mapping and colour grading of the HDR output into the composite
/// image.
///
/// The grading lookup table is an ordinary texture asset. Until it is
/// resident, and forever if it failed to load, the pass grades through an
/// identity table it owns, so the composite image is written every frame.
#[derive(Debug)]
pub struct PostProcessPass {
    device: Arc<dyn GraphicsDevice>,
    assets: GpuAssets,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    pipelines: PipelineCache,
    material: MaterialDef,
    set_layout: DescriptorSetLayoutId,
    pipeline_layout: PipelineLayoutId,
    frames: PerFrame<PostFrame>,
    lut: TextureRef,
    lut_failed: bool,
    identity: RenderTarget,
    sampler: SamplerId,
    destroyed: bool,
}

impl PostProcessPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "postprocess";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .color(
                ColorAttachment::new("composite", TextureFormat::Rgba8Unorm)
                    .ops(LoadOp::Clear, StoreOp::Store)
                    .layouts(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
            )
            .subpass(Subpass::new("post").writes(["composite"]))
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("post"),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named("post"),
                dst: SubpassRef::External,
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                by_region: false,
            })
    }

    /// Builds the pass against the frame targets.
    pub fn new(context: &RenderContext, targets: &RenderTargets) -> Result<Self, PassError> {
        let device = Arc::clone(&context.device);
        let layout = Self::graph().compile()?;
        let render_pass = device.create_render_pass(&layout)?;
        let framebuffers =
            targets.framebuffers(device.as_ref(), Self::NAME, render_pass, |_, frame| {
                vec![frame.composite.view]
            })?;

        let bindings = [
            DescriptorBinding::new(
                TEXTURES_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::SampledTextureArray { count: 2 },
            ),
            DescriptorBinding::new(
                SOURCE_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::SampledTexture,
            ),
        ];
        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: Some("postprocess set 0".into()),
            bindings: Cow::Borrowed(&bindings),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(Self::NAME.into()),
            set_layouts: Cow::Owned(vec![set_layout]),
        })?;
        let material = fullscreen_material("pass/postprocess");
        let pipelines = context.pipelines(
            pipeline_layout,
            PassTarget::new(Self::NAME, &layout, render_pass, 0),
            material.clone(),
        );

        let fallback = context.fallback();
        let frames = PerFrame::try_new(context.frames(), |index| {
            let descriptor_set = device.create_descriptor_set(set_layout)?;
            let source = targets.frame(index as u64).output.view;
            device.update_descriptor_set(
                descriptor_set,
                &[DescriptorWrite::texture(SOURCE_BINDING, 0, source, fallback.sampler)],
            )?;
            Ok::<_, PassError>(PostFrame {
                descriptor_set,
                textures: SamplerTable::new(descriptor_set, TEXTURES_BINDING, 2, fallback),
            })
        })?;

        let identity = RenderTarget::new(
            device.as_ref(),
            "identity lut",
            Extent2D::new(LUT_SIZE * LUT_SIZE, LUT_SIZE),
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        )?;
        device.write_texture(identity.texture, &identity_lut())?;

        let lut = TextureRef::from_path(&context.config.post_process.lut);
        log::info!(
            "PostProcessPass: Created (LUT '{}')",
            context.config.post_process.lut
        );
        Ok(Self {
            device,
            assets: context.assets.clone(),
            render_pass,
            clear_values: clear_values(&layout),
            framebuffers,
            pipelines,
            material,
            set_layout,
            pipeline_layout,
            frames,
            lut,
            lut_failed: false,
            identity,
            sampler: fallback.sampler,
            destroyed: false,
        })
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The lookup table texture.
    pub fn lut(&self) -> TextureRef {
        self.lut
    }

    /// The identity table graded through while the real one is unavailable.
    pub fn identity_lut(&self) -> GpuTexture {
        GpuTexture {
            view: self.identity.view,
            sampler: self.sampler,
        }
    }
}

impl Pass for PostProcessPass {
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
        let lut = match self.assets.textures.try_fetch(self.lut) {
            Fetch::Ready(lut) => lut,
            Fetch::Pending => self.identity_lut(),
            Fetch::Failed(reason) => {
                if !self.lut_failed {
                    log::warn!(
                        "PostProcessPass: Colour grading LUT unavailable, grading with identity: \
                         {reason}"
                    );
                    self.lut_failed = true;
                }
                self.identity_lut()
            }
        };
        let pipeline = self.pipelines.require(Self::NAME, &self.material)?;

        let state = self.frames.get_mut(frame.frame_index);
        if state.textures.get(LUT_SLOT).view != lut.view {
            state.textures.clear();
            state.textures.assign(lut);
        }
        state.textures.flush(self.device.as_ref())?;

        // The composite is cleared even while the shader compiles.
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
        }
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        device.destroy_descriptor_set_layout(self.set_layout)?;
        self.identity.destroy(device)?;
        for framebuffer in self.framebuffers.iter() {
            device.destroy_framebuffer(*framebuffer)?;
        }
        device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(lut: &[u8], x: u32, y: u32) -> [u8; 4] {
        let at = ((y * LUT_SIZE * LUT_SIZE + x) * 4) as usize;
        [lut[at], lut[at + 1], lut[at + 2], lut[at + 3]]
    }

    #[test]
    fn test_identity_lut_maps_each_cell_to_itself() {
        let lut = identity_lut();
        assert_eq!(lut.len(), (LUT_SIZE * LUT_SIZE * LUT_SIZE * 4) as usize);
        assert_eq!(texel(&lut, 0, 0), [0, 0, 0, 255]);
        assert_eq!(texel(&lut, LUT_SIZE * LUT_SIZE - 1, LUT_SIZE - 1), [255; 4]);
        // Red 3 in blue slice 2, green row 5.
        assert_eq!(texel(&lut, 2 * LUT_SIZE + 3, 5), [51, 85, 34, 255]);
    }
}
