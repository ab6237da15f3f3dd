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
    clear_values, ensure_alive, fullscreen_material, Pass, RenderContext, RenderTargets,
    SOURCE_BINDING,
};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{PassPipeline, PassTarget, PipelineCache};
use std::borrow::Cow;
use std::sync::Arc;
use umbra_core::renderer::{
    AccessFlags, BindingType, ClearValue, ColorAttachment, CommandEncoder, DescriptorBinding,
    DescriptorSetId, DescriptorSetLayoutDescriptor, DescriptorSetLayoutId, DescriptorWrite,
    FramebufferId, GraphicsDevice, ImageLayout, LoadOp, MaterialDef, PipelineLayoutDescriptor,
    PipelineLayoutId, PipelineStages, RenderGraphDescriptor, RenderPassBeginInfo, RenderPassId,
    ShaderStages, StoreOp, Subpass, SubpassDependency, SubpassRef, TextureFormat,
};
use umbra_core::scene::SceneNode;

/// Copies the composite image into the presentation target.
#[derive(Debug)]
pub struct OutputPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    pipelines: PipelineCache,
    material: MaterialDef,
    set_layout: DescriptorSetLayoutId,
    pipeline_layout: PipelineLayoutId,
    sets: PerFrame<DescriptorSetId>,
    destroyed: bool,
}

impl OutputPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "output";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .color(
                ColorAttachment::new("present", TextureFormat::Bgra8UnormSrgb)
                    .ops(LoadOp::DontCare, StoreOp::Store)
                    .layouts(ImageLayout::Undefined, ImageLayout::PresentSrc),
            )
            .subpass(Subpass::new("blit").writes(["present"]))
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("blit"),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER
                    | PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named("blit"),
                dst: SubpassRef::External,
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::BOTTOM_OF_PIPE,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::MEMORY_READ,
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
                vec![frame.present.view]
            })?;

        let bindings = [DescriptorBinding::new(
            SOURCE_BINDING,
            ShaderStages::FRAGMENT,
            BindingType::SampledTexture,
        )];
        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: Some("output set 0".into()),
            bindings: Cow::Borrowed(&bindings),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(Self::NAME.into()),
            set_layouts: Cow::Owned(vec![set_layout]),
        })?;
        let material = fullscreen_material("pass/output");
        let pipelines = context.pipelines(
            pipeline_layout,
            PassTarget::new(Self::NAME, &layout, render_pass, 0),
            material.clone(),
        );

        let sampler = context.fallback().sampler;
        let sets = PerFrame::try_new(context.frames(), |index| {
            let set = device.create_descriptor_set(set_layout)?;
            let composite = targets.frame(index as u64).composite.view;
            device.update_descriptor_set(
                set,
                &[DescriptorWrite::texture(SOURCE_BINDING, 0, composite, sampler)],
            )?;
            Ok::<_, PassError>(set)
        })?;

        log::info!("OutputPass: Created ({} frames)", context.frames());
        Ok(Self {
            device,
            render_pass,
            clear_values: clear_values(&layout),
            framebuffers,
            pipelines,
            material,
            set_layout,
            pipeline_layout,
            sets,
            destroyed: false,
        })
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }
}

impl Pass for OutputPass {
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
        let PassPipeline::Ready(entry) = self.pipelines.require(Self::NAME, &self.material)? else {
            return Ok(());
        };
        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        pass.set_pipeline(entry.pipeline);
        pass.set_descriptor_set(0, *self.sets.get(frame.frame_index));
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let device = self.device.as_ref();
        self.pipelines.destroy()?;
        for set in self.sets.iter() {
            device.destroy_descriptor_set(*set)?;
        }
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        device.destroy_descriptor_set_layout(self.set_layout)?;
        for framebuffer in self.framebuffers.iter() {
            device.destroy_framebuffer(*framebuffer)?;
        }
        device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}
