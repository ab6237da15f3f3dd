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

use super::{clear_values, ensure_alive, Pass, RenderContext, RenderTargets};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{DrawOrder, MaterialSorter, PassTarget};
use std::sync::Arc;
use umbra_core::renderer::{
    AccessFlags, ClearValue, ColorAttachment, CommandEncoder, DrawPass, FramebufferId,
    GraphicsDevice, ImageLayout, LoadOp, MaterialDef, PipelineStages, RenderGraphDescriptor,
    RenderPassBeginInfo, RenderPassId, StoreOp, Subpass, SubpassDependency, SubpassRef,
    TextureFormat,
};
use umbra_core::scene::{Drawable, Query, SceneNode};

/// Screen-space overlay drawn over the presented image.
///
/// Elements are drawn in scene order without culling, so later nodes
/// cover earlier ones.
#[derive(Debug)]
pub struct UiPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    sorter: MaterialSorter,
    destroyed: bool,
}

impl UiPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "ui";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .color(
                ColorAttachment::new("present", TextureFormat::Bgra8UnormSrgb)
                    .ops(LoadOp::Load, StoreOp::Store)
                    .layouts(ImageLayout::PresentSrc, ImageLayout::PresentSrc),
            )
            .subpass(Subpass::new("ui").writes(["present"]))
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("ui"),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::COLOR_ATTACHMENT_READ
                    | AccessFlags::COLOR_ATTACHMENT_WRITE,
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
        let sorter = context.sorter(
            PassTarget::new(Self::NAME, &layout, render_pass, 0),
            context.config.max_objects,
            false,
            MaterialDef::ui(),
        )?;

        log::info!("UiPass: Created ({} frames)", context.frames());
        Ok(Self {
            device,
            render_pass,
            clear_values: clear_values(&layout),
            framebuffers,
            sorter,
            destroyed: false,
        })
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The sorter, for inspection.
    pub fn sorter(&self) -> &MaterialSorter {
        &self.sorter
    }
}

impl Pass for UiPass {
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
        let elements = Query::<dyn Drawable>::new()
            .filter(|d| d.draw_pass() == DrawPass::Ui)
            .collect(scene);
        if elements.is_empty() {
            return Ok(());
        }

        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        self.sorter.draw(
            pass.as_mut(),
            frame,
            &frame.camera_uniform(),
            &elements,
            None,
            DrawOrder::Ordered,
        )?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.sorter.destroy()?;
        for framebuffer in self.framebuffers.iter() {
            self.device.destroy_framebuffer(*framebuffer)?;
        }
        self.device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}
