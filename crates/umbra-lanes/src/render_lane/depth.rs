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
    AccessFlags, ClearValue, CommandEncoder, CullMode, DepthAttachment, DrawPass, FramebufferId,
    GraphicsDevice, MaterialDef, PipelineStages, RenderGraphDescriptor, RenderPassBeginInfo,
    RenderPassId, RenderPassLayout, Subpass, SubpassDependency, SubpassRef, VertexLayout,
};
use umbra_core::scene::{Drawable, Query, SceneNode};

/// Depth pre-pass over the deferred geometry.
///
/// Fills the frame's depth target so the geometry subpass only shades
/// visible fragments. Only meshes with the standard vertex layout take part.
#[derive(Debug)]
pub struct DepthPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    sorter: MaterialSorter,
    destroyed: bool,
}

impl DepthPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "depth";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .depth(DepthAttachment::new("depth"))
            .subpass(Subpass::new("depth").with_depth())
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("depth"),
                src_stages: PipelineStages::FRAGMENT_SHADER,
                dst_stages: PipelineStages::EARLY_FRAGMENT_TESTS,
                src_access: AccessFlags::SHADER_READ,
                dst_access: AccessFlags::DEPTH_ATTACHMENT_WRITE,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named("depth"),
                dst: SubpassRef::External,
                src_stages: PipelineStages::LATE_FRAGMENT_TESTS,
                dst_stages: PipelineStages::EARLY_FRAGMENT_TESTS,
                src_access: AccessFlags::DEPTH_ATTACHMENT_WRITE,
                dst_access: AccessFlags::DEPTH_ATTACHMENT_READ,
                by_region: false,
            })
    }

    /// Every material draws with the depth-only shader, culling back faces.
    pub fn depth_material(def: &MaterialDef) -> MaterialDef {
        def.with_shader("pass/depth")
            .with_cull_mode(CullMode::Back)
            .with_transparent(false)
    }

    /// Builds the pass against the frame targets.
    pub fn new(context: &RenderContext, targets: &RenderTargets) -> Result<Self, PassError> {
        let device = Arc::clone(&context.device);
        let layout: RenderPassLayout = Self::graph().compile()?;
        let render_pass = device.create_render_pass(&layout)?;
        let framebuffers =
            targets.framebuffers(device.as_ref(), Self::NAME, render_pass, |_, frame| {
                vec![frame.depth.view]
            })?;
        let sorter = context
            .sorter(
                PassTarget::new(Self::NAME, &layout, render_pass, 0),
                context.config.max_objects,
                false,
                MaterialDef::standard_deferred(),
            )?
            .with_transform(Box::new(Self::depth_material));

        log::info!("DepthPass: Created ({} frames)", context.frames());
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

impl Pass for DepthPass {
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
            .filter(|d| d.vertex_layout() == VertexLayout::Standard)
            .filter(|d| frustum.intersects_sphere(&d.bounding_sphere()))
            .collect(scene);

        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        self.sorter.draw(
            pass.as_mut(),
            frame,
            &frame.camera_uniform(),
            &drawables,
            None,
            DrawOrder::Coalesced,
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
