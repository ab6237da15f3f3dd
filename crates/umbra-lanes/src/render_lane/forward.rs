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
use super::{clear_values, ensure_alive, Pass, RenderContext, RenderTargets, ShadowCascadeCache};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::material::{DrawOrder, MaterialSorter, PassTarget, SceneLights, ShadowMaps};
use std::sync::{Arc, RwLock};
use umbra_core::math::Vec3;
use umbra_core::renderer::{
    AccessFlags, ClearValue, ColorAttachment, CommandEncoder, DepthAttachment, DrawPass,
    FramebufferId, GraphicsDevice, ImageLayout, LightSettings, LoadOp, MaterialDef,
    PipelineStages, RenderGraphDescriptor, RenderPassBeginInfo, RenderPassId, StoreOp, Subpass,
    SubpassDependency, SubpassRef, TextureFormat,
};
use umbra_core::scene::{Drawable, Light, Query, SceneNode};

/// Sorts transparent drawables back to front, by the distance from `eye`
/// to the centre of their bounds. Equal distances keep their scene order.
pub fn sort_back_to_front<D: Drawable + ?Sized>(drawables: &mut [&D], eye: Vec3) {
    drawables.sort_by(|a, b| {
        let a = a.bounding_sphere().center.distance(eye);
        let b = b.bounding_sphere().center.distance(eye);
        b.total_cmp(&a)
    });
}

/// Forward shading on top of the deferred output.
///
/// Opaque forward materials (custom shaders, lines) are batched per
/// material; transparent ones are drawn afterwards, back to front, each
/// batch following the sorted order exactly.
#[derive(Debug)]
pub struct ForwardPass {
    device: Arc<dyn GraphicsDevice>,
    render_pass: RenderPassId,
    clear_values: Vec<ClearValue>,
    framebuffers: PerFrame<FramebufferId>,
    opaque: MaterialSorter,
    transparent: MaterialSorter,
    settings: LightSettings,
    shadows: Option<Arc<RwLock<ShadowCascadeCache>>>,
    destroyed: bool,
}

impl ForwardPass {
    /// Name used in diagnostics and pipeline labels.
    pub const NAME: &'static str = "forward";

    /// The render graph of the pass.
    pub fn graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new(Self::NAME)
            .color(
                ColorAttachment::new("output", TextureFormat::Rgba16Float)
                    .ops(LoadOp::Load, StoreOp::Store)
                    .layouts(ImageLayout::ShaderReadOnly, ImageLayout::ShaderReadOnly),
            )
            .depth(
                DepthAttachment::new("depth")
                    .ops(LoadOp::Load, StoreOp::Store)
                    .layouts(ImageLayout::DepthAttachment, ImageLayout::DepthAttachment),
            )
            .subpass(Subpass::new("forward").writes(["output"]).with_depth())
            .dependency(SubpassDependency {
                src: SubpassRef::External,
                dst: SubpassRef::named("forward"),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT
                    | PipelineStages::LATE_FRAGMENT_TESTS,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT
                    | PipelineStages::EARLY_FRAGMENT_TESTS,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE
                    | AccessFlags::DEPTH_ATTACHMENT_WRITE,
                dst_access: AccessFlags::COLOR_ATTACHMENT_READ
                    | AccessFlags::COLOR_ATTACHMENT_WRITE
                    | AccessFlags::DEPTH_ATTACHMENT_READ,
                by_region: false,
            })
            .dependency(SubpassDependency {
                src: SubpassRef::named("forward"),
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
                vec![frame.output.view, frame.depth.view]
            })?;
        let target = PassTarget::new(Self::NAME, &layout, render_pass, 0);
        let max_objects = context.config.max_objects;
        let opaque = context.sorter(
            target.clone(),
            max_objects,
            true,
            MaterialDef::standard_forward(),
        )?;
        let transparent =
            context.sorter(target, max_objects, true, MaterialDef::transparent_forward())?;

        log::info!("ForwardPass: Created ({} frames)", context.frames());
        Ok(Self {
            device,
            render_pass,
            clear_values: clear_values(&layout),
            framebuffers,
            opaque,
            transparent,
            settings: context.config.lighting.settings(),
            shadows: None,
            destroyed: false,
        })
    }

    /// Samples the shadow maps of `cascades`.
    pub fn with_shadows(mut self, cascades: Arc<RwLock<ShadowCascadeCache>>) -> Self {
        self.shadows = Some(cascades);
        self
    }

    /// The compiled render pass.
    pub fn render_pass(&self) -> RenderPassId {
        self.render_pass
    }

    /// The sorter of opaque forward materials.
    pub fn opaque(&self) -> &MaterialSorter {
        &self.opaque
    }

    /// The sorter of transparent materials.
    pub fn transparent(&self) -> &MaterialSorter {
        &self.transparent
    }
}

impl Pass for ForwardPass {
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
        let visible = Query::<dyn Drawable>::new()
            .filter(|d| d.draw_pass() == DrawPass::Forward)
            .filter(|d| frustum.intersects_sphere(&d.bounding_sphere()))
            .collect(scene);
        let (mut transparent, opaque): (Vec<_>, Vec<_>) =
            visible.into_iter().partition(|d| d.is_transparent());
        sort_back_to_front(&mut transparent, frame.eye);

        let lights = Query::<dyn Light>::new().collect(scene);
        let guard = match &self.shadows {
            Some(cascades) => Some(read_cascades(cascades)?),
            None => None,
        };
        let scene_lights = SceneLights {
            lights: &lights,
            settings: self.settings,
            shadows: guard.as_deref().map(|cache| cache as &dyn ShadowMaps),
        };
        let camera = frame.camera_uniform();

        let mut pass = encoder.begin_render_pass(&RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: *self.framebuffers.get(frame.frame_index),
            clear_values: self.clear_values.clone(),
        });
        self.opaque.draw(
            pass.as_mut(),
            frame,
            &camera,
            &opaque,
            Some(&scene_lights),
            DrawOrder::Coalesced,
        )?;
        self.transparent.draw(
            pass.as_mut(),
            frame,
            &camera,
            &transparent,
            Some(&scene_lights),
            DrawOrder::Ordered,
        )?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.opaque.destroy()?;
        self.transparent.destroy()?;
        for framebuffer in self.framebuffers.iter() {
            self.device.destroy_framebuffer(*framebuffer)?;
        }
        self.device.destroy_render_pass(self.render_pass)?;
        Ok(())
    }
}
