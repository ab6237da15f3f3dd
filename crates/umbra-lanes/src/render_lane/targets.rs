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

use super::RenderContext;
use crate::frame::PerFrame;
use umbra_core::math::Extent2D;
use umbra_core::renderer::{
    FramebufferDescriptor, FramebufferId, GraphicsDevice, ImageAspect, RenderPassId,
    ResourceError, TextureDescriptor, TextureFormat, TextureId, TextureUsage,
    TextureViewDescriptor, TextureViewId,
};

/// An image and the view passes attach or sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    /// The image.
    pub texture: TextureId,
    /// The view over its colour or depth aspect.
    pub view: TextureViewId,
    /// Texel format.
    pub format: TextureFormat,
}

impl RenderTarget {
    /// Creates an image and its view; depth formats get a depth view.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        extent: Extent2D,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<Self, ResourceError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(label.into()),
            size: extent,
            format,
            usage,
        })?;
        let aspect = match format {
            TextureFormat::Depth32Float => ImageAspect::Depth,
            _ => ImageAspect::Color,
        };
        let view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(label.into()),
                aspect,
            },
        )?;
        Ok(Self {
            texture,
            view,
            format,
        })
    }

    /// Destroys the view and the image.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        device.destroy_texture_view(self.view)?;
        device.destroy_texture(self.texture)
    }
}

/// The images shared by consecutive passes of one frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    /// Scene depth: written by the depth pass, tested by the others.
    pub depth: RenderTarget,
    /// HDR scene colour: lit by the deferred pass, blended by the forward pass.
    pub output: RenderTarget,
    /// Tone-mapped, graded colour.
    pub composite: RenderTarget,
    /// The image handed to presentation.
    pub present: RenderTarget,
    /// Raw ambient occlusion, at half resolution.
    pub occlusion: RenderTarget,
    /// Blurred ambient occlusion, read by deferred lighting.
    pub occlusion_blur: RenderTarget,
}

impl FrameTargets {
    fn new(device: &dyn GraphicsDevice, extent: Extent2D) -> Result<Self, ResourceError> {
        Ok(Self {
            depth: RenderTarget::new(
                device,
                "depth",
                extent,
                TextureFormat::Depth32Float,
                TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED,
            )?,
            output: RenderTarget::new(
                device,
                "output",
                extent,
                TextureFormat::Rgba16Float,
                TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
            )?,
            composite: RenderTarget::new(
                device,
                "composite",
                extent,
                TextureFormat::Rgba8Unorm,
                TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
            )?,
            present: RenderTarget::new(
                device,
                "present",
                extent,
                TextureFormat::Bgra8UnormSrgb,
                TextureUsage::COLOR_ATTACHMENT | TextureUsage::COPY_SRC,
            )?,
            occlusion: RenderTarget::new(
                device,
                "occlusion",
                extent.half(),
                TextureFormat::R16Float,
                TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
            )?,
            occlusion_blur: RenderTarget::new(
                device,
                "occlusion blur",
                extent.half(),
                TextureFormat::R16Float,
                TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
            )?,
        })
    }

    fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let targets = [
            self.depth,
            self.output,
            self.composite,
            self.present,
            self.occlusion,
            self.occlusion_blur,
        ];
        for target in targets {
            target.destroy(device)?;
        }
        Ok(())
    }
}

/// Per-frame [`FrameTargets`].
#[derive(Debug)]
pub struct RenderTargets {
    extent: Extent2D,
    frames: PerFrame<FrameTargets>,
}

impl RenderTargets {
    /// Allocates one set of targets per frame in flight.
    pub fn new(context: &RenderContext) -> Result<Self, ResourceError> {
        let device = context.device.as_ref();
        let frames =
            PerFrame::try_new(context.frames(), |_| FrameTargets::new(device, context.extent))?;
        Ok(Self {
            extent: context.extent,
            frames,
        })
    }

    /// Size of the full-resolution targets.
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Size of the ambient occlusion targets.
    pub fn occlusion_extent(&self) -> Extent2D {
        self.extent.half()
    }

    /// The targets of a frame.
    pub fn frame(&self, frame_index: u64) -> &FrameTargets {
        self.frames.get(frame_index)
    }

    /// Number of frames in flight.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false` for a built set.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// One full-resolution framebuffer per frame, attaching the views
    /// `select` picks.
    pub fn framebuffers(
        &self,
        device: &dyn GraphicsDevice,
        label: &str,
        render_pass: RenderPassId,
        select: impl FnMut(usize, &FrameTargets) -> Vec<TextureViewId>,
    ) -> Result<PerFrame<FramebufferId>, ResourceError> {
        self.framebuffers_sized(device, label, render_pass, self.extent, select)
    }

    /// Like [`RenderTargets::framebuffers`], for attachments of `extent`.
    pub fn framebuffers_sized(
        &self,
        device: &dyn GraphicsDevice,
        label: &str,
        render_pass: RenderPassId,
        extent: Extent2D,
        mut select: impl FnMut(usize, &FrameTargets) -> Vec<TextureViewId>,
    ) -> Result<PerFrame<FramebufferId>, ResourceError> {
        let frames = self.frames.iter().collect::<Vec<_>>();
        PerFrame::try_new(frames.len(), |index| {
            device.create_framebuffer(&FramebufferDescriptor {
                label: Some(format!("{label} #{index}").into()),
                render_pass,
                attachments: select(index, frames[index]).into(),
                extent,
            })
        })
    }

    /// Destroys every target.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        for frame in self.frames.iter() {
            frame.destroy(device)?;
        }
        Ok(())
    }
}

/// The deferred G-buffer of one frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    /// Albedo.
    pub diffuse: RenderTarget,
    /// World-space normal.
    pub normal: RenderTarget,
    /// World-space position (w = 0 where nothing was drawn).
    pub position: RenderTarget,
}

impl GBuffer {
    /// Allocates the three attachments.
    pub fn new(device: &dyn GraphicsDevice, extent: Extent2D) -> Result<Self, ResourceError> {
        let usage = TextureUsage::COLOR_ATTACHMENT | TextureUsage::INPUT_ATTACHMENT;
        Ok(Self {
            diffuse: RenderTarget::new(
                device,
                "gbuffer diffuse",
                extent,
                TextureFormat::Rgba8Unorm,
                usage,
            )?,
            normal: RenderTarget::new(
                device,
                "gbuffer normal",
                extent,
                TextureFormat::Rgba16Float,
                usage,
            )?,
            position: RenderTarget::new(
                device,
                "gbuffer position",
                extent,
                TextureFormat::Rgba32Float,
                usage,
            )?,
        })
    }

    /// Destroys the attachments.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.diffuse.destroy(device)?;
        self.normal.destroy(device)?;
        self.position.destroy(device)
    }
}
