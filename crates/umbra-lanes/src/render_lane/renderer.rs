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

use super::shadow::{read_cascades, write_cascades};
use super::{
    ensure_alive, BlurPass, DeferredPass, DepthPass, ForwardPass, OutputPass, Pass,
    PostProcessPass, RenderContext, RenderTargets, ShadowCascadeCache, ShadowPass, SsaoPass,
    UiPass,
};
use crate::error::PassError;
use crate::frame::FrameArgs;
use crate::material::ShadowMaps;
use std::sync::{Arc, RwLock};
use umbra_core::renderer::{CommandBufferId, TextureViewId};
use umbra_core::scene::{LightId, SceneNode};

/// The complete frame: shadow, depth, ambient occlusion and its blur,
/// deferred, forward, post-process, output and UI passes recorded into one
/// command buffer. The occlusion passes are left out when disabled.
///
/// Shader compilation and asset streaming happen outside the renderer;
/// whatever is not ready yet is simply left out of the frame.
pub struct Renderer {
    context: RenderContext,
    targets: RenderTargets,
    passes: Vec<Box<dyn Pass>>,
    shadows: Arc<RwLock<ShadowCascadeCache>>,
    destroyed: bool,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("passes", &self.pass_names())
            .field("extent", &self.targets.extent())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Renderer {
    /// Allocates the frame targets and builds every pass.
    ///
    /// If a pass fails to build, everything built so far is destroyed.
    pub fn new(context: RenderContext) -> Result<Self, PassError> {
        let targets = RenderTargets::new(&context)?;
        let shadow = match ShadowPass::new(&context) {
            Ok(shadow) => shadow,
            Err(e) => {
                targets.destroy(context.device.as_ref())?;
                context.destroy()?;
                return Err(e);
            }
        };
        let mut renderer = Self {
            shadows: shadow.cascades(),
            passes: vec![Box::new(shadow)],
            context,
            targets,
            destroyed: false,
        };
        if let Err(e) = renderer.build_passes() {
            if let Err(cleanup) = renderer.destroy() {
                log::error!("Renderer: Cleanup after failed construction failed: {cleanup}");
            }
            return Err(e);
        }
        log::info!(
            "Renderer: Created {}x{} with passes {:?}",
            renderer.targets.extent().width,
            renderer.targets.extent().height,
            renderer.pass_names()
        );
        Ok(renderer)
    }

    fn build_passes(&mut self) -> Result<(), PassError> {
        let (context, targets) = (&self.context, &self.targets);
        self.passes.push(Box::new(DepthPass::new(context, targets)?));
        if context.config.occlusion.enabled {
            self.passes.push(Box::new(SsaoPass::new(context, targets)?));
            self.passes.push(Box::new(BlurPass::new(context, targets)?));
        }
        self.passes.push(Box::new(
            DeferredPass::new(context, targets)?.with_shadows(Arc::clone(&self.shadows)),
        ));
        self.passes.push(Box::new(
            ForwardPass::new(context, targets)?.with_shadows(Arc::clone(&self.shadows)),
        ));
        self.passes.push(Box::new(PostProcessPass::new(context, targets)?));
        self.passes.push(Box::new(OutputPass::new(context, targets)?));
        self.passes.push(Box::new(UiPass::new(context, targets)?));
        Ok(())
    }

    /// Records every pass for `frame` and submits the command buffer.
    pub fn render(
        &mut self,
        frame: &FrameArgs,
        scene: &dyn SceneNode,
    ) -> Result<CommandBufferId, PassError> {
        ensure_alive(self.destroyed, "renderer")?;
        let device = Arc::clone(&self.context.device);
        let mut encoder = device.create_command_encoder(Some("frame"));
        for pass in &mut self.passes {
            if let Err(e) = pass.record(encoder.as_mut(), frame, scene) {
                log::error!(
                    "Renderer: Pass '{}' failed in frame {}: {e}",
                    pass.name(),
                    frame.frame_index
                );
                return Err(e);
            }
        }
        let commands = encoder.finish();
        device.submit_command_buffer(commands);
        Ok(commands)
    }

    /// Names of the passes, in recording order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// The passes, in recording order.
    pub fn passes(&self) -> &[Box<dyn Pass>] {
        &self.passes
    }

    /// The shadow cascade cache.
    pub fn shadows(&self) -> Arc<RwLock<ShadowCascadeCache>> {
        Arc::clone(&self.shadows)
    }

    /// Number of shadow cascades alive.
    pub fn shadow_cascade_count(&self) -> Result<usize, PassError> {
        Ok(read_cascades(&self.shadows)?.len())
    }

    /// The view of a cascade's depth map, once the cascade was rendered.
    pub fn shadowmap(&self, light: LightId, cascade: usize) -> Option<TextureViewId> {
        read_cascades(&self.shadows)
            .ok()?
            .shadowmap(light, cascade)
            .map(|texture| texture.view)
    }

    /// Drops the shadow maps of a light that was removed or changed.
    pub fn invalidate_light(&self, light: LightId) -> Result<usize, PassError> {
        write_cascades(&self.shadows)?.invalidate(light)
    }

    /// The frame targets.
    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// The context the passes were built from.
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Destroys every pass (in reverse order), the targets and the context.
    pub fn destroy(&mut self) -> Result<(), PassError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        for pass in self.passes.iter_mut().rev() {
            pass.destroy()?;
        }
        self.targets.destroy(self.context.device.as_ref())?;
        self.context.destroy()?;
        log::info!("Renderer: Destroyed");
        Ok(())
    }
}
