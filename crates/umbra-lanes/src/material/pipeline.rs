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

use super::cache::{fetch_shader, Build, MaterialCache, MaterialMaker};
use crate::error::PassError;
use std::sync::Arc;
use umbra_core::renderer::{
    BlendMode, BlendState, CompiledShader, DepthState, GraphicsDevice, MaterialDef,
    PipelineLayoutId, RenderPassId, RenderPassLayout, RenderPipelineDescriptor, RenderPipelineId,
    ResourceError, ShaderProvider,
};

/// The subpass a pipeline renders into.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTarget {
    /// Pass name, used in pipeline labels.
    pub name: &'static str,
    /// The backend render pass.
    pub render_pass: RenderPassId,
    /// The subpass index.
    pub subpass: u32,
    /// Blend state of each colour output, as declared by the render graph.
    pub color_blends: Vec<Option<BlendState>>,
}

impl PassTarget {
    /// Targets `subpass` of a compiled pass.
    pub fn new(
        name: &'static str,
        layout: &RenderPassLayout,
        render_pass: RenderPassId,
        subpass: u32,
    ) -> Self {
        Self {
            name,
            render_pass,
            subpass,
            color_blends: layout.color_blends(subpass),
        }
    }
}

/// Creates the pipeline state object of `def` for `target`.
///
/// Transparent materials alpha-blend every colour output; opaque materials
/// use the blending declared on the attachments.
pub fn create_pipeline(
    device: &dyn GraphicsDevice,
    def: &MaterialDef,
    shader: &CompiledShader,
    layout: PipelineLayoutId,
    target: &PassTarget,
) -> Result<RenderPipelineId, ResourceError> {
    let color_blends = color_blends(def, target);
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(format!("{}/{}", target.name, def.shader).into()),
        shader: shader.module,
        layout,
        render_pass: target.render_pass,
        subpass: target.subpass,
        vertex_layout: def.vertex_layout,
        primitive: def.primitive,
        cull_mode: def.cull_mode,
        depth: DepthState {
            test: def.depth_test,
            write: def.depth_write,
            clamp: def.depth_clamp,
            compare: def.depth_func,
        },
        color_blends: color_blends.into(),
    })
}

fn color_blends(def: &MaterialDef, target: &PassTarget) -> Vec<Option<BlendState>> {
    if def.transparent {
        vec![BlendMode::Alpha.to_state(); target.color_blends.len()]
    } else {
        target.color_blends.clone()
    }
}

/// A pipeline shared by every frame, for passes that own their buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEntry {
    /// The pipeline.
    pub pipeline: RenderPipelineId,
    /// The shader it was built from.
    pub shader: CompiledShader,
}

/// Builds [`PipelineEntry`]s against one pipeline layout and target.
#[derive(Debug)]
pub struct PipelineMaker {
    device: Arc<dyn GraphicsDevice>,
    shaders: Arc<dyn ShaderProvider>,
    layout: PipelineLayoutId,
    target: PassTarget,
}

impl PipelineMaker {
    /// Creates a maker for `target`.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        shaders: Arc<dyn ShaderProvider>,
        layout: PipelineLayoutId,
        target: PassTarget,
    ) -> Self {
        Self {
            device,
            shaders,
            layout,
            target,
        }
    }
}

impl MaterialMaker for PipelineMaker {
    type Material = PipelineEntry;

    fn build(
        &mut self,
        def: &MaterialDef,
        _frames: usize,
    ) -> Result<Build<PipelineEntry>, PassError> {
        let shader = match fetch_shader(self.shaders.as_ref(), &def.shader) {
            Build::Ready(shader) => shader,
            Build::Pending => return Ok(Build::Pending),
            Build::Invalid(reason) => return Ok(Build::Invalid(reason)),
        };
        let pipeline =
            create_pipeline(self.device.as_ref(), def, &shader, self.layout, &self.target)?;
        Ok(Build::Ready(PipelineEntry { pipeline, shader }))
    }

    fn destroy(&mut self, entry: PipelineEntry) -> Result<(), PassError> {
        Ok(self.device.destroy_render_pipeline(entry.pipeline)?)
    }
}

/// Pipelines keyed by material, without per-frame instances.
pub type PipelineCache = MaterialCache<PipelineMaker>;

/// Outcome of resolving a pass-owned pipeline every frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PassPipeline {
    /// Ready to draw.
    Ready(PipelineEntry),
    /// Still compiling; skip the draw this frame.
    Pending,
}

impl PipelineCache {
    /// Resolves the pipeline a pass cannot work without.
    ///
    /// Unlike drawable materials, a pass shader that is invalid is a fatal
    /// [`PassError::InvalidMaterial`].
    pub fn require(
        &mut self,
        pass: &'static str,
        def: &MaterialDef,
    ) -> Result<PassPipeline, PassError> {
        let id = def.id();
        if let Some(entry) = self.get_or_build_with_id(id, Some(def))? {
            return Ok(PassPipeline::Ready(entry.clone()));
        }
        match self.invalid_reason(id) {
            Some(reason) => Err(PassError::InvalidMaterial {
                pass,
                shader: def.shader.clone(),
                reason: reason.to_owned(),
            }),
            None => Ok(PassPipeline::Pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::renderer::{
        BlendFactor, ColorAttachment, CompareFunction, CullMode, DescriptorSetLayoutDescriptor,
        PipelineLayoutDescriptor, RenderGraphDescriptor, Subpass, TextureFormat, VertexLayout,
    };
    use umbra_infra::{HeadlessDevice, ShaderLibrary};

    const SOURCE: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    struct Fixture {
        device: HeadlessDevice,
        library: Arc<ShaderLibrary>,
        cache: PipelineCache,
    }

    fn fixture() -> Fixture {
        let device = HeadlessDevice::new();
        let library = Arc::new(ShaderLibrary::new());
        library.register("pass/lighting", SOURCE, ["shadow"]).unwrap();
        library.register("broken", "@vertex fn vs_main() {}", Vec::<String>::new()).unwrap();

        let graph = RenderGraphDescriptor::new("lighting")
            .color(
                ColorAttachment::new("output", TextureFormat::Rgba16Float)
                    .blend(BlendMode::Additive),
            )
            .subpass(Subpass::new("lighting").writes(["output"]))
            .compile()
            .unwrap();
        let render_pass = device.create_render_pass(&graph).unwrap();
        let set_layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: None,
                bindings: std::borrow::Cow::Borrowed(&[]),
            })
            .unwrap();
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                set_layouts: vec![set_layout].into(),
            })
            .unwrap();

        let maker = PipelineMaker::new(
            Arc::new(device.clone()),
            library.clone(),
            layout,
            PassTarget::new("lighting", &graph, render_pass, 0),
        );
        let default = MaterialDef {
            shader: "pass/lighting".into(),
            vertex_layout: VertexLayout::Generated,
            depth_test: false,
            depth_write: false,
            depth_func: CompareFunction::Always,
            cull_mode: CullMode::None,
            ..MaterialDef::standard_deferred()
        };
        Fixture {
            device,
            library,
            cache: PipelineCache::new(maker, 2, default),
        }
    }

    #[test]
    fn test_require_waits_for_compilation() {
        let mut f = fixture();
        let def = f.cache.default_def().clone();

        assert_eq!(f.cache.require("lighting", &def).unwrap(), PassPipeline::Pending);
        f.library.process_pending(&f.device).unwrap();
        let PassPipeline::Ready(entry) = f.cache.require("lighting", &def).unwrap() else {
            panic!("pipeline should be ready");
        };
        assert_eq!(entry.shader.texture_slots, vec!["shadow"]);
        assert_eq!(
            f.device.pipeline_label(entry.pipeline).as_deref(),
            Some("lighting/pass/lighting")
        );
        assert_eq!(f.device.live_resources().unwrap().pipelines, 1);

        f.cache.destroy().unwrap();
        assert_eq!(f.device.live_resources().unwrap().pipelines, 0);
    }

    #[test]
    fn test_require_fails_for_broken_shader() {
        let mut f = fixture();
        let def = f.cache.default_def().with_shader("broken");

        assert_eq!(f.cache.require("lighting", &def).unwrap(), PassPipeline::Pending);
        f.library.process_pending(&f.device).unwrap();
        let err = f.cache.require("lighting", &def).unwrap_err();
        assert!(matches!(err, PassError::InvalidMaterial { pass: "lighting", .. }));
    }

    #[test]
    fn test_transparent_materials_alpha_blend() {
        let target = PassTarget {
            name: "forward",
            render_pass: RenderPassId(0),
            subpass: 0,
            color_blends: vec![BlendMode::Additive.to_state(), None],
        };
        let blended = color_blends(&MaterialDef::transparent_forward(), &target);
        assert_eq!(blended.len(), 2);
        assert!(blended
            .iter()
            .all(|b| b.map(|b| b.color.dst_factor) == Some(BlendFactor::OneMinusSrcAlpha)));

        let opaque = color_blends(&MaterialDef::standard_forward(), &target);
        assert_eq!(opaque, target.color_blends);
    }
}
