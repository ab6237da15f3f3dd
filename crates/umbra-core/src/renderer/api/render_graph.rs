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

//! Declarative render pass description.
//!
//! A [`RenderGraphDescriptor`] names its attachments, lists subpasses in
//! execution order and spells out every dependency between them. [`compile`]
//! checks the references and resolves names to indices, producing the
//! [`RenderPassLayout`] consumed by `GraphicsDevice::create_render_pass`.
//!
//! Layout transitions and barriers are taken exactly as declared; nothing is
//! inferred from load/store operations.
//!
//! [`compile`]: RenderGraphDescriptor::compile

use super::pipeline::{BlendMode, BlendState};
use super::texture::{TextureFormat, TextureViewId};
use crate::math::{Extent2D, LinearRgba};
use crate::renderer::error::RenderGraphError;
use crate::umbra_bitflags;
use std::borrow::Cow;

/// Describes the operation performed on an attachment when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Keep the previous contents.
    Load,
    /// Clear to the attachment's clear value.
    #[default]
    Clear,
    /// The previous contents are irrelevant.
    DontCare,
}

/// Describes the operation performed on an attachment when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Write the results to memory.
    #[default]
    Store,
    /// Discard the results (transient attachments).
    Discard,
}

/// The memory layout an image is in before or after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents are undefined.
    #[default]
    Undefined,
    /// Optimal for colour attachment writes.
    ColorAttachment,
    /// Optimal for depth attachment reads and writes.
    DepthAttachment,
    /// Optimal for sampling in shaders.
    ShaderReadOnly,
    /// Ready for presentation.
    PresentSrc,
}

umbra_bitflags! {
    /// Pipeline stages referenced by a subpass dependency.
    pub struct PipelineStages: u32 {
        /// Start of the pipeline.
        const TOP_OF_PIPE = 1 << 0;
        /// Vertex shader execution.
        const VERTEX_SHADER = 1 << 1;
        /// Depth tests before fragment shading.
        const EARLY_FRAGMENT_TESTS = 1 << 2;
        /// Fragment shader execution.
        const FRAGMENT_SHADER = 1 << 3;
        /// Depth tests after fragment shading.
        const LATE_FRAGMENT_TESTS = 1 << 4;
        /// Colour attachment writes.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        /// End of the pipeline.
        const BOTTOM_OF_PIPE = 1 << 6;
    }
}

umbra_bitflags! {
    /// Memory accesses referenced by a subpass dependency.
    pub struct AccessFlags: u32 {
        /// Reads of colour attachments (blending).
        const COLOR_ATTACHMENT_READ = 1 << 0;
        /// Writes of colour attachments.
        const COLOR_ATTACHMENT_WRITE = 1 << 1;
        /// Reads of depth attachments.
        const DEPTH_ATTACHMENT_READ = 1 << 2;
        /// Writes of depth attachments.
        const DEPTH_ATTACHMENT_WRITE = 1 << 3;
        /// Reads of input attachments.
        const INPUT_ATTACHMENT_READ = 1 << 4;
        /// Shader sampling reads.
        const SHADER_READ = 1 << 5;
        /// Any memory read.
        const MEMORY_READ = 1 << 6;
    }
}

/// A colour attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    /// Name used by subpasses to reference the attachment.
    pub name: String,
    /// Texel format.
    pub format: TextureFormat,
    /// Operation at pass begin.
    pub load: LoadOp,
    /// Operation at pass end.
    pub store: StoreOp,
    /// Layout the image is in when the pass begins.
    pub initial_layout: ImageLayout,
    /// Layout the image is transitioned to when the pass ends.
    pub final_layout: ImageLayout,
    /// Clear value used with [`LoadOp::Clear`].
    pub clear: LinearRgba,
    /// Blending applied by pipelines writing this attachment.
    pub blend: BlendMode,
}

impl ColorAttachment {
    /// A cleared, stored attachment ending in `ShaderReadOnly`.
    pub fn new(name: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            format,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::ShaderReadOnly,
            clear: LinearRgba::TRANSPARENT,
            blend: BlendMode::None,
        }
    }

    /// Sets the load and store operations.
    pub fn ops(mut self, load: LoadOp, store: StoreOp) -> Self {
        self.load = load;
        self.store = store;
        self
    }

    /// Sets the initial and final layouts.
    pub fn layouts(mut self, initial: ImageLayout, final_layout: ImageLayout) -> Self {
        self.initial_layout = initial;
        self.final_layout = final_layout;
        self
    }

    /// Sets the clear colour.
    pub fn clear(mut self, color: LinearRgba) -> Self {
        self.clear = color;
        self
    }

    /// Sets the blend mode.
    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    /// Name used by input attachment references.
    pub name: String,
    /// Depth format.
    pub format: TextureFormat,
    /// Operation at pass begin.
    pub load: LoadOp,
    /// Operation at pass end.
    pub store: StoreOp,
    /// Layout the image is in when the pass begins.
    pub initial_layout: ImageLayout,
    /// Layout the image is transitioned to when the pass ends.
    pub final_layout: ImageLayout,
    /// Clear depth used with [`LoadOp::Clear`].
    pub clear_depth: f32,
}

impl DepthAttachment {
    /// A cleared (1.0), stored `Depth32Float` attachment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: TextureFormat::Depth32Float,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::DepthAttachment,
            clear_depth: 1.0,
        }
    }

    /// Sets the load and store operations.
    pub fn ops(mut self, load: LoadOp, store: StoreOp) -> Self {
        self.load = load;
        self.store = store;
        self
    }

    /// Sets the initial and final layouts.
    pub fn layouts(mut self, initial: ImageLayout, final_layout: ImageLayout) -> Self {
        self.initial_layout = initial;
        self.final_layout = final_layout;
        self
    }
}

/// One phase of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subpass {
    /// Name used by dependencies.
    pub name: String,
    /// Colour attachments written, in fragment output order.
    pub color: Vec<String>,
    /// Attachments read as input attachments, in binding order.
    pub input: Vec<String>,
    /// Whether the depth attachment is bound for testing/writing.
    pub depth: bool,
}

impl Subpass {
    /// Creates an empty subpass.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds colour outputs.
    pub fn writes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.color.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds input attachments.
    pub fn reads<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input.extend(names.into_iter().map(Into::into));
        self
    }

    /// Binds the depth attachment.
    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }
}

/// Either side of a subpass dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubpassRef {
    /// Work outside the render pass.
    External,
    /// A subpass of this pass, by name.
    Named(String),
}

impl SubpassRef {
    /// Shorthand for [`SubpassRef::Named`].
    pub fn named(name: impl Into<String>) -> Self {
        SubpassRef::Named(name.into())
    }
}

/// An explicit execution and memory dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpassDependency {
    /// The producer.
    pub src: SubpassRef,
    /// The consumer.
    pub dst: SubpassRef,
    /// Producer stages.
    pub src_stages: PipelineStages,
    /// Consumer stages.
    pub dst_stages: PipelineStages,
    /// Producer accesses.
    pub src_access: AccessFlags,
    /// Consumer accesses.
    pub dst_access: AccessFlags,
    /// Whether the dependency is framebuffer-local.
    pub by_region: bool,
}

/// A complete, uncompiled render pass description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderGraphDescriptor {
    /// Pass name, used in diagnostics.
    pub name: String,
    /// Colour attachments in attachment index order.
    pub color_attachments: Vec<ColorAttachment>,
    /// The optional depth attachment (index `color_attachments.len()`).
    pub depth: Option<DepthAttachment>,
    /// Subpasses in execution order.
    pub subpasses: Vec<Subpass>,
    /// Declared dependencies.
    pub dependencies: Vec<SubpassDependency>,
}

/// A subpass with attachment names resolved to indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpassLayout {
    /// The subpass name.
    pub name: String,
    /// Attachment indices written as colour.
    pub color: Vec<u32>,
    /// Attachment indices read as input attachments.
    pub input: Vec<u32>,
    /// Whether depth is bound.
    pub depth: bool,
}

/// A dependency with subpass names resolved; `None` is external.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyLayout {
    /// Producer subpass index.
    pub src: Option<u32>,
    /// Consumer subpass index.
    pub dst: Option<u32>,
    /// Producer stages.
    pub src_stages: PipelineStages,
    /// Consumer stages.
    pub dst_stages: PipelineStages,
    /// Producer accesses.
    pub src_access: AccessFlags,
    /// Consumer accesses.
    pub dst_access: AccessFlags,
    /// Whether the dependency is framebuffer-local.
    pub by_region: bool,
}

/// A validated render pass, ready for backend creation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassLayout {
    /// Pass name.
    pub name: String,
    /// Colour attachments, verbatim.
    pub color_attachments: Vec<ColorAttachment>,
    /// Depth attachment, verbatim.
    pub depth: Option<DepthAttachment>,
    /// Resolved subpasses.
    pub subpasses: Vec<SubpassLayout>,
    /// Resolved dependencies.
    pub dependencies: Vec<DependencyLayout>,
}

impl RenderPassLayout {
    /// Total attachment count, depth included.
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth.is_some())
    }

    /// Index of the subpass called `name`.
    pub fn subpass_index(&self, name: &str) -> Option<u32> {
        self.subpasses
            .iter()
            .position(|s| s.name == name)
            .map(|i| i as u32)
    }

    /// Blend states for the colour outputs of a subpass, in output order.
    pub fn color_blends(&self, subpass: u32) -> Vec<Option<BlendState>> {
        self.subpasses
            .get(subpass as usize)
            .map(|s| {
                s.color
                    .iter()
                    .filter_map(|&i| self.color_attachments.get(i as usize))
                    .map(|a| a.blend.to_state())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the given subpass binds depth.
    pub fn subpass_uses_depth(&self, subpass: u32) -> bool {
        self.subpasses
            .get(subpass as usize)
            .is_some_and(|s| s.depth)
    }
}

impl RenderGraphDescriptor {
    /// Creates an empty description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a colour attachment.
    pub fn color(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    /// Sets the depth attachment.
    pub fn depth(mut self, attachment: DepthAttachment) -> Self {
        self.depth = Some(attachment);
        self
    }

    /// Appends a subpass.
    pub fn subpass(mut self, subpass: Subpass) -> Self {
        self.subpasses.push(subpass);
        self
    }

    /// Appends a dependency.
    pub fn dependency(mut self, dependency: SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    fn attachment_index(&self, name: &str) -> Option<u32> {
        if let Some(i) = self.color_attachments.iter().position(|a| a.name == name) {
            return Some(i as u32);
        }
        match &self.depth {
            Some(depth) if depth.name == name => Some(self.color_attachments.len() as u32),
            _ => None,
        }
    }

    fn resolve_subpass(&self, subpass: &SubpassRef) -> Result<Option<u32>, RenderGraphError> {
        match subpass {
            SubpassRef::External => Ok(None),
            SubpassRef::Named(name) => self
                .subpasses
                .iter()
                .position(|s| &s.name == name)
                .map(|i| Some(i as u32))
                .ok_or_else(|| RenderGraphError::UnknownSubpass {
                    pass: self.name.clone(),
                    subpass: name.clone(),
                }),
        }
    }

    /// Validates every reference and resolves names to indices.
    pub fn compile(&self) -> Result<RenderPassLayout, RenderGraphError> {
        if self.subpasses.is_empty() {
            return Err(RenderGraphError::NoSubpasses {
                pass: self.name.clone(),
            });
        }

        let mut names = self
            .color_attachments
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.depth.iter().map(|d| d.name.as_str()))
            .collect::<Vec<_>>();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(RenderGraphError::DuplicateAttachment {
                pass: self.name.clone(),
                attachment: dup[0].to_string(),
            });
        }

        let depth_index = self
            .depth
            .as_ref()
            .map(|_| self.color_attachments.len() as u32);
        let mut written = vec![false; names.len()];
        let mut subpasses = Vec::with_capacity(self.subpasses.len());

        for subpass in &self.subpasses {
            let resolve = |name: &String| {
                self.attachment_index(name)
                    .ok_or_else(|| RenderGraphError::UnknownAttachment {
                        pass: self.name.clone(),
                        subpass: subpass.name.clone(),
                        attachment: name.clone(),
                    })
            };

            let color = subpass.color.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;
            let input = subpass.input.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;

            if subpass.depth && depth_index.is_none() {
                return Err(RenderGraphError::MissingDepth {
                    pass: self.name.clone(),
                    subpass: subpass.name.clone(),
                });
            }
            if let Some(i) = color.iter().find(|&&i| Some(i) == depth_index) {
                return Err(RenderGraphError::UnknownAttachment {
                    pass: self.name.clone(),
                    subpass: subpass.name.clone(),
                    attachment: names_at(self, *i),
                });
            }

            for (&index, name) in input.iter().zip(&subpass.input) {
                if !written[index as usize] {
                    return Err(RenderGraphError::InputNotWritten {
                        pass: self.name.clone(),
                        subpass: subpass.name.clone(),
                        attachment: name.clone(),
                    });
                }
            }

            for &index in &color {
                written[index as usize] = true;
            }
            if subpass.depth {
                if let Some(index) = depth_index {
                    written[index as usize] = true;
                }
            }

            subpasses.push(SubpassLayout {
                name: subpass.name.clone(),
                color,
                input,
                depth: subpass.depth,
            });
        }

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            let src = self.resolve_subpass(&dependency.src)?;
            let dst = self.resolve_subpass(&dependency.dst)?;
            match (src, dst) {
                (None, None) => {
                    return Err(RenderGraphError::InvalidDependency {
                        pass: self.name.clone(),
                        reason: "both sides are external".to_string(),
                    });
                }
                (Some(s), Some(d)) if s > d => {
                    return Err(RenderGraphError::InvalidDependency {
                        pass: self.name.clone(),
                        reason: format!("subpass {s} cannot feed earlier subpass {d}"),
                    });
                }
                _ => {}
            }
            dependencies.push(DependencyLayout {
                src,
                dst,
                src_stages: dependency.src_stages,
                dst_stages: dependency.dst_stages,
                src_access: dependency.src_access,
                dst_access: dependency.dst_access,
                by_region: dependency.by_region,
            });
        }

        Ok(RenderPassLayout {
            name: self.name.clone(),
            color_attachments: self.color_attachments.clone(),
            depth: self.depth.clone(),
            subpasses,
            dependencies,
        })
    }
}

fn names_at(graph: &RenderGraphDescriptor, index: u32) -> String {
    graph
        .color_attachments
        .get(index as usize)
        .map(|a| a.name.clone())
        .or_else(|| graph.depth.as_ref().map(|d| d.name.clone()))
        .unwrap_or_default()
}

/// Describes the concrete image views bound to a compiled render pass.
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The render pass the framebuffer is compatible with.
    pub render_pass: RenderPassId,
    /// One view per attachment, in attachment index order (depth last).
    pub attachments: Cow<'a, [TextureViewId]>,
    /// The framebuffer size.
    pub extent: Extent2D,
}

/// An opaque handle to a backend render pass object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassId(pub usize);

/// An opaque handle to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    fn gbuffer_graph() -> RenderGraphDescriptor {
        RenderGraphDescriptor::new("deferred")
            .color(
                ColorAttachment::new("output", TextureFormat::Rgba16Float)
                    .blend(BlendMode::Additive),
            )
            .color(ColorAttachment::new("diffuse", TextureFormat::Rgba8Unorm))
            .color(ColorAttachment::new("normal", TextureFormat::Rgba16Float))
            .color(ColorAttachment::new("position", TextureFormat::Rgba32Float))
            .depth(DepthAttachment::new("depth"))
            .subpass(
                Subpass::new("geometry")
                    .writes(["diffuse", "normal", "position"])
                    .with_depth(),
            )
            .subpass(
                Subpass::new("lighting")
                    .writes(["output"])
                    .reads(["diffuse", "normal", "position", "depth"]),
            )
            .dependency(SubpassDependency {
                src: SubpassRef::named("geometry"),
                dst: SubpassRef::named("lighting"),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::INPUT_ATTACHMENT_READ,
                by_region: true,
            })
    }

    #[test]
    fn test_compile_resolves_indices() {
        let layout = gbuffer_graph().compile().unwrap();
        assert_eq!(layout.attachment_count(), 5);
        assert_eq!(layout.subpasses[0].color, vec![1, 2, 3]);
        assert_eq!(layout.subpasses[1].input, vec![1, 2, 3, 4]);
        assert_eq!(layout.subpass_index("lighting"), Some(1));
        assert_eq!(layout.dependencies[0].src, Some(0));
        assert_eq!(layout.dependencies[0].dst, Some(1));
        assert!(layout.subpass_uses_depth(0));
        assert!(!layout.subpass_uses_depth(1));
    }

    #[test]
    fn test_color_blends_follow_attachments() {
        let layout = gbuffer_graph().compile().unwrap();
        assert_eq!(layout.color_blends(0), vec![None, None, None]);
        assert_eq!(layout.color_blends(1), vec![BlendMode::Additive.to_state()]);
        assert!(layout.color_blends(7).is_empty());
    }

    #[test]
    fn test_input_must_be_written_earlier() {
        let graph = RenderGraphDescriptor::new("bad")
            .color(ColorAttachment::new("a", TextureFormat::Rgba8Unorm))
            .color(ColorAttachment::new("b", TextureFormat::Rgba8Unorm))
            .subpass(Subpass::new("first").writes(["a"]).reads(["b"]));
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::InputNotWritten { ref attachment, .. }) if attachment == "b"
        ));
    }

    #[test]
    fn test_unknown_attachment() {
        let graph = RenderGraphDescriptor::new("bad")
            .color(ColorAttachment::new("a", TextureFormat::Rgba8Unorm))
            .subpass(Subpass::new("first").writes(["missing"]));
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::UnknownAttachment { .. })
        ));
    }

    #[test]
    fn test_duplicate_attachment() {
        let graph = RenderGraphDescriptor::new("bad")
            .color(ColorAttachment::new("a", TextureFormat::Rgba8Unorm))
            .depth(DepthAttachment::new("a"))
            .subpass(Subpass::new("first").writes(["a"]));
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::DuplicateAttachment { .. })
        ));
    }

    #[test]
    fn test_depth_required() {
        let graph = RenderGraphDescriptor::new("bad")
            .color(ColorAttachment::new("a", TextureFormat::Rgba8Unorm))
            .subpass(Subpass::new("first").writes(["a"]).with_depth());
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::MissingDepth { .. })
        ));
    }

    #[test]
    fn test_dependency_validation() {
        let base = RenderGraphDescriptor::new("deps")
            .color(ColorAttachment::new("a", TextureFormat::Rgba8Unorm))
            .subpass(Subpass::new("first").writes(["a"]));
        let dependency = |src, dst| SubpassDependency {
            src,
            dst,
            src_stages: PipelineStages::BOTTOM_OF_PIPE,
            dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            src_access: AccessFlags::MEMORY_READ,
            dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            by_region: false,
        };

        let external = base
            .clone()
            .dependency(dependency(SubpassRef::External, SubpassRef::named("first")));
        assert_eq!(external.compile().unwrap().dependencies[0].src, None);

        let unknown = base
            .clone()
            .dependency(dependency(SubpassRef::External, SubpassRef::named("nope")));
        assert!(matches!(
            unknown.compile(),
            Err(RenderGraphError::UnknownSubpass { .. })
        ));

        let both_external =
            base.dependency(dependency(SubpassRef::External, SubpassRef::External));
        assert!(matches!(
            both_external.compile(),
            Err(RenderGraphError::InvalidDependency { .. })
        ));
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(matches!(
            RenderGraphDescriptor::new("empty").compile(),
            Err(RenderGraphError::NoSubpasses { .. })
        ));
    }
}
