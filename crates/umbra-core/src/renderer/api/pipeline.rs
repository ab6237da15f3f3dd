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

//! Render pipeline state: rasterizer, depth and blend configuration plus the
//! descriptors used to create pipeline objects.

use super::descriptor::DescriptorSetLayoutId;
use super::render_graph::RenderPassId;
use super::shader::ShaderModuleId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Defines how vertices are connected to form a geometric primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    /// Every two vertices form an isolated line.
    LineList,
    /// Every three vertices form an isolated triangle.
    #[default]
    TriangleList,
    /// Vertices form a connected triangle strip.
    TriangleStrip,
}

/// Defines which face of a triangle to cull (not render).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling is performed.
    None,
    /// Cull front-facing triangles (used by shadow casters to reduce acne).
    Front,
    /// Cull back-facing triangles.
    #[default]
    Back,
}

/// The comparison function used for depth testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompareFunction {
    /// The test never passes.
    Never,
    /// The test passes if the new value is less than the existing value.
    Less,
    /// The test passes if the new value is equal to the existing value.
    Equal,
    /// The test passes if the new value is less than or equal to the existing value.
    #[default]
    LessEqual,
    /// The test passes if the new value is greater than the existing value.
    Greater,
    /// The test always passes.
    Always,
}

/// Identifies the vertex format a material expects.
///
/// Geometry is fetched in the vertex stage through the GPU addresses stored in
/// each object record, so the layout only selects the shader's decoding path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VertexLayout {
    /// Position, normal and texture coordinates.
    #[default]
    Standard,
    /// Position, normal and per-vertex colour.
    Colored,
    /// Screen-space position, texture coordinates and colour for UI quads.
    Ui,
    /// Position and colour for debug lines.
    Line,
    /// No vertex input; the shader generates positions (full-screen triangles).
    Generated,
}

/// A multiplier applied to a source or destination colour during blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0.0
    Zero,
    /// 1.0
    One,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination colour.
    Dst,
}

/// The operation combining the weighted source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    /// `src + dst`
    Add,
}

/// A complete blend equation for one channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    /// The blend factor for the fragment output.
    pub src_factor: BlendFactor,
    /// The blend factor for the value already in the attachment.
    pub dst_factor: BlendFactor,
    /// The combining operation.
    pub operation: BlendOperation,
}

/// Describes the blend state for a single colour target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// The blend equation for RGB.
    pub color: BlendComponent,
    /// The blend equation for alpha.
    pub alpha: BlendComponent,
}

/// Named blend presets attached to colour attachments in a render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Overwrite the attachment.
    #[default]
    None,
    /// Classic alpha blending for transparent geometry and UI.
    Alpha,
    /// `src + dst`, used to accumulate light contributions.
    Additive,
    /// `src * dst`, used when forward geometry modulates the lit image.
    Multiply,
}

impl BlendMode {
    /// Expands the preset into an explicit blend state, or `None` when blending is off.
    pub fn to_state(&self) -> Option<BlendState> {
        let component = |src_factor, dst_factor| BlendComponent {
            src_factor,
            dst_factor,
            operation: BlendOperation::Add,
        };
        match self {
            BlendMode::None => None,
            BlendMode::Alpha => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
                alpha: component(BlendFactor::One, BlendFactor::Zero),
            }),
            BlendMode::Additive => Some(BlendState {
                color: component(BlendFactor::One, BlendFactor::One),
                alpha: component(BlendFactor::One, BlendFactor::Zero),
            }),
            BlendMode::Multiply => Some(BlendState {
                color: component(BlendFactor::Dst, BlendFactor::Zero),
                alpha: component(BlendFactor::One, BlendFactor::Zero),
            }),
        }
    }
}

/// Depth testing configuration of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthState {
    /// Whether fragments are tested against the depth attachment.
    pub test: bool,
    /// Whether passing fragments write their depth.
    pub write: bool,
    /// Whether depth is clamped instead of clipped (shadow casters behind the near plane).
    pub clamp: bool,
    /// The comparison used when `test` is enabled.
    pub compare: CompareFunction,
}

/// A descriptor used to create a [`PipelineLayoutId`].
#[derive(Debug, Clone)]
pub struct PipelineLayoutDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The descriptor set layouts, in set index order.
    pub set_layouts: Cow<'a, [DescriptorSetLayoutId]>,
}

/// A complete descriptor for a render pipeline.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The module holding the `vs_main` / `fs_main` entry points.
    pub shader: ShaderModuleId,
    /// The pipeline layout.
    pub layout: PipelineLayoutId,
    /// The render pass the pipeline is compatible with.
    pub render_pass: RenderPassId,
    /// The subpass index within `render_pass`.
    pub subpass: u32,
    /// The vertex decoding path.
    pub vertex_layout: VertexLayout,
    /// Primitive assembly topology.
    pub primitive: PrimitiveTopology,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Depth configuration.
    pub depth: DepthState,
    /// One blend state per colour attachment written by the subpass.
    pub color_blends: Cow<'a, [Option<BlendState>]>,
}

/// An opaque handle to a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineLayoutId(pub usize);

/// An opaque handle to a compiled render pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_presets() {
        assert!(BlendMode::None.to_state().is_none());
        let additive = BlendMode::Additive.to_state().unwrap();
        assert_eq!(additive.color.src_factor, BlendFactor::One);
        assert_eq!(additive.color.dst_factor, BlendFactor::One);
        let multiply = BlendMode::Multiply.to_state().unwrap();
        assert_eq!(multiply.color.src_factor, BlendFactor::Dst);
    }

    #[test]
    fn test_defaults_match_opaque_geometry() {
        assert_eq!(CullMode::default(), CullMode::Back);
        assert_eq!(CompareFunction::default(), CompareFunction::LessEqual);
        assert_eq!(PrimitiveTopology::default(), PrimitiveTopology::TriangleList);
    }
}
