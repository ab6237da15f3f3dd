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

//! Material definitions.
//!
//! A [`MaterialDef`] is an immutable value describing which shader a drawable
//! uses and the fixed-function state around it. Its identity is a content
//! hash: equal definitions always produce the same [`MaterialId`], which is
//! the key of every pipeline cache.

use crate::renderer::api::{CompareFunction, CullMode, PrimitiveTopology, VertexLayout};
use serde::{Deserialize, Serialize};

/// The pass family a drawable is rendered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrawPass {
    /// G-buffer fill followed by deferred lighting.
    #[default]
    Deferred,
    /// Forward shading after the deferred composite.
    Forward,
    /// Screen-space interface elements, drawn last.
    Ui,
}

/// A stable 64-bit content hash of a [`MaterialDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// The immutable description of a material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Registry name of the shader.
    pub shader: String,
    /// Vertex decoding path.
    pub vertex_layout: VertexLayout,
    /// Depth test enabled.
    pub depth_test: bool,
    /// Depth write enabled.
    pub depth_write: bool,
    /// Depth clamp enabled.
    pub depth_clamp: bool,
    /// Depth comparison.
    pub depth_func: CompareFunction,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Primitive topology.
    pub primitive: PrimitiveTopology,
    /// Whether the material blends with what is behind it.
    pub transparent: bool,
    /// The pass family that renders it.
    pub pass: DrawPass,
}

impl MaterialDef {
    /// Computes the content hash.
    pub fn id(&self) -> MaterialId {
        MaterialId(crate::stable_hasher().hash_one(self))
    }

    /// Opaque geometry filling the G-buffer.
    pub fn standard_deferred() -> Self {
        Self {
            shader: "deferred/textured".to_string(),
            vertex_layout: VertexLayout::Standard,
            depth_test: true,
            depth_write: true,
            depth_clamp: false,
            depth_func: CompareFunction::LessEqual,
            cull_mode: CullMode::Back,
            primitive: PrimitiveTopology::TriangleList,
            transparent: false,
            pass: DrawPass::Deferred,
        }
    }

    /// Opaque geometry shaded in the forward pass.
    pub fn standard_forward() -> Self {
        Self {
            shader: "forward/textured".to_string(),
            pass: DrawPass::Forward,
            ..Self::standard_deferred()
        }
    }

    /// Blended geometry drawn back to front in the forward pass.
    pub fn transparent_forward() -> Self {
        Self {
            shader: "forward/textured".to_string(),
            depth_write: false,
            cull_mode: CullMode::None,
            transparent: true,
            pass: DrawPass::Forward,
            ..Self::standard_deferred()
        }
    }

    /// Interface quads: no depth, no culling.
    pub fn ui() -> Self {
        Self {
            shader: "ui/quad".to_string(),
            vertex_layout: VertexLayout::Ui,
            depth_test: false,
            depth_write: false,
            depth_clamp: false,
            depth_func: CompareFunction::Always,
            cull_mode: CullMode::None,
            primitive: PrimitiveTopology::TriangleList,
            transparent: true,
            pass: DrawPass::Ui,
        }
    }

    /// Debug lines rendered in the forward pass.
    pub fn lines() -> Self {
        Self {
            shader: "forward/lines".to_string(),
            vertex_layout: VertexLayout::Line,
            cull_mode: CullMode::None,
            primitive: PrimitiveTopology::LineList,
            pass: DrawPass::Forward,
            ..Self::standard_deferred()
        }
    }

    /// Returns a copy using another shader.
    pub fn with_shader(&self, shader: impl Into<String>) -> Self {
        Self {
            shader: shader.into(),
            ..self.clone()
        }
    }

    /// Returns a copy with another cull mode.
    pub fn with_cull_mode(&self, cull_mode: CullMode) -> Self {
        Self {
            cull_mode,
            ..self.clone()
        }
    }

    /// Returns a copy with the given depth test/write/clamp flags.
    pub fn with_depth(&self, test: bool, write: bool, clamp: bool) -> Self {
        Self {
            depth_test: test,
            depth_write: write,
            depth_clamp: clamp,
            ..self.clone()
        }
    }

    /// Returns a copy tagged for another pass.
    pub fn with_pass(&self, pass: DrawPass) -> Self {
        Self {
            pass,
            ..self.clone()
        }
    }

    /// Returns a copy with the transparency flag set.
    pub fn with_transparent(&self, transparent: bool) -> Self {
        Self {
            transparent,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_definitions_hash_equal() {
        let a = MaterialDef::standard_deferred();
        let b = MaterialDef::standard_deferred();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_any_field_changes_identity() {
        let base = MaterialDef::standard_deferred();
        let ids = [
            base.id(),
            base.with_shader("deferred/colored").id(),
            base.with_cull_mode(CullMode::Front).id(),
            base.with_depth(true, false, false).id(),
            base.with_pass(DrawPass::Forward).id(),
            base.with_transparent(true).id(),
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_presets() {
        let transparent = MaterialDef::transparent_forward();
        assert!(transparent.transparent);
        assert!(!transparent.depth_write);
        assert_eq!(transparent.pass, DrawPass::Forward);
        assert_eq!(MaterialDef::ui().pass, DrawPass::Ui);
        assert_eq!(MaterialDef::lines().primitive, PrimitiveTopology::LineList);
    }
}
