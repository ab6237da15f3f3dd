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

//! Defines data structures used for recording and describing GPU commands.

use super::render_graph::{FramebufferId, RenderPassId};
use crate::math::LinearRgba;
use bytemuck::{Pod, Zeroable};

/// An opaque handle to a recorded command buffer that is ready for submission.
///
/// This ID is returned by `CommandEncoder::finish` and consumed by
/// `GraphicsDevice::submit_command_buffer`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// The arguments of one indirect draw, laid out as the GPU reads them.
///
/// The renderer emits one entry per object: `instance_count` is 1 and
/// `first_instance` carries the object's slot in the object buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    /// Number of vertices (here: indices pulled by the vertex shader).
    pub vertex_count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// First vertex.
    pub first_vertex: u32,
    /// First instance, visible to the shader as the instance index.
    pub first_instance: u32,
}

impl DrawIndirectArgs {
    /// Size of one entry in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// One instance of `object`, pulling `index_count` indices.
    pub const fn object(object: u32, index_count: u32) -> Self {
        Self {
            vertex_count: index_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: object,
        }
    }
}

/// The format of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    #[default]
    Uint32,
}

/// The clear value for one attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// A colour.
    Color(LinearRgba),
    /// A depth value.
    Depth(f32),
}

/// Everything needed to begin recording a render pass instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassBeginInfo {
    /// The compiled pass.
    pub render_pass: RenderPassId,
    /// The framebuffer holding this frame's attachments.
    pub framebuffer: FramebufferId,
    /// One clear value per attachment, in attachment index order.
    pub clear_values: Vec<ClearValue>,
}
