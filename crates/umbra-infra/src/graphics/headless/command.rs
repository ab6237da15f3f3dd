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

//! Command recording for the headless backend.
//!
//! Nothing is executed while recording: every call is appended to a flat
//! [`Command`] list that the device replays (buffer copies) and archives on
//! submission.

use std::any::Any;
use std::ops::Range;

use umbra_core::renderer::traits::{CommandEncoder, RenderPass};
use umbra_core::renderer::{
    BufferId, CommandBufferId, DescriptorSetId, FramebufferId, IndexFormat, RenderPassBeginInfo,
    RenderPassId, RenderPipelineId,
};

use super::device::HeadlessDevice;

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start of a render pass instance.
    BeginRenderPass {
        /// The compiled pass.
        render_pass: RenderPassId,
        /// The framebuffer.
        framebuffer: FramebufferId,
        /// Number of clear values supplied.
        clear_values: usize,
    },
    /// Pipeline bind.
    SetPipeline(RenderPipelineId),
    /// Descriptor set bind.
    SetDescriptorSet {
        /// Set index.
        index: u32,
        /// The set.
        set: DescriptorSetId,
    },
    /// Vertex buffer bind.
    SetVertexBuffer {
        /// Binding slot.
        slot: u32,
        /// The buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
    },
    /// Index buffer bind.
    SetIndexBuffer {
        /// The buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
        /// Index width.
        format: IndexFormat,
    },
    /// Non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Value added to each index.
        base_vertex: i32,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Indirect draws read from a buffer.
    DrawIndirect {
        /// The argument buffer.
        buffer: BufferId,
        /// Byte offset of the first entry.
        offset: u64,
        /// Number of entries.
        count: u32,
        /// Byte distance between entries.
        stride: u32,
    },
    /// Subpass transition.
    NextSubpass,
    /// End of the current render pass instance.
    EndRenderPass,
    /// Buffer to buffer copy, executed at submission.
    CopyBufferToBuffer {
        /// Source buffer.
        source: BufferId,
        /// Source byte offset.
        source_offset: u64,
        /// Destination buffer.
        destination: BufferId,
        /// Destination byte offset.
        destination_offset: u64,
        /// Bytes to copy.
        size: u64,
    },
}

/// Records commands into a list owned by the encoder.
#[derive(Debug)]
pub struct HeadlessCommandEncoder {
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<Command>,
    pub(crate) device: HeadlessDevice,
}

impl HeadlessCommandEncoder {
    /// The commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        info: &RenderPassBeginInfo,
    ) -> Box<dyn RenderPass + 'encoder> {
        let subpass_count = match self.device.subpass_count(info.render_pass) {
            Some(count) => count,
            None => {
                log::warn!(
                    "HeadlessRenderPass: Render pass with ID {:?} not found.",
                    info.render_pass
                );
                0
            }
        };

        self.commands.push(Command::BeginRenderPass {
            render_pass: info.render_pass,
            framebuffer: info.framebuffer,
            clear_values: info.clear_values.len(),
        });

        Box::new(HeadlessRenderPass {
            commands: &mut self.commands,
            subpass: 0,
            subpass_count,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let HeadlessCommandEncoder {
            label,
            commands,
            device,
        } = *self;
        device.store_command_buffer(label, commands)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An open render pass; ends when dropped.
#[derive(Debug)]
pub struct HeadlessRenderPass<'encoder> {
    commands: &'encoder mut Vec<Command>,
    subpass: u32,
    subpass_count: u32,
}

impl RenderPass for HeadlessRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_descriptor_set(&mut self, index: u32, set: DescriptorSetId) {
        self.commands.push(Command::SetDescriptorSet { index, set });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        self.commands.push(Command::SetVertexBuffer {
            slot,
            buffer,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat) {
        self.commands.push(Command::SetIndexBuffer {
            buffer,
            offset,
            format: index_format,
        });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indirect(&mut self, buffer: BufferId, offset: u64, count: u32, stride: u32) {
        self.commands.push(Command::DrawIndirect {
            buffer,
            offset,
            count,
            stride,
        });
    }

    fn next_subpass(&mut self) {
        if self.subpass + 1 >= self.subpass_count {
            log::warn!(
                "HeadlessRenderPass: next_subpass past the last subpass ({} of {}).",
                self.subpass + 1,
                self.subpass_count
            );
        }
        self.subpass += 1;
        self.commands.push(Command::NextSubpass);
    }
}

impl Drop for HeadlessRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }
}
