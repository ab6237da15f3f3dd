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

use crate::error::CapacityError;
use umbra_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, DrawIndirectArgs, GraphicsDevice, RenderPass,
    ResourceError,
};

/// Indirect draw arguments for one frame, drawn in contiguous batches.
///
/// A batch is opened with [`begin`](Self::begin), filled with
/// [`push`](Self::push) and closed with [`end`](Self::end), which records a
/// single `draw_indirect` covering the batch. The arguments are read by the
/// GPU at execution time, so [`flush`](Self::flush) must run before the
/// command buffer is submitted.
#[derive(Debug)]
pub struct IndirectDrawBuffer {
    args: Vec<DrawIndirectArgs>,
    capacity: usize,
    batch_start: usize,
    buffer: BufferId,
}

impl IndirectDrawBuffer {
    /// Allocates room for `capacity` draws.
    pub fn new(device: &dyn GraphicsDevice, capacity: usize) -> Result<Self, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some("indirect draws".into()),
            size: capacity as u64 * u64::from(DrawIndirectArgs::STRIDE),
            usage: BufferUsage::INDIRECT | BufferUsage::HOST_VISIBLE | BufferUsage::COPY_DST,
        })?;
        Ok(Self {
            args: Vec::with_capacity(capacity),
            capacity,
            batch_start: 0,
            buffer,
        })
    }

    /// Forgets every draw of the previous frame.
    pub fn reset(&mut self) {
        self.args.clear();
        self.batch_start = 0;
    }

    /// Opens a batch.
    pub fn begin(&mut self) {
        self.batch_start = self.args.len();
    }

    /// Adds a draw to the open batch.
    pub fn push(&mut self, args: DrawIndirectArgs) -> Result<(), CapacityError> {
        if self.args.len() >= self.capacity {
            return Err(CapacityError {
                buffer: "indirect draw",
                capacity: self.capacity,
            });
        }
        self.args.push(args);
        Ok(())
    }

    /// Closes the batch, recording one indirect draw if it is not empty.
    ///
    /// Returns the number of draws in the batch.
    pub fn end(&mut self, pass: &mut dyn RenderPass) -> u32 {
        let count = (self.args.len() - self.batch_start) as u32;
        if count > 0 {
            pass.draw_indirect(
                self.buffer,
                self.batch_start as u64 * u64::from(DrawIndirectArgs::STRIDE),
                count,
                DrawIndirectArgs::STRIDE,
            );
        }
        self.batch_start = self.args.len();
        count
    }

    /// Writes every draw of this frame to the GPU buffer.
    pub fn flush(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.args.is_empty() {
            return Ok(());
        }
        device.write_buffer(self.buffer, 0, bytemuck::cast_slice(&self.args))
    }

    /// Draws recorded this frame.
    pub fn args(&self) -> &[DrawIndirectArgs] {
        &self.args
    }

    /// The GPU buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Releases the GPU buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        device.destroy_buffer(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::renderer::{
        ColorAttachment, RenderGraphDescriptor, RenderPassBeginInfo, Subpass, TextureFormat,
    };
    use umbra_infra::graphics::headless::{Command, HeadlessCommandEncoder};
    use umbra_infra::HeadlessDevice;

    #[test]
    fn test_batches_record_one_draw_each() {
        let device = HeadlessDevice::new();
        let layout = RenderGraphDescriptor::new("test")
            .color(ColorAttachment::new("out", TextureFormat::Rgba8Unorm))
            .subpass(Subpass::new("main").writes(["out"]))
            .compile()
            .unwrap();
        let render_pass = device.create_render_pass(&layout).unwrap();
        let mut indirect = IndirectDrawBuffer::new(&device, 8).unwrap();

        let mut encoder = device.create_command_encoder(Some("indirect"));
        {
            let info = RenderPassBeginInfo {
                render_pass,
                framebuffer: umbra_core::renderer::FramebufferId(0),
                clear_values: Vec::new(),
            };
            let mut pass = encoder.begin_render_pass(&info);
            indirect.begin();
            indirect.push(DrawIndirectArgs::object(0, 3)).unwrap();
            indirect.push(DrawIndirectArgs::object(1, 6)).unwrap();
            assert_eq!(indirect.end(pass.as_mut()), 2);
            indirect.begin();
            assert_eq!(indirect.end(pass.as_mut()), 0);
            indirect.begin();
            indirect.push(DrawIndirectArgs::object(2, 3)).unwrap();
            assert_eq!(indirect.end(pass.as_mut()), 1);
        }
        let commands = encoder
            .as_any_mut()
            .downcast_mut::<HeadlessCommandEncoder>()
            .unwrap()
            .commands()
            .to_vec();
        let draws = commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndirect { offset, count, .. } => Some((*offset, *count)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(draws, vec![(0, 2), (32, 1)]);

        indirect.flush(&device).unwrap();
        let bytes = device.read_buffer(indirect.buffer()).unwrap();
        let args: &[DrawIndirectArgs] = bytemuck::cast_slice(&bytes[..48]);
        assert_eq!(args[1], DrawIndirectArgs::object(1, 6));
    }

    #[test]
    fn test_push_past_capacity_fails() {
        let device = HeadlessDevice::new();
        let mut indirect = IndirectDrawBuffer::new(&device, 1).unwrap();
        indirect.push(DrawIndirectArgs::object(0, 3)).unwrap();
        assert!(indirect.push(DrawIndirectArgs::object(1, 3)).is_err());
        indirect.reset();
        assert!(indirect.args().is_empty());
    }
}
