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
use bytemuck::Pod;
use umbra_core::renderer::{
    BufferDescriptor, BufferId, GraphicsDevice, LightRecord, LightSettings, ObjectRecord,
    ResourceError,
};

/// A fixed-capacity array of `T` mirrored into a GPU storage buffer.
///
/// Records are appended in FIFO order and keep their slot until the next
/// [`reset`](Self::reset). The buffer never grows: the GPU side is allocated
/// once for `capacity` records.
#[derive(Debug)]
pub struct StagingBuffer<T: Pod> {
    label: &'static str,
    records: Vec<T>,
    capacity: usize,
    buffer: BufferId,
}

/// Per-object instance records.
pub type ObjectBuffer = StagingBuffer<ObjectRecord>;

impl<T: Pod> StagingBuffer<T> {
    /// Allocates the GPU buffer for `capacity` records.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &'static str,
        capacity: usize,
    ) -> Result<Self, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor::storage::<T>(label, capacity))?;
        Ok(Self {
            label,
            records: Vec::with_capacity(capacity),
            capacity,
            buffer,
        })
    }

    /// Forgets every record; the allocation is kept.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Appends a record and returns its slot.
    pub fn store(&mut self, record: T) -> Result<u32, CapacityError> {
        if self.records.len() >= self.capacity {
            return Err(CapacityError {
                buffer: self.label,
                capacity: self.capacity,
            });
        }
        self.records.push(record);
        Ok((self.records.len() - 1) as u32)
    }

    /// Copies the live records to the start of the GPU buffer and returns
    /// how many were written.
    pub fn flush(&self, device: &dyn GraphicsDevice) -> Result<usize, ResourceError> {
        if !self.records.is_empty() {
            device.write_buffer(self.buffer, 0, bytemuck::cast_slice(&self.records))?;
        }
        Ok(self.records.len())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record was stored since the last reset.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The GPU storage buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// The live records.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Releases the GPU buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        device.destroy_buffer(self.buffer)
    }
}

/// Light records behind a [`LightSettings`] header in slot 0.
///
/// Slot 0 is never handed out: the first stored light gets slot 1. At flush
/// the header's `count` is set to the number of lights that follow it.
#[derive(Debug)]
pub struct LightBuffer {
    lights: StagingBuffer<LightRecord>,
    settings: LightSettings,
}

impl LightBuffer {
    /// Allocates room for the header and `capacity` lights.
    pub fn new(device: &dyn GraphicsDevice, capacity: usize) -> Result<Self, ResourceError> {
        let lights = StagingBuffer::new(device, "lights", capacity + 1)?;
        let mut buffer = Self {
            lights,
            settings: LightSettings::default(),
        };
        buffer.reset();
        Ok(buffer)
    }

    /// Replaces the header settings.
    pub fn set_settings(&mut self, settings: LightSettings) {
        self.settings = settings;
    }

    /// The header settings (count as of the last flush).
    pub fn settings(&self) -> &LightSettings {
        &self.settings
    }

    /// Truncates to the header slot.
    pub fn reset(&mut self) {
        self.lights.reset();
        self.lights.records.push(bytemuck::cast(self.settings));
    }

    /// Appends a light and returns its slot (1-based).
    pub fn store(&mut self, record: LightRecord) -> Result<u32, CapacityError> {
        self.lights.store(record).map_err(|_| CapacityError {
            buffer: "lights",
            capacity: self.capacity(),
        })
    }

    /// Patches the header and copies header and lights to the GPU.
    ///
    /// Returns the number of records written, header included.
    pub fn flush(&mut self, device: &dyn GraphicsDevice) -> Result<usize, ResourceError> {
        self.settings.count = self.len() as i32;
        match self.lights.records.first_mut() {
            Some(header) => *header = bytemuck::cast(self.settings),
            None => self.lights.records.push(bytemuck::cast(self.settings)),
        }
        self.lights.flush(device)
    }

    /// Number of lights, excluding the header.
    pub fn len(&self) -> usize {
        self.lights.len().saturating_sub(1)
    }

    /// Returns `true` if no light was stored since the last reset.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of lights.
    pub fn capacity(&self) -> usize {
        self.lights.capacity() - 1
    }

    /// The GPU storage buffer.
    pub fn buffer(&self) -> BufferId {
        self.lights.buffer()
    }

    /// The stored lights, header excluded.
    pub fn lights(&self) -> &[LightRecord] {
        self.lights.records().get(1..).unwrap_or(&[])
    }

    /// Releases the GPU buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.lights.destroy(device)
    }
}
