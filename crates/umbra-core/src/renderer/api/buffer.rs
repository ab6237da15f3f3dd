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

//! Defines data structures related to GPU buffer resources.

use crate::umbra_bitflags;
use std::borrow::Cow;

umbra_bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// The backend uses them to pick a memory type (device-local vs. host-visible)
    /// and to validate bindings at runtime.
    pub struct BufferUsage: u32 {
        /// The buffer can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The buffer can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 2;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 3;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 4;
        /// The buffer can be bound as a storage buffer.
        const STORAGE = 1 << 5;
        /// The buffer can supply indirect draw arguments.
        const INDIRECT = 1 << 6;
        /// The buffer lives in host-visible memory and is written directly by the CPU.
        const HOST_VISIBLE = 1 << 7;
        /// The buffer exposes a device address that shaders can dereference.
        const DEVICE_ADDRESS = 1 << 8;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    pub usage: BufferUsage,
}

impl<'a> BufferDescriptor<'a> {
    /// Describes a host-visible storage buffer holding `count` elements of `T`.
    pub fn storage<T>(label: impl Into<Cow<'a, str>>, count: usize) -> Self {
        Self {
            label: Some(label.into()),
            size: (std::mem::size_of::<T>() * count) as u64,
            usage: BufferUsage::STORAGE | BufferUsage::HOST_VISIBLE | BufferUsage::COPY_DST,
        }
    }

    /// Describes a host-visible uniform buffer holding a single `T`.
    pub fn uniform<T>(label: impl Into<Cow<'a, str>>) -> Self {
        Self {
            label: Some(label.into()),
            size: std::mem::size_of::<T>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::HOST_VISIBLE | BufferUsage::COPY_DST,
        }
    }
}

/// An opaque handle to a GPU buffer resource.
///
/// This ID is returned by `GraphicsDevice::create_buffer` and is used to reference
/// the buffer in all subsequent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_descriptor_size_and_usage() {
        let desc = BufferDescriptor::storage::<[f32; 4]>("objects", 10);
        assert_eq!(desc.size, 160);
        assert!(desc.usage.contains(BufferUsage::STORAGE | BufferUsage::HOST_VISIBLE));
        assert!(!desc.usage.contains(BufferUsage::UNIFORM));
    }

    #[test]
    fn test_usage_flags_combine() {
        let mut usage = BufferUsage::empty();
        assert!(usage.is_empty());
        usage |= BufferUsage::INDIRECT;
        assert!(usage.intersects(BufferUsage::INDIRECT | BufferUsage::VERTEX));
        assert_eq!((usage & BufferUsage::VERTEX), BufferUsage::empty());
    }
}
