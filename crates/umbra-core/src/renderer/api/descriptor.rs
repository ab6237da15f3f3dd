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

//! Defines descriptor set layouts and the writes that fill descriptor sets.
//!
//! A descriptor set is the group of resource references (buffers, textures,
//! samplers, input attachments) visible to the shader stages during a draw.

use super::buffer::BufferId;
use super::texture::{SamplerId, TextureViewId};
use crate::umbra_bitflags;
use std::borrow::Cow;

umbra_bitflags! {
    /// Shader stages that can see a binding.
    pub struct ShaderStages: u32 {
        /// The vertex stage.
        const VERTEX = 1 << 0;
        /// The fragment stage.
        const FRAGMENT = 1 << 1;
    }
}

impl ShaderStages {
    /// Both graphics stages.
    pub const ALL: Self = Self::from_bits(Self::VERTEX.bits() | Self::FRAGMENT.bits());
}

/// The type of resource bound at a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A uniform buffer (camera data, pass settings).
    UniformBuffer,
    /// A read-only storage buffer (object and light records).
    StorageBuffer,
    /// A fixed-size array of combined texture/sampler pairs.
    SampledTextureArray {
        /// Number of array elements.
        count: u32,
    },
    /// A single combined texture/sampler pair.
    SampledTexture,
    /// An attachment written by an earlier subpass of the same render pass.
    InputAttachment,
}

/// Describes a single binding in a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// The binding index (`@binding(n)` in WGSL).
    pub binding: u32,
    /// Which shader stages can access this binding.
    pub visibility: ShaderStages,
    /// The kind of resource.
    pub ty: BindingType,
}

impl DescriptorBinding {
    /// Creates a binding entry.
    pub const fn new(binding: u32, visibility: ShaderStages, ty: BindingType) -> Self {
        Self {
            binding,
            visibility,
            ty,
        }
    }
}

/// Describes a descriptor set layout to be created.
#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The bindings of the layout.
    pub bindings: Cow<'a, [DescriptorBinding]>,
}

/// The resource written into one binding of a descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// A whole buffer.
    Buffer(BufferId),
    /// A texture view sampled through a sampler.
    SampledTexture {
        /// The view to sample.
        view: TextureViewId,
        /// The sampler to use.
        sampler: SamplerId,
    },
    /// A view read as an input attachment.
    InputAttachment(TextureViewId),
}

/// One update applied by `GraphicsDevice::update_descriptor_set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// The binding index to write.
    pub binding: u32,
    /// The first array element written (0 for non-array bindings).
    pub array_element: u32,
    /// The resource.
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    /// Writes a buffer at `binding`.
    pub const fn buffer(binding: u32, buffer: BufferId) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::Buffer(buffer),
        }
    }

    /// Writes a sampled texture at `binding[array_element]`.
    pub const fn texture(
        binding: u32,
        array_element: u32,
        view: TextureViewId,
        sampler: SamplerId,
    ) -> Self {
        Self {
            binding,
            array_element,
            resource: DescriptorResource::SampledTexture { view, sampler },
        }
    }

    /// Writes an input attachment at `binding`.
    pub const fn input(binding: u32, view: TextureViewId) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::InputAttachment(view),
        }
    }
}

/// An opaque handle to a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetLayoutId(pub usize);

/// An opaque handle to a descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stages_all() {
        assert!(ShaderStages::ALL.contains(ShaderStages::VERTEX));
        assert!(ShaderStages::ALL.contains(ShaderStages::FRAGMENT));
    }

    #[test]
    fn test_write_helpers() {
        let write = DescriptorWrite::texture(3, 7, TextureViewId(1), SamplerId(2));
        assert_eq!(write.binding, 3);
        assert_eq!(write.array_element, 7);
        assert_eq!(
            write.resource,
            DescriptorResource::SampledTexture {
                view: TextureViewId(1),
                sampler: SamplerId(2)
            }
        );
        assert_eq!(
            DescriptorWrite::buffer(0, BufferId(4)).resource,
            DescriptorResource::Buffer(BufferId(4))
        );
    }
}
