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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use umbra_core::renderer::traits::CommandEncoder;
use umbra_core::renderer::{
    BindingType, BufferDescriptor, BufferId, BufferUsage, CommandBufferId, DescriptorBinding,
    DescriptorResource, DescriptorSetId, DescriptorSetLayoutDescriptor, DescriptorSetLayoutId,
    DescriptorWrite, DrawIndirectArgs, FramebufferDescriptor, FramebufferId, GraphicsDevice,
    ImageAspect, PipelineError, PipelineLayoutDescriptor, PipelineLayoutId, RenderPassId,
    RenderPassLayout, RenderPipelineDescriptor, RenderPipelineId, ResourceError,
    SamplerDescriptor, SamplerId, ShaderError, ShaderModuleDescriptor, ShaderModuleId,
    ShaderSourceData, TextureDescriptor, TextureId, TextureViewDescriptor, TextureViewId,
    FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT,
};

use super::command::{Command, HeadlessCommandEncoder};

/// First device address handed out; zero stays reserved for "no buffer".
const ADDRESS_BASE: u64 = 0x1_0000;
/// Device addresses are aligned like storage buffer offsets.
const ADDRESS_ALIGNMENT: u64 = 256;

#[derive(Debug)]
struct ShaderModuleEntry {
    label: Option<String>,
}

#[derive(Debug)]
struct FramebufferEntry {
    render_pass: RenderPassId,
}

#[derive(Debug)]
struct DescriptorSetEntry {
    layout: DescriptorSetLayoutId,
    bindings: HashMap<(u32, u32), DescriptorResource>,
}

#[derive(Debug)]
struct RenderPipelineEntry {
    label: Option<String>,
    render_pass: RenderPassId,
    subpass: u32,
}

#[derive(Debug)]
struct BufferEntry {
    label: Option<String>,
    data: Vec<u8>,
    usage: BufferUsage,
    address: u64,
}

#[derive(Debug)]
struct TextureEntry {
    descriptor_size: u64,
    data: Vec<u8>,
}

#[derive(Debug)]
struct TextureViewEntry {
    texture: TextureId,
    #[allow(dead_code)]
    aspect: ImageAspect,
}

#[derive(Debug)]
struct PendingCommandBuffer {
    label: Option<String>,
    commands: Vec<Command>,
}

/// A draw as it would reach the GPU, with indirect arguments resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// The render pass the draw was recorded in.
    pub render_pass: RenderPassId,
    /// The subpass index.
    pub subpass: u32,
    /// The bound pipeline, if any.
    pub pipeline: Option<RenderPipelineId>,
    /// The label of the bound pipeline.
    pub pipeline_label: Option<String>,
    /// The draw arguments.
    pub args: DrawIndirectArgs,
}

/// One submitted command buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// The encoder label.
    pub label: Option<String>,
    /// Every recorded command, in order.
    pub commands: Vec<Command>,
    /// Every draw, expanded to one record per indirect entry.
    pub draws: Vec<DrawRecord>,
}

impl Submission {
    /// Draws recorded inside the given pass and subpass.
    pub fn draws_in(&self, render_pass: RenderPassId, subpass: u32) -> Vec<&DrawRecord> {
        self.draws
            .iter()
            .filter(|d| d.render_pass == render_pass && d.subpass == subpass)
            .collect()
    }
}

/// Counts of live resources per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    /// Shader modules.
    pub shader_modules: usize,
    /// Render passes.
    pub render_passes: usize,
    /// Framebuffers.
    pub framebuffers: usize,
    /// Descriptor set layouts.
    pub descriptor_set_layouts: usize,
    /// Descriptor sets.
    pub descriptor_sets: usize,
    /// Pipeline layouts.
    pub pipeline_layouts: usize,
    /// Render pipelines.
    pub pipelines: usize,
    /// Buffers.
    pub buffers: usize,
    /// Textures.
    pub textures: usize,
    /// Texture views.
    pub texture_views: usize,
    /// Samplers.
    pub samplers: usize,
}

impl LiveResources {
    /// Sum over every kind.
    pub fn total(&self) -> usize {
        self.shader_modules
            + self.render_passes
            + self.framebuffers
            + self.descriptor_set_layouts
            + self.descriptor_sets
            + self.pipeline_layouts
            + self.pipelines
            + self.buffers
            + self.textures
            + self.texture_views
            + self.samplers
    }
}

/// The internal, non-clonable state of the [`HeadlessDevice`].
#[derive(Debug, Default)]
pub struct HeadlessDeviceInternal {
    shader_modules: Mutex<HashMap<ShaderModuleId, ShaderModuleEntry>>,
    render_passes: Mutex<HashMap<RenderPassId, RenderPassLayout>>,
    framebuffers: Mutex<HashMap<FramebufferId, FramebufferEntry>>,
    set_layouts: Mutex<HashMap<DescriptorSetLayoutId, Vec<DescriptorBinding>>>,
    descriptor_sets: Mutex<HashMap<DescriptorSetId, DescriptorSetEntry>>,
    pipeline_layouts: Mutex<HashMap<PipelineLayoutId, Vec<DescriptorSetLayoutId>>>,
    pipelines: Mutex<HashMap<RenderPipelineId, RenderPipelineEntry>>,
    buffers: Mutex<HashMap<BufferId, BufferEntry>>,
    textures: Mutex<HashMap<TextureId, TextureEntry>>,
    texture_views: Mutex<HashMap<TextureViewId, TextureViewEntry>>,
    samplers: Mutex<HashMap<SamplerId, ()>>,

    /// Shared by every resource kind; ids are never reused.
    next_id: AtomicUsize,
    next_address: AtomicU64,

    allocated_bytes: AtomicU64,
    peak_bytes: AtomicU64,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, PendingCommandBuffer>>,
    command_buffer_id_counter: AtomicU64,
    submitted: Mutex<Vec<Submission>>,
}

/// A clonable, thread-safe handle to a device that keeps every resource in
/// host memory and executes nothing but buffer copies.
///
/// It validates handles and descriptors the way a real backend would and
/// archives every submitted command buffer, which makes it the backend of
/// choice for tests and offline tooling.
#[derive(Clone, Debug, Default)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}")))
}

fn label_of(label: Option<&str>) -> Option<String> {
    label.map(str::to_owned)
}

impl HeadlessDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id(&self) -> usize {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn track_alloc(&self, bytes: u64) {
        let now = self
            .internal
            .allocated_bytes
            .fetch_add(bytes, Ordering::Relaxed)
            + bytes;
        self.internal.peak_bytes.fetch_max(now, Ordering::Relaxed);
    }

    fn track_free(&self, bytes: u64) {
        self.internal
            .allocated_bytes
            .fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Bytes currently held by buffers and textures.
    pub fn allocated_bytes(&self) -> u64 {
        self.internal.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Highest value [`allocated_bytes`](Self::allocated_bytes) ever reached.
    pub fn peak_bytes(&self) -> u64 {
        self.internal.peak_bytes.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the live resource counts.
    pub fn live_resources(&self) -> Result<LiveResources, ResourceError> {
        let i = &self.internal;
        Ok(LiveResources {
            shader_modules: lock(&i.shader_modules, "shader_modules")?.len(),
            render_passes: lock(&i.render_passes, "render_passes")?.len(),
            framebuffers: lock(&i.framebuffers, "framebuffers")?.len(),
            descriptor_set_layouts: lock(&i.set_layouts, "set_layouts")?.len(),
            descriptor_sets: lock(&i.descriptor_sets, "descriptor_sets")?.len(),
            pipeline_layouts: lock(&i.pipeline_layouts, "pipeline_layouts")?.len(),
            pipelines: lock(&i.pipelines, "pipelines")?.len(),
            buffers: lock(&i.buffers, "buffers")?.len(),
            textures: lock(&i.textures, "textures")?.len(),
            texture_views: lock(&i.texture_views, "texture_views")?.len(),
            samplers: lock(&i.samplers, "samplers")?.len(),
        })
    }

    /// Reads back the whole content of a buffer.
    pub fn read_buffer(&self, id: BufferId) -> Result<Vec<u8>, ResourceError> {
        let buffers = lock(&self.internal.buffers, "buffers")?;
        buffers
            .get(&id)
            .map(|entry| entry.data.clone())
            .ok_or(ResourceError::InvalidHandle)
    }

    /// Reads back the texels last uploaded to a texture (empty if never written).
    pub fn read_texture(&self, id: TextureId) -> Result<Vec<u8>, ResourceError> {
        let textures = lock(&self.internal.textures, "textures")?;
        textures
            .get(&id)
            .map(|entry| entry.data.clone())
            .ok_or(ResourceError::InvalidHandle)
    }

    /// The debug label a buffer was created with.
    pub fn buffer_label(&self, id: BufferId) -> Option<String> {
        let buffers = lock(&self.internal.buffers, "buffers").ok()?;
        buffers.get(&id).and_then(|entry| entry.label.clone())
    }

    /// The texture a view was created from.
    pub fn view_texture(&self, id: TextureViewId) -> Option<TextureId> {
        let views = lock(&self.internal.texture_views, "texture_views").ok()?;
        views.get(&id).map(|entry| entry.texture)
    }

    /// The resource currently written at `set[binding][element]`.
    pub fn descriptor(
        &self,
        set: DescriptorSetId,
        binding: u32,
        element: u32,
    ) -> Option<DescriptorResource> {
        let sets = lock(&self.internal.descriptor_sets, "descriptor_sets").ok()?;
        sets.get(&set)
            .and_then(|entry| entry.bindings.get(&(binding, element)).copied())
    }

    /// The label a shader module was created with.
    pub fn shader_label(&self, id: ShaderModuleId) -> Option<String> {
        let modules = lock(&self.internal.shader_modules, "shader_modules").ok()?;
        modules.get(&id).and_then(|entry| entry.label.clone())
    }

    /// The label a render pipeline was created with.
    pub fn pipeline_label(&self, id: RenderPipelineId) -> Option<String> {
        let pipelines = lock(&self.internal.pipelines, "pipelines").ok()?;
        pipelines.get(&id).and_then(|entry| entry.label.clone())
    }

    /// Returns every submission so far, oldest first.
    pub fn submitted(&self) -> Vec<Submission> {
        lock(&self.internal.submitted, "submitted")
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Returns and forgets every submission so far.
    pub fn take_submissions(&self) -> Vec<Submission> {
        lock(&self.internal.submitted, "submitted")
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    pub(crate) fn subpass_count(&self, render_pass: RenderPassId) -> Option<u32> {
        let passes = lock(&self.internal.render_passes, "render_passes").ok()?;
        passes.get(&render_pass).map(|l| l.subpasses.len() as u32)
    }

    pub(crate) fn store_command_buffer(
        &self,
        label: Option<String>,
        commands: Vec<Command>,
    ) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::Relaxed),
        );
        match lock(&self.internal.pending_command_buffers, "command_buffers") {
            Ok(mut pending) => {
                pending.insert(id, PendingCommandBuffer { label, commands });
            }
            Err(e) => log::error!("HeadlessDevice: Dropped command buffer {id:?}: {e}"),
        }
        id
    }

    fn copy_buffer(
        &self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers, "buffers")?;
        let src = buffers.get(&source).ok_or(ResourceError::InvalidHandle)?;
        let src_size = src.data.len() as u64;
        if source_offset + size > src_size {
            return Err(ResourceError::OutOfBounds {
                offset: source_offset,
                len: size,
                size: src_size,
            });
        }
        let range = source_offset as usize..(source_offset + size) as usize;
        let bytes = src.data[range].to_vec();

        let dst = buffers
            .get_mut(&destination)
            .ok_or(ResourceError::InvalidHandle)?;
        let dst_size = dst.data.len() as u64;
        if destination_offset + size > dst_size {
            return Err(ResourceError::OutOfBounds {
                offset: destination_offset,
                len: size,
                size: dst_size,
            });
        }
        let start = destination_offset as usize;
        dst.data[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn read_indirect(
        &self,
        buffer: BufferId,
        offset: u64,
        count: u32,
        stride: u32,
    ) -> Result<Vec<DrawIndirectArgs>, ResourceError> {
        let buffers = lock(&self.internal.buffers, "buffers")?;
        let entry = buffers.get(&buffer).ok_or(ResourceError::InvalidHandle)?;
        let entry_size = std::mem::size_of::<DrawIndirectArgs>() as u64;
        let size = entry.data.len() as u64;
        (0..count as u64)
            .map(|i| {
                let at = offset + i * stride as u64;
                if at + entry_size > size {
                    return Err(ResourceError::OutOfBounds {
                        offset: at,
                        len: entry_size,
                        size,
                    });
                }
                let bytes = &entry.data[at as usize..(at + entry_size) as usize];
                Ok(bytemuck::pod_read_unaligned(bytes))
            })
            .collect()
    }

    /// Executes copies and expands draws, in recording order.
    fn replay(&self, commands: &[Command]) -> Vec<DrawRecord> {
        let mut draws = Vec::new();
        let mut render_pass = RenderPassId(usize::MAX);
        let mut subpass = 0;
        let mut pipeline = None;
        let mut pipeline_label = None;

        let mut push = |args, render_pass, subpass, pipeline, label: &Option<String>| {
            draws.push(DrawRecord {
                render_pass,
                subpass,
                pipeline,
                pipeline_label: label.clone(),
                args,
            })
        };

        for command in commands {
            match command {
                Command::BeginRenderPass {
                    render_pass: pass, ..
                } => {
                    render_pass = *pass;
                    subpass = 0;
                    pipeline = None;
                    pipeline_label = None;
                }
                Command::NextSubpass => {
                    subpass += 1;
                    pipeline = None;
                    pipeline_label = None;
                }
                Command::SetPipeline(id) => {
                    pipeline = Some(*id);
                    pipeline_label = self.pipeline_label(*id);
                }
                Command::Draw {
                    vertices,
                    instances,
                } => {
                    let args = DrawIndirectArgs {
                        vertex_count: vertices.len() as u32,
                        instance_count: instances.len() as u32,
                        first_vertex: vertices.start,
                        first_instance: instances.start,
                    };
                    push(args, render_pass, subpass, pipeline, &pipeline_label);
                }
                Command::DrawIndexed {
                    indices, instances, ..
                } => {
                    let args = DrawIndirectArgs {
                        vertex_count: indices.len() as u32,
                        instance_count: instances.len() as u32,
                        first_vertex: indices.start,
                        first_instance: instances.start,
                    };
                    push(args, render_pass, subpass, pipeline, &pipeline_label);
                }
                Command::DrawIndirect {
                    buffer,
                    offset,
                    count,
                    stride,
                } => match self.read_indirect(*buffer, *offset, *count, *stride) {
                    Ok(entries) => {
                        for args in entries {
                            push(args, render_pass, subpass, pipeline, &pipeline_label);
                        }
                    }
                    Err(e) => log::warn!("HeadlessDevice: Bad indirect draw from {buffer:?}: {e}"),
                },
                Command::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    if let Err(e) = self.copy_buffer(
                        *source,
                        *source_offset,
                        *destination,
                        *destination_offset,
                        *size,
                    ) {
                        log::warn!(
                            "HeadlessDevice: Copy {source:?} -> {destination:?} failed: {e}"
                        );
                    }
                }
                Command::SetDescriptorSet { .. }
                | Command::SetVertexBuffer { .. }
                | Command::SetIndexBuffer { .. }
                | Command::EndRenderPass => {}
            }
        }
        draws
    }

    fn validate_write(
        &self,
        layout: &[DescriptorBinding],
        write: &DescriptorWrite,
    ) -> Result<(), ResourceError> {
        let binding = layout
            .iter()
            .find(|b| b.binding == write.binding)
            .ok_or_else(|| {
                ResourceError::BackendError(format!("No binding {} in layout", write.binding))
            })?;

        let elements = match binding.ty {
            BindingType::SampledTextureArray { count } => count,
            _ => 1,
        };
        if write.array_element >= elements {
            return Err(ResourceError::BackendError(format!(
                "Element {} out of range for binding {} ({} elements)",
                write.array_element, write.binding, elements
            )));
        }

        let matches = match (binding.ty, write.resource) {
            (
                BindingType::UniformBuffer | BindingType::StorageBuffer,
                DescriptorResource::Buffer(id),
            ) => lock(&self.internal.buffers, "buffers")?.contains_key(&id),
            (
                BindingType::SampledTexture | BindingType::SampledTextureArray { .. },
                DescriptorResource::SampledTexture { view, sampler },
            ) => {
                lock(&self.internal.texture_views, "texture_views")?.contains_key(&view)
                    && lock(&self.internal.samplers, "samplers")?.contains_key(&sampler)
            }
            (BindingType::InputAttachment, DescriptorResource::InputAttachment(view)) => {
                lock(&self.internal.texture_views, "texture_views")?.contains_key(&view)
            }
            _ => {
                return Err(ResourceError::BackendError(format!(
                    "Resource {:?} does not fit binding {} of type {:?}",
                    write.resource, write.binding, binding.ty
                )))
            }
        };
        if matches {
            Ok(())
        } else {
            Err(ResourceError::InvalidHandle)
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let label = descriptor.label.unwrap_or("Unnamed").to_owned();
        let ShaderSourceData::Wgsl(source) = &descriptor.source;

        if source.trim().is_empty() {
            return Err(ShaderError::CompilationError {
                label,
                details: "empty source".to_owned(),
            }
            .into());
        }
        for entry_point in [VERTEX_ENTRY_POINT, FRAGMENT_ENTRY_POINT] {
            if !source.contains(&format!("fn {entry_point}(")) {
                return Err(ShaderError::MissingEntryPoint {
                    label,
                    entry_point: entry_point.to_owned(),
                }
                .into());
            }
        }

        let id = ShaderModuleId(self.generate_id());
        lock(&self.internal.shader_modules, "shader_modules")?.insert(
            id,
            ShaderModuleEntry {
                label: label_of(descriptor.label),
            },
        );
        log::info!("HeadlessDevice: Created shader module '{label}' with ID: {id:?}");
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        lock(&self.internal.shader_modules, "shader_modules")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        log::debug!("HeadlessDevice: Destroyed shader module with ID: {id:?}");
        Ok(())
    }

    fn create_render_pass(&self, layout: &RenderPassLayout) -> Result<RenderPassId, ResourceError> {
        let id = RenderPassId(self.generate_id());
        lock(&self.internal.render_passes, "render_passes")?.insert(id, layout.clone());
        log::info!(
            "HeadlessDevice: Created render pass '{}' ({} attachments, {} subpasses) with ID: {id:?}",
            layout.name,
            layout.attachment_count(),
            layout.subpasses.len()
        );
        Ok(id)
    }

    fn destroy_render_pass(&self, id: RenderPassId) -> Result<(), ResourceError> {
        lock(&self.internal.render_passes, "render_passes")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        log::debug!("HeadlessDevice: Destroyed render pass with ID: {id:?}");
        Ok(())
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError> {
        let expected = lock(&self.internal.render_passes, "render_passes")?
            .get(&descriptor.render_pass)
            .map(RenderPassLayout::attachment_count)
            .ok_or(ResourceError::InvalidHandle)?;
        if descriptor.attachments.len() != expected {
            return Err(ResourceError::BackendError(format!(
                "Framebuffer has {} attachments, render pass expects {}",
                descriptor.attachments.len(),
                expected
            )));
        }
        {
            let views = lock(&self.internal.texture_views, "texture_views")?;
            if descriptor.attachments.iter().any(|v| !views.contains_key(v)) {
                return Err(ResourceError::InvalidHandle);
            }
        }
        if descriptor.extent.width == 0 || descriptor.extent.height == 0 {
            return Err(ResourceError::BackendError(
                "Framebuffer extent must be non-zero".to_owned(),
            ));
        }

        let id = FramebufferId(self.generate_id());
        lock(&self.internal.framebuffers, "framebuffers")?.insert(
            id,
            FramebufferEntry {
                render_pass: descriptor.render_pass,
            },
        );
        log::debug!(
            "HeadlessDevice: Created framebuffer {id:?} for render pass {:?}",
            descriptor.render_pass
        );
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.framebuffers, "framebuffers")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        log::debug!(
            "HeadlessDevice: Destroyed framebuffer with ID: {id:?} (pass {:?})",
            entry.render_pass
        );
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<DescriptorSetLayoutId, ResourceError> {
        let id = DescriptorSetLayoutId(self.generate_id());
        lock(&self.internal.set_layouts, "set_layouts")?
            .insert(id, descriptor.bindings.to_vec());
        log::debug!(
            "HeadlessDevice: Created descriptor set layout '{}' with ID: {id:?}",
            descriptor.label.as_deref().unwrap_or("Unnamed")
        );
        Ok(id)
    }

    fn destroy_descriptor_set_layout(
        &self,
        id: DescriptorSetLayoutId,
    ) -> Result<(), ResourceError> {
        lock(&self.internal.set_layouts, "set_layouts")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        log::debug!("HeadlessDevice: Destroyed descriptor set layout with ID: {id:?}");
        Ok(())
    }

    fn create_descriptor_set(
        &self,
        layout: DescriptorSetLayoutId,
    ) -> Result<DescriptorSetId, ResourceError> {
        if !lock(&self.internal.set_layouts, "set_layouts")?.contains_key(&layout) {
            return Err(ResourceError::InvalidHandle);
        }
        let id = DescriptorSetId(self.generate_id());
        lock(&self.internal.descriptor_sets, "descriptor_sets")?.insert(
            id,
            DescriptorSetEntry {
                layout,
                bindings: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn destroy_descriptor_set(&self, id: DescriptorSetId) -> Result<(), ResourceError> {
        lock(&self.internal.descriptor_sets, "descriptor_sets")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        Ok(())
    }

    fn update_descriptor_set(
        &self,
        set: DescriptorSetId,
        writes: &[DescriptorWrite],
    ) -> Result<(), ResourceError> {
        let layout_id = lock(&self.internal.descriptor_sets, "descriptor_sets")?
            .get(&set)
            .map(|entry| entry.layout)
            .ok_or(ResourceError::InvalidHandle)?;
        let layout = lock(&self.internal.set_layouts, "set_layouts")?
            .get(&layout_id)
            .cloned()
            .ok_or(ResourceError::InvalidHandle)?;

        for write in writes {
            self.validate_write(&layout, write)?;
        }

        let mut sets = lock(&self.internal.descriptor_sets, "descriptor_sets")?;
        let entry = sets.get_mut(&set).ok_or(ResourceError::InvalidHandle)?;
        for write in writes {
            entry
                .bindings
                .insert((write.binding, write.array_element), write.resource);
        }
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        {
            let layouts = lock(&self.internal.set_layouts, "set_layouts")?;
            if descriptor
                .set_layouts
                .iter()
                .any(|l| !layouts.contains_key(l))
            {
                return Err(ResourceError::InvalidHandle);
            }
        }
        let id = PipelineLayoutId(self.generate_id());
        lock(&self.internal.pipeline_layouts, "pipeline_layouts")?
            .insert(id, descriptor.set_layouts.to_vec());
        Ok(id)
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        lock(&self.internal.pipeline_layouts, "pipeline_layouts")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        Ok(())
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_deref().map(str::to_owned);

        if !lock(&self.internal.shader_modules, "shader_modules")?.contains_key(&descriptor.shader)
        {
            return Err(PipelineError::InvalidShaderModule {
                id: descriptor.shader,
                pipeline_label,
            }
            .into());
        }
        if !lock(&self.internal.pipeline_layouts, "pipeline_layouts")?
            .contains_key(&descriptor.layout)
        {
            return Err(ResourceError::InvalidHandle);
        }

        let expected = {
            let passes = lock(&self.internal.render_passes, "render_passes")?;
            let layout = passes
                .get(&descriptor.render_pass)
                .ok_or(PipelineError::InvalidRenderPass {
                    id: descriptor.render_pass,
                })?;
            if descriptor.subpass as usize >= layout.subpasses.len() {
                return Err(PipelineError::InvalidSubpass {
                    render_pass: descriptor.render_pass,
                    subpass: descriptor.subpass,
                }
                .into());
            }
            layout.color_blends(descriptor.subpass).len()
        };
        if descriptor.color_blends.len() != expected {
            return Err(PipelineError::ColorTargetMismatch {
                pipeline_label,
                expected,
                found: descriptor.color_blends.len(),
            }
            .into());
        }

        let id = RenderPipelineId(self.generate_id());
        lock(&self.internal.pipelines, "pipelines")?.insert(
            id,
            RenderPipelineEntry {
                label: pipeline_label.clone(),
                render_pass: descriptor.render_pass,
                subpass: descriptor.subpass,
            },
        );
        log::info!(
            "HeadlessDevice: Created render pipeline '{}' with ID: {id:?}",
            pipeline_label.as_deref().unwrap_or("Unnamed")
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.pipelines, "pipelines")?
            .remove(&id)
            .ok_or(PipelineError::InvalidRenderPipeline { id })?;
        log::debug!(
            "HeadlessDevice: Destroyed render pipeline with ID: {id:?} (pass {:?}, subpass {})",
            entry.render_pass,
            entry.subpass
        );
        Ok(())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let address = if descriptor.usage.contains(BufferUsage::DEVICE_ADDRESS) {
            let span = descriptor.size.max(1).div_ceil(ADDRESS_ALIGNMENT) * ADDRESS_ALIGNMENT;
            ADDRESS_BASE + self.internal.next_address.fetch_add(span, Ordering::Relaxed)
        } else {
            0
        };

        let id = BufferId(self.generate_id());
        lock(&self.internal.buffers, "buffers")?.insert(
            id,
            BufferEntry {
                label: descriptor.label.as_deref().map(str::to_owned),
                data: vec![0; descriptor.size as usize],
                usage: descriptor.usage,
                address,
            },
        );
        self.track_alloc(descriptor.size);
        log::debug!(
            "HeadlessDevice: Created buffer '{}' ({} bytes) with ID: {id:?}",
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let id = self.create_buffer(descriptor)?;
        if let Err(e) = self.write_buffer(id, 0, data) {
            self.destroy_buffer(id)?;
            return Err(e);
        }
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.buffers, "buffers")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        self.track_free(entry.data.len() as u64);
        log::debug!("HeadlessDevice: Destroyed buffer with ID: {id:?}");
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers, "buffers")?;
        let entry = buffers.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;

        let size = entry.data.len() as u64;
        let end_offset = offset + data.len() as u64;
        if end_offset > size {
            return Err(ResourceError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size,
            });
        }

        entry.data[offset as usize..end_offset as usize].copy_from_slice(data);
        log::trace!(
            "HeadlessDevice: Wrote {} bytes to buffer ID: {:?} at offset {}",
            data.len(),
            id,
            offset
        );
        Ok(())
    }

    fn buffer_address(&self, id: BufferId) -> Result<u64, ResourceError> {
        let buffers = lock(&self.internal.buffers, "buffers")?;
        let entry = buffers.get(&id).ok_or(ResourceError::InvalidHandle)?;
        if !entry.usage.contains(BufferUsage::DEVICE_ADDRESS) {
            return Err(ResourceError::BackendError(format!(
                "Buffer {id:?} was not created with DEVICE_ADDRESS usage"
            )));
        }
        Ok(entry.address)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let size = descriptor.size.width as u64
            * descriptor.size.height as u64
            * descriptor.format.texel_size() as u64;
        let id = TextureId(self.generate_id());
        lock(&self.internal.textures, "textures")?.insert(
            id,
            TextureEntry {
                descriptor_size: size,
                data: Vec::new(),
            },
        );
        self.track_alloc(size);
        log::debug!(
            "HeadlessDevice: Created texture '{}' ({}x{} {:?}) with ID: {id:?}",
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            descriptor.size.width,
            descriptor.size.height,
            descriptor.format
        );
        Ok(id)
    }

    fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError> {
        let mut textures = lock(&self.internal.textures, "textures")?;
        let entry = textures.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        if data.len() as u64 != entry.descriptor_size {
            return Err(ResourceError::OutOfBounds {
                offset: 0,
                len: data.len() as u64,
                size: entry.descriptor_size,
            });
        }
        entry.data = data.to_vec();
        Ok(())
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.textures, "textures")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        self.track_free(entry.descriptor_size);
        log::debug!("HeadlessDevice: Destroyed texture with ID: {id:?}");
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        if !lock(&self.internal.textures, "textures")?.contains_key(&texture_id) {
            return Err(ResourceError::InvalidHandle);
        }
        let id = TextureViewId(self.generate_id());
        lock(&self.internal.texture_views, "texture_views")?.insert(
            id,
            TextureViewEntry {
                texture: texture_id,
                aspect: descriptor.aspect,
            },
        );
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.internal.texture_views, "texture_views")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let id = SamplerId(self.generate_id());
        lock(&self.internal.samplers, "samplers")?.insert(id, ());
        log::debug!(
            "HeadlessDevice: Created sampler '{}' ({:?}, {:?}) with ID: {id:?}",
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            descriptor.filter,
            descriptor.address_mode
        );
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        lock(&self.internal.samplers, "samplers")?
            .remove(&id)
            .ok_or(ResourceError::InvalidHandle)?;
        Ok(())
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder {
            label: label_of(label),
            commands: Vec::new(),
            device: self.clone(),
        })
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) {
        let pending = match lock(&self.internal.pending_command_buffers, "command_buffers") {
            Ok(mut pending) => pending.remove(&command_buffer),
            Err(e) => {
                log::error!("HeadlessDevice: {e}");
                return;
            }
        };
        let Some(PendingCommandBuffer { label, commands }) = pending else {
            log::warn!(
                "HeadlessDevice: Attempted to submit unknown command buffer {command_buffer:?}"
            );
            return;
        };

        let draws = self.replay(&commands);
        log::trace!(
            "HeadlessDevice: Submitted '{}' ({} commands, {} draws)",
            label.as_deref().unwrap_or("Unnamed"),
            commands.len(),
            draws.len()
        );
        match lock(&self.internal.submitted, "submitted") {
            Ok(mut submitted) => submitted.push(Submission {
                label,
                commands,
                draws,
            }),
            Err(e) => log::error!("HeadlessDevice: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use umbra_core::math::Extent2D;
    use umbra_core::renderer::{
        BlendMode, ColorAttachment, CullMode, DepthAttachment, DepthState, PrimitiveTopology,
        RenderGraphDescriptor, RenderPassBeginInfo, ShaderStages, Subpass, TextureFormat,
        TextureUsage, VertexLayout,
    };

    const SHADER: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    fn shader(device: &HeadlessDevice) -> ShaderModuleId {
        device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some("test"),
                source: ShaderSourceData::Wgsl(Cow::Borrowed(SHADER)),
            })
            .unwrap()
    }

    fn two_subpass_layout() -> RenderPassLayout {
        RenderGraphDescriptor::new("gbuffer")
            .color(
                ColorAttachment::new("output", TextureFormat::Rgba16Float)
                    .blend(BlendMode::Additive),
            )
            .color(ColorAttachment::new("diffuse", TextureFormat::Rgba8Unorm))
            .depth(DepthAttachment::new("depth"))
            .subpass(Subpass::new("geometry").writes(["diffuse"]).with_depth())
            .subpass(Subpass::new("lighting").writes(["output"]).reads(["diffuse"]))
            .compile()
            .unwrap()
    }

    fn pipeline_layout(device: &HeadlessDevice) -> PipelineLayoutId {
        let set = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: None,
                bindings: Cow::Owned(vec![DescriptorBinding::new(
                    0,
                    ShaderStages::ALL,
                    BindingType::StorageBuffer,
                )]),
            })
            .unwrap();
        device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                set_layouts: Cow::Owned(vec![set]),
            })
            .unwrap()
    }

    fn pipeline_desc<'a>(
        shader: ShaderModuleId,
        layout: PipelineLayoutId,
        render_pass: RenderPassId,
        subpass: u32,
        blends: usize,
    ) -> RenderPipelineDescriptor<'a> {
        RenderPipelineDescriptor {
            label: Some(Cow::Borrowed("test pipeline")),
            shader,
            layout,
            render_pass,
            subpass,
            vertex_layout: VertexLayout::Standard,
            primitive: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            depth: DepthState::default(),
            color_blends: Cow::Owned(vec![None; blends]),
        }
    }

    #[test]
    fn test_write_buffer_is_bounds_checked() {
        let device = HeadlessDevice::new();
        let id = device
            .create_buffer(&BufferDescriptor {
                label: Some("small".into()),
                size: 8,
                usage: BufferUsage::STORAGE,
            })
            .unwrap();

        device.write_buffer(id, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_buffer(id).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);

        let err = device.write_buffer(id, 6, &[0; 4]).unwrap_err();
        assert_eq!(
            err,
            ResourceError::OutOfBounds {
                offset: 6,
                len: 4,
                size: 8
            }
        );
    }

    #[test]
    fn test_buffer_address_requires_usage() {
        let device = HeadlessDevice::new();
        let plain = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::STORAGE,
            })
            .unwrap();
        let addressed = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::STORAGE | BufferUsage::DEVICE_ADDRESS,
            })
            .unwrap();

        assert!(device.buffer_address(plain).is_err());
        let address = device.buffer_address(addressed).unwrap();
        assert_ne!(address, 0);
        assert_eq!(address % ADDRESS_ALIGNMENT, 0);
    }

    #[test]
    fn test_shader_module_requires_entry_points() {
        let device = HeadlessDevice::new();
        let err = device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some("broken"),
                source: ShaderSourceData::Wgsl(Cow::Borrowed("@vertex fn vs_main() {}")),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Shader(ShaderError::MissingEntryPoint { ref entry_point, .. })
                if entry_point == FRAGMENT_ENTRY_POINT
        ));
    }

    #[test]
    fn test_pipeline_validation() {
        let device = HeadlessDevice::new();
        let module = shader(&device);
        let layout = pipeline_layout(&device);
        let pass = device.create_render_pass(&two_subpass_layout()).unwrap();

        assert!(device
            .create_render_pipeline(&pipeline_desc(module, layout, pass, 0, 1))
            .is_ok());

        let err = device
            .create_render_pipeline(&pipeline_desc(module, layout, pass, 2, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Pipeline(PipelineError::InvalidSubpass { subpass: 2, .. })
        ));

        let err = device
            .create_render_pipeline(&pipeline_desc(module, layout, pass, 1, 3))
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Pipeline(PipelineError::ColorTargetMismatch {
                expected: 1,
                found: 3,
                ..
            })
        ));

        device.destroy_shader_module(module).unwrap();
        let err = device
            .create_render_pipeline(&pipeline_desc(module, layout, pass, 0, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Pipeline(PipelineError::InvalidShaderModule { .. })
        ));
    }

    #[test]
    fn test_framebuffer_checks_attachment_count() {
        let device = HeadlessDevice::new();
        let pass = device.create_render_pass(&two_subpass_layout()).unwrap();
        let views = (0..3)
            .map(|_| {
                let texture = device
                    .create_texture(&TextureDescriptor {
                        label: None,
                        size: Extent2D::new(4, 4),
                        format: TextureFormat::Rgba8Unorm,
                        usage: TextureUsage::COLOR_ATTACHMENT,
                    })
                    .unwrap();
                device
                    .create_texture_view(texture, &TextureViewDescriptor::default())
                    .unwrap()
            })
            .collect::<Vec<_>>();

        let short = FramebufferDescriptor {
            label: None,
            render_pass: pass,
            attachments: Cow::Borrowed(&views[..2]),
            extent: Extent2D::new(4, 4),
        };
        assert!(device.create_framebuffer(&short).is_err());

        let full = FramebufferDescriptor {
            attachments: Cow::Borrowed(&views[..]),
            ..short
        };
        assert!(device.create_framebuffer(&full).is_ok());
    }

    #[test]
    fn test_submission_resolves_indirect_draws_and_subpasses() {
        let device = HeadlessDevice::new();
        let module = shader(&device);
        let layout = pipeline_layout(&device);
        let pass = device.create_render_pass(&two_subpass_layout()).unwrap();
        let pipeline = device
            .create_render_pipeline(&pipeline_desc(module, layout, pass, 1, 1))
            .unwrap();

        let args = [DrawIndirectArgs::object(3, 36), DrawIndirectArgs::object(4, 6)];
        let indirect = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    label: Some("indirect".into()),
                    size: 32,
                    usage: BufferUsage::INDIRECT,
                },
                bytemuck::cast_slice(&args),
            )
            .unwrap();

        let mut encoder = device.create_command_encoder(Some("frame"));
        {
            let mut rp = encoder.begin_render_pass(&RenderPassBeginInfo {
                render_pass: pass,
                framebuffer: FramebufferId(0),
                clear_values: vec![],
            });
            rp.draw(0..3, 0..1);
            rp.next_subpass();
            rp.set_pipeline(pipeline);
            rp.draw_indirect(indirect, 0, 2, DrawIndirectArgs::STRIDE);
        }
        let id = encoder.finish();
        device.submit_command_buffer(id);

        let submissions = device.take_submissions();
        assert_eq!(submissions.len(), 1);
        let submission = &submissions[0];
        assert_eq!(submission.label.as_deref(), Some("frame"));
        assert_eq!(submission.commands.last(), Some(&Command::EndRenderPass));

        assert_eq!(submission.draws_in(pass, 0).len(), 1);
        let lighting = submission.draws_in(pass, 1);
        assert_eq!(lighting.len(), 2);
        assert_eq!(lighting[0].args, args[0]);
        assert_eq!(lighting[1].pipeline_label.as_deref(), Some("test pipeline"));
        assert!(device.submitted().is_empty());
    }

    #[test]
    fn test_copies_execute_on_submit() {
        let device = HeadlessDevice::new();
        let desc = BufferDescriptor {
            label: None,
            size: 4,
            usage: BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        };
        let src = device.create_buffer_with_data(&desc, &[9, 8, 7, 6]).unwrap();
        let dst = device.create_buffer(&desc).unwrap();

        let mut encoder = device.create_command_encoder(None);
        encoder.copy_buffer_to_buffer(src, 1, dst, 0, 2);
        let id = encoder.finish();
        assert_eq!(device.read_buffer(dst).unwrap(), vec![0; 4]);

        device.submit_command_buffer(id);
        assert_eq!(device.read_buffer(dst).unwrap(), vec![8, 7, 0, 0]);
    }

    #[test]
    fn test_descriptor_writes_are_type_checked() {
        let device = HeadlessDevice::new();
        let layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: None,
                bindings: Cow::Owned(vec![
                    DescriptorBinding::new(0, ShaderStages::ALL, BindingType::UniformBuffer),
                    DescriptorBinding::new(
                        1,
                        ShaderStages::FRAGMENT,
                        BindingType::SampledTextureArray { count: 2 },
                    ),
                ]),
            })
            .unwrap();
        let set = device.create_descriptor_set(layout).unwrap();
        let buffer = device
            .create_buffer(&BufferDescriptor::uniform::<[f32; 4]>("camera"))
            .unwrap();

        device
            .update_descriptor_set(set, &[DescriptorWrite::buffer(0, buffer)])
            .unwrap();
        assert_eq!(
            device.descriptor(set, 0, 0),
            Some(DescriptorResource::Buffer(buffer))
        );

        assert!(device
            .update_descriptor_set(set, &[DescriptorWrite::buffer(1, buffer)])
            .is_err());
        assert!(device
            .update_descriptor_set(set, &[DescriptorWrite::buffer(5, buffer)])
            .is_err());
    }

    #[test]
    fn test_allocation_tracking_and_cleanup() {
        let device = HeadlessDevice::new();
        let id = device
            .create_buffer(&BufferDescriptor::storage::<[u8; 64]>("objects", 4))
            .unwrap();
        assert_eq!(device.allocated_bytes(), 256);
        device.destroy_buffer(id).unwrap();
        assert_eq!(device.allocated_bytes(), 0);
        assert_eq!(device.peak_bytes(), 256);
        assert_eq!(device.live_resources().unwrap().total(), 0);
        assert_eq!(device.destroy_buffer(id), Err(ResourceError::InvalidHandle));
    }
}
