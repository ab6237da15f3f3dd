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

use super::cache::{fetch_shader, Build, MaterialCache, MaterialMaker, MaterialTransform};
use super::pipeline::{create_pipeline, PassTarget};
use super::sampler_table::{assign_mesh_textures, SamplerTable, ShadowMaps, ShadowSlots};
use crate::error::PassError;
use crate::frame::{FrameArgs, PerFrame};
use crate::staging::{
    BatchKey, DrawItem, IndirectDrawBuffer, IndirectTarget, LightBuffer, ObjectBuffer, RenderPlan,
};
use std::borrow::Cow;
use std::sync::Arc;
use umbra_core::renderer::{
    BindingType, BufferDescriptor, BufferId, CameraUniform, CompiledShader, DescriptorBinding,
    DescriptorSetId, DescriptorSetLayoutDescriptor, DescriptorSetLayoutId, DescriptorWrite, Fetch,
    GpuAssets, GpuTexture, GraphicsDevice, LightSettings, MaterialDef, MaterialId, ObjectRecord,
    PipelineLayoutDescriptor, PipelineLayoutId, RenderPass, RenderPipelineId, ResourceError,
    ShaderStages,
};
use umbra_core::scene::{Drawable, Light, NoShadows};

/// Binding of the camera uniform in set 0.
pub const CAMERA_BINDING: u32 = 0;
/// Binding of the object storage buffer in set 0.
pub const OBJECTS_BINDING: u32 = 1;
/// Binding of the light storage buffer in set 0.
pub const LIGHTS_BINDING: u32 = 2;
/// Binding of the sampled texture array in set 0.
pub const TEXTURES_BINDING: u32 = 3;

/// Capacities of every per-frame material instance of a sorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SorterOptions {
    /// Object buffer (and indirect buffer) capacity.
    pub max_objects: usize,
    /// Light buffer capacity; `None` for unlit passes.
    pub max_lights: Option<usize>,
    /// Sampler table size.
    pub max_textures: usize,
}

/// How a sorter batches the drawables it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawOrder {
    /// Every object of a material in one batch.
    #[default]
    Coalesced,
    /// Batches follow the input order exactly.
    Ordered,
}

/// The lights a lit sorter stages once per frame and material.
pub struct SceneLights<'a> {
    /// Lights in buffer order.
    pub lights: &'a [&'a dyn Light],
    /// Header constants.
    pub settings: LightSettings,
    /// Rendered shadow maps, if the pass samples them.
    pub shadows: Option<&'a dyn ShadowMaps>,
}

/// The per-frame half of a sorted material.
#[derive(Debug)]
pub struct MaterialFrame {
    /// Set 0 of every draw of the material in this frame.
    pub descriptor_set: DescriptorSetId,
    /// Camera uniform buffer.
    pub camera: BufferId,
    /// Object records.
    pub objects: ObjectBuffer,
    /// Light records, for lit sorters.
    pub lights: Option<LightBuffer>,
    /// Textures and shadow maps sampled by the material.
    pub textures: SamplerTable,
    /// Indirect draw arguments.
    pub indirect: IndirectDrawBuffer,
    stamp: Option<u64>,
    shadow_generation: u64,
    touched: bool,
}

impl MaterialFrame {
    /// Resets the staging buffers and writes the frame-wide data the first
    /// time the material is used in `frame_index`.
    fn begin(
        &mut self,
        device: &dyn GraphicsDevice,
        frame_index: u64,
        camera: &CameraUniform,
        lights: Option<&SceneLights<'_>>,
    ) -> Result<(), PassError> {
        if self.stamp == Some(frame_index) {
            return Ok(());
        }
        self.stamp = Some(frame_index);
        self.objects.reset();
        self.indirect.reset();
        device.write_buffer(self.camera, 0, bytemuck::bytes_of(camera))?;

        if let Some(maps) = lights.and_then(|lights| lights.shadows) {
            if maps.generation() != self.shadow_generation {
                self.textures.clear();
                self.shadow_generation = maps.generation();
            }
        }
        if let (Some(buffer), Some(lights)) = (self.lights.as_mut(), lights) {
            buffer.reset();
            buffer.set_settings(lights.settings);
            for light in lights.lights {
                let record = match lights.shadows {
                    Some(maps) => {
                        light.light_record(&mut ShadowSlots::new(maps, &mut self.textures))
                    }
                    None => light.light_record(&mut NoShadows),
                };
                buffer.store(record)?;
            }
            buffer.flush(device)?;
        }
        Ok(())
    }

    /// Flushes what the frame staged.
    fn finish(&mut self, device: &dyn GraphicsDevice) -> Result<(), PassError> {
        if !self.touched {
            return Ok(());
        }
        self.touched = false;
        self.objects.flush(device)?;
        self.textures.flush(device)?;
        self.indirect.flush(device)?;
        Ok(())
    }

    fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        self.objects.destroy(device)?;
        if let Some(lights) = &self.lights {
            lights.destroy(device)?;
        }
        self.indirect.destroy(device)?;
        device.destroy_buffer(self.camera)?;
        device.destroy_descriptor_set(self.descriptor_set)
    }
}

/// A material with its pipeline and every per-frame instance.
#[derive(Debug)]
pub struct SortedMaterial {
    /// The pipeline shared by every frame.
    pub pipeline: RenderPipelineId,
    /// The shader the pipeline was built from.
    pub shader: CompiledShader,
    /// Per-frame instances.
    pub frames: PerFrame<MaterialFrame>,
}

/// Builds [`SortedMaterial`]s sharing one descriptor set layout.
#[derive(Debug)]
pub struct SorterMaker {
    device: Arc<dyn GraphicsDevice>,
    assets: GpuAssets,
    set_layout: DescriptorSetLayoutId,
    pipeline_layout: PipelineLayoutId,
    target: PassTarget,
    options: SorterOptions,
    fallback: GpuTexture,
}

impl SorterMaker {
    /// Creates the set 0 layout for `options` and a maker targeting `target`.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        assets: GpuAssets,
        target: PassTarget,
        options: SorterOptions,
        fallback: GpuTexture,
    ) -> Result<Self, ResourceError> {
        let mut bindings = vec![
            DescriptorBinding::new(CAMERA_BINDING, ShaderStages::ALL, BindingType::UniformBuffer),
            DescriptorBinding::new(OBJECTS_BINDING, ShaderStages::ALL, BindingType::StorageBuffer),
        ];
        if options.max_lights.is_some() {
            bindings.push(DescriptorBinding::new(
                LIGHTS_BINDING,
                ShaderStages::FRAGMENT,
                BindingType::StorageBuffer,
            ));
        }
        bindings.push(DescriptorBinding::new(
            TEXTURES_BINDING,
            ShaderStages::FRAGMENT,
            BindingType::SampledTextureArray {
                count: options.max_textures as u32,
            },
        ));

        let set_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: Some(format!("{} set 0", target.name).into()),
            bindings: bindings.into(),
        })?;
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(target.name.into()),
            set_layouts: Cow::Owned(vec![set_layout]),
        })?;
        Ok(Self {
            device,
            assets,
            set_layout,
            pipeline_layout,
            target,
            options,
            fallback,
        })
    }

    /// The capacities of every instance.
    pub fn options(&self) -> &SorterOptions {
        &self.options
    }

    fn build_frame(&self) -> Result<MaterialFrame, ResourceError> {
        let device = self.device.as_ref();
        let descriptor_set = device.create_descriptor_set(self.set_layout)?;
        let camera =
            device.create_buffer(&BufferDescriptor::uniform::<CameraUniform>(self.target.name))?;
        let objects = ObjectBuffer::new(device, "objects", self.options.max_objects)?;
        let lights = self
            .options
            .max_lights
            .map(|capacity| LightBuffer::new(device, capacity))
            .transpose()?;
        let indirect = IndirectDrawBuffer::new(device, self.options.max_objects)?;

        let mut writes = vec![
            DescriptorWrite::buffer(CAMERA_BINDING, camera),
            DescriptorWrite::buffer(OBJECTS_BINDING, objects.buffer()),
        ];
        if let Some(lights) = &lights {
            writes.push(DescriptorWrite::buffer(LIGHTS_BINDING, lights.buffer()));
        }
        device.update_descriptor_set(descriptor_set, &writes)?;

        Ok(MaterialFrame {
            descriptor_set,
            camera,
            objects,
            lights,
            textures: SamplerTable::new(
                descriptor_set,
                TEXTURES_BINDING,
                self.options.max_textures,
                self.fallback,
            ),
            indirect,
            stamp: None,
            shadow_generation: 0,
            touched: false,
        })
    }

    fn release(&self) -> Result<(), ResourceError> {
        self.device.destroy_pipeline_layout(self.pipeline_layout)?;
        self.device.destroy_descriptor_set_layout(self.set_layout)
    }
}

impl MaterialMaker for SorterMaker {
    type Material = SortedMaterial;

    fn build(
        &mut self,
        def: &MaterialDef,
        frames: usize,
    ) -> Result<Build<SortedMaterial>, PassError> {
        let shader = match fetch_shader(self.assets.shaders.as_ref(), &def.shader) {
            Build::Ready(shader) => shader,
            Build::Pending => return Ok(Build::Pending),
            Build::Invalid(reason) => return Ok(Build::Invalid(reason)),
        };
        let pipeline = create_pipeline(
            self.device.as_ref(),
            def,
            &shader,
            self.pipeline_layout,
            &self.target,
        )?;
        let frames = PerFrame::try_new(frames, |_| self.build_frame())?;
        Ok(Build::Ready(SortedMaterial {
            pipeline,
            shader,
            frames,
        }))
    }

    fn destroy(&mut self, material: SortedMaterial) -> Result<(), PassError> {
        for frame in material.frames.iter() {
            frame.destroy(self.device.as_ref())?;
        }
        Ok(self.device.destroy_render_pipeline(material.pipeline)?)
    }
}

struct FrameIndirect<'a> {
    cache: &'a mut MaterialCache<SorterMaker>,
    frame_index: u64,
}

impl IndirectTarget for FrameIndirect<'_> {
    fn indirect(&mut self, key: &BatchKey) -> Option<&mut IndirectDrawBuffer> {
        let frame_index = self.frame_index;
        self.cache
            .get_mut(key.material)
            .map(|material| &mut material.frames.get_mut(frame_index).indirect)
    }
}

/// Draws a list of drawables grouped by material.
///
/// Each material owns complete per-frame instances (descriptor set, camera,
/// objects, lights, textures, indirect arguments), so two materials never
/// share a buffer and one frame in flight never touches another's copy.
#[derive(Debug)]
pub struct MaterialSorter {
    cache: MaterialCache<SorterMaker>,
    plan: RenderPlan,
}

impl MaterialSorter {
    /// Creates a sorter; drawables without a material use `default`.
    pub fn new(maker: SorterMaker, frames: usize, default: MaterialDef) -> Self {
        Self {
            cache: MaterialCache::new(maker, frames, default),
            plan: RenderPlan::new(),
        }
    }

    /// Rewrites every definition before it is built.
    pub fn with_transform(mut self, transform: MaterialTransform) -> Self {
        self.cache = self.cache.with_transform(transform);
        self
    }

    /// The material cache.
    pub fn cache(&self) -> &MaterialCache<SorterMaker> {
        &self.cache
    }

    /// The material cache, for invalidation.
    pub fn cache_mut(&mut self) -> &mut MaterialCache<SorterMaker> {
        &mut self.cache
    }

    /// The plan recorded by the last [`draw`](Self::draw).
    pub fn plan(&self) -> &RenderPlan {
        &self.plan
    }

    /// The per-frame instance of a cached material.
    pub fn frame(&self, material: MaterialId, frame_index: u64) -> Option<&MaterialFrame> {
        self.cache
            .get(material)
            .map(|material| material.frames.get(frame_index))
    }

    /// Stages and draws `drawables` into `pass`.
    ///
    /// Drawables whose mesh is still streaming or whose material is not
    /// ready are skipped for this frame. Returns the number of objects drawn.
    pub fn draw(
        &mut self,
        pass: &mut dyn RenderPass,
        frame: &FrameArgs,
        camera: &CameraUniform,
        drawables: &[&dyn Drawable],
        lights: Option<&SceneLights<'_>>,
        order: DrawOrder,
    ) -> Result<usize, PassError> {
        let device = Arc::clone(&self.cache.maker().device);
        let assets = self.cache.maker().assets.clone();
        let default_id = self.cache.default_id();
        let frame_index = frame.frame_index;
        self.plan.clear();

        for drawable in drawables {
            let Fetch::Ready(mesh) = assets.meshes.try_fetch(drawable.mesh()) else {
                continue;
            };
            let id = drawable.material_id().unwrap_or(default_id);
            let Some(material) = self.cache.get_or_build_with_id(id, drawable.material())? else {
                continue;
            };

            let instance = material.frames.get_mut(frame_index);
            instance.begin(device.as_ref(), frame_index, camera, lights)?;
            let textures = assign_mesh_textures(
                &mut instance.textures,
                assets.textures.as_ref(),
                *drawable,
                &material.shader.texture_slots,
            );
            let object = instance.objects.store(ObjectRecord::new(
                drawable.world_transform(),
                textures,
                Some(&mesh),
            ))?;
            instance.touched = true;

            let key = BatchKey {
                material: id,
                pipeline: material.pipeline,
                descriptor_set: instance.descriptor_set,
            };
            let item = DrawItem {
                object,
                index_count: mesh.index_count,
            };
            match order {
                DrawOrder::Coalesced => self.plan.add(key, item),
                DrawOrder::Ordered => self.plan.add_ordered(key, item),
            }
        }

        let drawn = self.plan.draw(
            pass,
            &mut FrameIndirect {
                cache: &mut self.cache,
                frame_index,
            },
        )?;

        for (_, material) in self.cache.iter_mut() {
            material.frames.get_mut(frame_index).finish(device.as_ref())?;
        }
        Ok(drawn)
    }

    /// Destroys every material and the shared layouts.
    pub fn destroy(&mut self) -> Result<(), PassError> {
        self.cache.destroy()?;
        Ok(self.cache.maker().release()?)
    }
}
