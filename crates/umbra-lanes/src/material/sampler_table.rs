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

use ahash::AHashMap;
use umbra_core::renderer::uniforms::MAX_CASCADES;
use umbra_core::renderer::{
    DescriptorSetId, DescriptorWrite, GpuTexture, GraphicsDevice, ResourceError, TextureProvider,
    TextureViewId, OBJECT_TEXTURE_SLOTS,
};
use umbra_core::scene::{Drawable, LightId, ShadowResolver};

/// A fixed-size table of textures bound as one sampled-texture array.
///
/// Slot 0 always holds the fallback texture, so a zero index in an object or
/// light record means "nothing bound". Textures keep their slot once
/// assigned; only slots changed since the last flush are rewritten.
#[derive(Debug)]
pub struct SamplerTable {
    set: DescriptorSetId,
    binding: u32,
    capacity: usize,
    fallback: GpuTexture,
    slots: Vec<GpuTexture>,
    lookup: AHashMap<TextureViewId, u32>,
    dirty: Vec<u32>,
    full_warned: bool,
}

impl SamplerTable {
    /// Creates a table of `capacity` slots writing `binding` of `set`.
    pub fn new(set: DescriptorSetId, binding: u32, capacity: usize, fallback: GpuTexture) -> Self {
        let capacity = capacity.max(1);
        Self {
            set,
            binding,
            capacity,
            fallback,
            slots: vec![fallback],
            lookup: AHashMap::new(),
            dirty: (0..capacity as u32).collect(),
            full_warned: false,
        }
    }

    /// Returns the slot of `texture`, assigning one on first use.
    ///
    /// When the table is full the fallback slot 0 is returned.
    pub fn assign(&mut self, texture: GpuTexture) -> u32 {
        if texture.view == self.fallback.view {
            return 0;
        }
        if let Some(&slot) = self.lookup.get(&texture.view) {
            return slot;
        }
        if self.slots.len() >= self.capacity {
            if !self.full_warned {
                log::warn!(
                    "SamplerTable: All {} slots are in use, falling back to slot 0",
                    self.capacity
                );
                self.full_warned = true;
            }
            return 0;
        }
        let slot = self.slots.len() as u32;
        self.slots.push(texture);
        self.lookup.insert(texture.view, slot);
        self.dirty.push(slot);
        slot
    }

    /// The texture in `slot`; unassigned slots read the fallback.
    pub fn get(&self, slot: u32) -> GpuTexture {
        self.slots
            .get(slot as usize)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Drops every assignment.
    pub fn clear(&mut self) {
        self.slots.truncate(1);
        self.lookup.clear();
        self.dirty = (0..self.capacity as u32).collect();
        self.full_warned = false;
    }

    /// Number of assigned slots, fallback included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`: the fallback slot is permanent.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if a flush would write anything.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Writes the changed slots into the descriptor set.
    pub fn flush(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let writes = self
            .dirty
            .iter()
            .map(|&slot| {
                let texture = self.get(slot);
                DescriptorWrite::texture(self.binding, slot, texture.view, texture.sampler)
            })
            .collect::<Vec<_>>();
        device.update_descriptor_set(self.set, &writes)?;
        self.dirty.clear();
        Ok(())
    }
}

/// Table slots of the textures a drawable binds to the shader's slots.
///
/// Slots the drawable leaves empty, and textures that are not resident yet,
/// read the fallback.
pub fn assign_mesh_textures(
    table: &mut SamplerTable,
    textures: &dyn TextureProvider,
    drawable: &dyn Drawable,
    slots: &[String],
) -> [u32; OBJECT_TEXTURE_SLOTS] {
    let mut ids = [0; OBJECT_TEXTURE_SLOTS];
    for (id, slot) in ids.iter_mut().zip(slots) {
        if let Some(texture) = drawable
            .texture(slot)
            .and_then(|texture| textures.try_fetch(texture).ready())
        {
            *id = table.assign(texture);
        }
    }
    ids
}

/// Read access to rendered shadow maps.
pub trait ShadowMaps {
    /// The depth map of a light's cascade, if it exists yet.
    fn shadowmap(&self, light: LightId, cascade: usize) -> Option<GpuTexture>;

    /// Changes whenever maps are destroyed; tables holding older slots
    /// must be cleared.
    fn generation(&self) -> u64 {
        0
    }

    /// Cascades per light the maps are rendered for.
    fn cascade_limit(&self) -> usize {
        MAX_CASCADES
    }
}

/// Resolves shadow maps into slots of one consumer's sampler table.
pub struct ShadowSlots<'a> {
    maps: &'a dyn ShadowMaps,
    table: &'a mut SamplerTable,
}

impl<'a> ShadowSlots<'a> {
    /// Resolves through `maps` into `table`.
    pub fn new(maps: &'a dyn ShadowMaps, table: &'a mut SamplerTable) -> Self {
        Self { maps, table }
    }
}

impl ShadowResolver for ShadowSlots<'_> {
    fn shadow_slot(&mut self, light: LightId, cascade: usize) -> Option<u32> {
        let texture = self.maps.shadowmap(light, cascade)?;
        match self.table.assign(texture) {
            0 => None,
            slot => Some(slot),
        }
    }

    fn cascade_limit(&self) -> usize {
        self.maps.cascade_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::math::Extent2D;
    use umbra_core::renderer::{
        BindingType, DescriptorBinding, DescriptorResource, DescriptorSetLayoutDescriptor,
        MaterialDef, MeshRef, SamplerId, ShaderStages, TextureRef,
    };
    use umbra_core::scene::StaticMesh;
    use umbra_infra::{HeadlessDevice, TextureStore};

    fn texture(view: usize) -> GpuTexture {
        GpuTexture {
            view: TextureViewId(view),
            sampler: SamplerId(1),
        }
    }

    #[test]
    fn test_assign_dedupes_and_reserves_slot_zero() {
        let mut table = SamplerTable::new(DescriptorSetId(0), 3, 4, texture(100));
        assert_eq!(table.assign(texture(100)), 0);
        assert_eq!(table.assign(texture(7)), 1);
        assert_eq!(table.assign(texture(8)), 2);
        assert_eq!(table.assign(texture(7)), 1);
        assert_eq!(table.assign(texture(9)), 3);
        assert_eq!(table.assign(texture(10)), 0);
        assert_eq!(table.get(2), texture(8));

        table.clear();
        assert_eq!(table.len(), 1);
        assert_eq!(table.assign(texture(10)), 1);
    }

    struct Maps;

    impl ShadowMaps for Maps {
        fn shadowmap(&self, light: LightId, cascade: usize) -> Option<GpuTexture> {
            (light == LightId(1)).then(|| texture(50 + cascade))
        }
    }

    #[test]
    fn test_shadow_slots_resolve_into_table() {
        let mut table = SamplerTable::new(DescriptorSetId(0), 3, 8, texture(100));
        let mut slots = ShadowSlots::new(&Maps, &mut table);
        assert_eq!(slots.shadow_slot(LightId(1), 0), Some(1));
        assert_eq!(slots.shadow_slot(LightId(1), 1), Some(2));
        assert_eq!(slots.shadow_slot(LightId(1), 0), Some(1));
        assert_eq!(slots.shadow_slot(LightId(2), 0), None);
        assert_eq!(slots.cascade_limit(), MAX_CASCADES);
    }

    #[test]
    fn test_mesh_textures_and_flush() {
        let device = HeadlessDevice::new();
        let store = TextureStore::new(std::sync::Arc::new(device.clone())).unwrap();
        let diffuse = store
            .upload_path("textures/brick.png", Extent2D::square(1), &[255; 4])
            .unwrap();
        let pending = TextureRef(9);
        store.reserve(pending).unwrap();
        store
            .upload_rgba8(TextureRef(1), Extent2D::square(1), &[255; 4])
            .unwrap();
        let fallback = store.try_fetch(TextureRef(1)).ready().unwrap();

        let set_layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: None,
                bindings: vec![DescriptorBinding::new(
                    3,
                    ShaderStages::FRAGMENT,
                    BindingType::SampledTextureArray { count: 4 },
                )]
                .into(),
            })
            .unwrap();
        let set = device.create_descriptor_set(set_layout).unwrap();
        let mut table = SamplerTable::new(set, 3, 4, fallback);

        let mesh = StaticMesh::new(MeshRef(1), Some(MaterialDef::standard_deferred()))
            .with_texture("diffuse", diffuse)
            .with_texture("normal", pending);
        let slots = ["diffuse", "normal", "roughness"].map(String::from);
        let ids = assign_mesh_textures(&mut table, &store, &mesh, &slots);
        assert_eq!(ids, [1, 0, 0, 0]);
        assert_eq!(ids.len(), OBJECT_TEXTURE_SLOTS);

        assert!(table.is_dirty());
        table.flush(&device).unwrap();
        assert!(!table.is_dirty());
        let brick = store.try_fetch(diffuse).ready().unwrap();
        assert_eq!(
            device.descriptor(set, 3, 1),
            Some(DescriptorResource::SampledTexture {
                view: brick.view,
                sampler: brick.sampler
            })
        );
        assert_eq!(
            device.descriptor(set, 3, 3),
            Some(DescriptorResource::SampledTexture {
                view: fallback.view,
                sampler: fallback.sampler
            })
        );
    }
}
