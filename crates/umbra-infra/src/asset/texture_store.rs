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
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use umbra_core::math::Extent2D;
use umbra_core::renderer::{
    AddressMode, Fetch, FilterMode, GpuTexture, GraphicsDevice, ResourceError, SamplerDescriptor,
    SamplerId, TextureDescriptor, TextureFormat, TextureId, TextureProvider, TextureRef,
    TextureUsage, TextureViewDescriptor,
};

#[derive(Debug, Clone, Copy)]
struct ResidentTexture {
    texture: TextureId,
    gpu: GpuTexture,
}

#[derive(Debug, Clone)]
enum TextureSlot {
    Loading,
    Resident(ResidentTexture),
    Failed(String),
}

/// Sampled textures keyed by [`TextureRef`], all read through one shared
/// linear, repeating sampler.
#[derive(Debug)]
pub struct TextureStore {
    device: Arc<dyn GraphicsDevice>,
    sampler: SamplerId,
    textures: RwLock<HashMap<TextureRef, TextureSlot>>,
}

impl TextureStore {
    /// Creates an empty store and its sampler.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Result<Self, ResourceError> {
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("texture store".into()),
            filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
        })?;
        Ok(Self {
            device,
            sampler,
            textures: RwLock::new(HashMap::new()),
        })
    }

    /// The sampler every texture of the store is read through.
    pub fn sampler(&self) -> SamplerId {
        self.sampler
    }

    fn slots(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<TextureRef, TextureSlot>>, ResourceError> {
        self.textures
            .write()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (textures): {e}")))
    }

    /// Marks a texture as loading; fetches answer `Pending` until it is uploaded.
    pub fn reserve(&self, texture: TextureRef) -> Result<(), ResourceError> {
        self.slots()?.insert(texture, TextureSlot::Loading);
        Ok(())
    }

    /// Uploads tightly packed sRGB RGBA8 pixels under `texture`, replacing
    /// (and destroying) previous data.
    pub fn upload_rgba8(
        &self,
        texture: TextureRef,
        size: Extent2D,
        pixels: &[u8],
    ) -> Result<(), ResourceError> {
        let id = self.device.create_texture(&TextureDescriptor {
            label: Some(format!("texture {:#x}", texture.0).into()),
            size,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        })?;
        let view = self
            .device
            .write_texture(id, pixels)
            .and_then(|()| {
                self.device
                    .create_texture_view(id, &TextureViewDescriptor::default())
            });
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                self.device.destroy_texture(id)?;
                return Err(e);
            }
        };

        let resident = ResidentTexture {
            texture: id,
            gpu: GpuTexture {
                view,
                sampler: self.sampler,
            },
        };
        let previous = self.slots()?.insert(texture, TextureSlot::Resident(resident));
        if let Some(TextureSlot::Resident(old)) = previous {
            self.release(&old)?;
        }
        log::debug!(
            "TextureStore: Uploaded texture {:#x} ({}x{})",
            texture.0,
            size.width,
            size.height
        );
        Ok(())
    }

    /// Uploads a texture keyed by its asset path.
    pub fn upload_path(
        &self,
        path: &str,
        size: Extent2D,
        pixels: &[u8],
    ) -> Result<TextureRef, ResourceError> {
        let texture = TextureRef::from_path(path);
        self.upload_rgba8(texture, size, pixels)?;
        Ok(texture)
    }

    /// Marks a texture as permanently unavailable.
    pub fn fail(
        &self,
        texture: TextureRef,
        reason: impl Into<String>,
    ) -> Result<(), ResourceError> {
        let previous = self
            .slots()?
            .insert(texture, TextureSlot::Failed(reason.into()));
        if let Some(TextureSlot::Resident(old)) = previous {
            self.release(&old)?;
        }
        Ok(())
    }

    /// Destroys every texture and the shared sampler.
    pub fn destroy(&self) -> Result<(), ResourceError> {
        let drained = self.slots()?.drain().collect::<Vec<_>>();
        for (_, slot) in drained {
            if let TextureSlot::Resident(resident) = slot {
                self.release(&resident)?;
            }
        }
        self.device.destroy_sampler(self.sampler)
    }

    fn release(&self, resident: &ResidentTexture) -> Result<(), ResourceError> {
        self.device.destroy_texture_view(resident.gpu.view)?;
        self.device.destroy_texture(resident.texture)
    }
}

impl TextureProvider for TextureStore {
    fn try_fetch(&self, texture: TextureRef) -> Fetch<GpuTexture> {
        let textures = match self.textures.read() {
            Ok(textures) => textures,
            Err(e) => return Fetch::Failed(format!("Mutex poisoned (textures): {e}")),
        };
        match textures.get(&texture) {
            Some(TextureSlot::Resident(resident)) => Fetch::Ready(resident.gpu),
            Some(TextureSlot::Loading) => Fetch::Pending,
            Some(TextureSlot::Failed(reason)) => Fetch::Failed(reason.clone()),
            None => Fetch::Failed(format!("unknown texture {:#x}", texture.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;

    #[test]
    fn test_upload_by_path() {
        let device = HeadlessDevice::new();
        let store = TextureStore::new(Arc::new(device.clone())).unwrap();
        let texture = store
            .upload_path("textures/white.png", Extent2D::square(2), &[255; 16])
            .unwrap();

        assert_eq!(texture, TextureRef::from_path("textures/white.png"));
        let gpu = store.try_fetch(texture).ready().unwrap();
        assert_eq!(gpu.sampler, store.sampler());
        let id = device.view_texture(gpu.view).unwrap();
        assert_eq!(device.read_texture(id).unwrap(), vec![255; 16]);
    }

    #[test]
    fn test_wrong_size_upload_leaves_nothing_behind() {
        let device = HeadlessDevice::new();
        let store = TextureStore::new(Arc::new(device.clone())).unwrap();
        let texture = TextureRef(5);
        store.reserve(texture).unwrap();

        assert!(store
            .upload_rgba8(texture, Extent2D::square(2), &[0; 3])
            .is_err());
        assert_eq!(store.try_fetch(texture), Fetch::Pending);
        assert_eq!(device.live_resources().unwrap().textures, 0);

        store.fail(texture, "decode error").unwrap();
        assert_eq!(
            store.try_fetch(texture),
            Fetch::Failed("decode error".to_owned())
        );

        store.destroy().unwrap();
        assert_eq!(device.live_resources().unwrap().total(), 0);
    }
}
