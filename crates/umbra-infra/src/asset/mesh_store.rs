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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytemuck::Pod;
use umbra_core::renderer::{
    BufferDescriptor, BufferUsage, Fetch, GpuMesh, GraphicsDevice, MeshProvider, MeshRef,
    ResourceError,
};

#[derive(Debug, Clone)]
enum MeshSlot {
    Loading,
    Resident(GpuMesh),
    Failed(String),
}

/// Meshes uploaded into vertex-pulling buffers.
///
/// Vertex and index buffers are created with `DEVICE_ADDRESS` usage so the
/// renderer can hand their addresses to shaders through object records.
#[derive(Debug)]
pub struct MeshStore {
    device: Arc<dyn GraphicsDevice>,
    meshes: RwLock<HashMap<MeshRef, MeshSlot>>,
    next_ref: AtomicU64,
}

impl MeshStore {
    /// Creates an empty store uploading through `device`.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            meshes: RwLock::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
        }
    }

    fn slots(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<MeshRef, MeshSlot>>, ResourceError> {
        self.meshes
            .write()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (meshes): {e}")))
    }

    /// Allocates a fresh key without data; fetches answer `Pending` until
    /// [`upload_to`](Self::upload_to) is called.
    pub fn reserve(&self) -> Result<MeshRef, ResourceError> {
        let mesh = MeshRef(self.next_ref.fetch_add(1, Ordering::Relaxed));
        self.slots()?.insert(mesh, MeshSlot::Loading);
        Ok(mesh)
    }

    /// Uploads a mesh under a fresh key.
    pub fn upload<V: Pod>(
        &self,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<MeshRef, ResourceError> {
        let mesh = MeshRef(self.next_ref.fetch_add(1, Ordering::Relaxed));
        self.upload_to(mesh, vertices, indices)?;
        Ok(mesh)
    }

    /// Uploads a mesh under `mesh`, replacing (and destroying) previous data.
    pub fn upload_to<V: Pod>(
        &self,
        mesh: MeshRef,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<(), ResourceError> {
        let usage = BufferUsage::STORAGE | BufferUsage::DEVICE_ADDRESS | BufferUsage::COPY_DST;
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let vertex_buffer = self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(format!("mesh {} vertices", mesh.0).into()),
                size: vertex_bytes.len() as u64,
                usage: usage | BufferUsage::VERTEX,
            },
            vertex_bytes,
        )?;
        let index_buffer = match self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(format!("mesh {} indices", mesh.0).into()),
                size: index_bytes.len() as u64,
                usage: usage | BufferUsage::INDEX,
            },
            index_bytes,
        ) {
            Ok(id) => id,
            Err(e) => {
                self.device.destroy_buffer(vertex_buffer)?;
                return Err(e);
            }
        };

        let gpu = GpuMesh {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
            vertex_address: self.device.buffer_address(vertex_buffer)?,
            index_address: self.device.buffer_address(index_buffer)?,
        };

        let previous = self.slots()?.insert(mesh, MeshSlot::Resident(gpu));
        if let Some(MeshSlot::Resident(old)) = previous {
            self.release(&old)?;
        }
        log::debug!(
            "MeshStore: Uploaded mesh {:?} ({} indices)",
            mesh,
            gpu.index_count
        );
        Ok(())
    }

    /// Marks a mesh as permanently unavailable.
    pub fn fail(&self, mesh: MeshRef, reason: impl Into<String>) -> Result<(), ResourceError> {
        let previous = self.slots()?.insert(mesh, MeshSlot::Failed(reason.into()));
        if let Some(MeshSlot::Resident(old)) = previous {
            self.release(&old)?;
        }
        Ok(())
    }

    /// Removes a mesh and destroys its buffers.
    pub fn remove(&self, mesh: MeshRef) -> Result<(), ResourceError> {
        if let Some(MeshSlot::Resident(old)) = self.slots()?.remove(&mesh) {
            self.release(&old)?;
        }
        Ok(())
    }

    /// Destroys every resident mesh.
    pub fn destroy(&self) -> Result<(), ResourceError> {
        let drained = self.slots()?.drain().collect::<Vec<_>>();
        for (_, slot) in drained {
            if let MeshSlot::Resident(mesh) = slot {
                self.release(&mesh)?;
            }
        }
        Ok(())
    }

    fn release(&self, mesh: &GpuMesh) -> Result<(), ResourceError> {
        self.device.destroy_buffer(mesh.vertices)?;
        self.device.destroy_buffer(mesh.indices)
    }
}

impl MeshProvider for MeshStore {
    fn try_fetch(&self, mesh: MeshRef) -> Fetch<GpuMesh> {
        let meshes = match self.meshes.read() {
            Ok(meshes) => meshes,
            Err(e) => return Fetch::Failed(format!("Mutex poisoned (meshes): {e}")),
        };
        match meshes.get(&mesh) {
            Some(MeshSlot::Resident(gpu)) => Fetch::Ready(*gpu),
            Some(MeshSlot::Loading) => Fetch::Pending,
            Some(MeshSlot::Failed(reason)) => Fetch::Failed(reason.clone()),
            None => Fetch::Failed(format!("unknown mesh {mesh:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;

    #[test]
    fn test_upload_exposes_addresses() {
        let device = HeadlessDevice::new();
        let store = MeshStore::new(Arc::new(device.clone()));
        let mesh = store
            .upload(&[[0.0f32; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2])
            .unwrap();

        let gpu = store.try_fetch(mesh).ready().unwrap();
        assert_eq!(gpu.index_count, 3);
        assert_ne!(gpu.vertex_address, 0);
        assert_ne!(gpu.vertex_address, gpu.index_address);
        assert_eq!(
            device.read_buffer(gpu.indices).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]).to_vec()
        );
    }

    #[test]
    fn test_reserved_meshes_are_pending_until_uploaded() {
        let device = HeadlessDevice::new();
        let store = MeshStore::new(Arc::new(device.clone()));
        let mesh = store.reserve().unwrap();
        assert_eq!(store.try_fetch(mesh), Fetch::Pending);

        store.upload_to(mesh, &[[0.0f32; 3]; 3], &[0, 1, 2]).unwrap();
        assert!(store.try_fetch(mesh).is_ready());

        store.upload_to(mesh, &[[0.0f32; 3]; 3], &[2, 1, 0]).unwrap();
        assert_eq!(device.live_resources().unwrap().buffers, 2);

        store.destroy().unwrap();
        assert_eq!(device.live_resources().unwrap().buffers, 0);
        assert!(matches!(store.try_fetch(MeshRef(999)), Fetch::Failed(_)));
    }
}
