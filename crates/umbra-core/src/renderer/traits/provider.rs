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

//! Non-blocking access to GPU-ready assets.
//!
//! Loading and compilation happen elsewhere; the renderer only polls. A
//! `Pending` answer means "ask again next frame", a `Failed` answer is final.

use crate::renderer::api::{BufferId, CompiledShader, SamplerId, TextureViewId};
use std::fmt::Debug;
use std::sync::Arc;

/// The outcome of a non-blocking asset lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    /// The resource is resident and usable.
    Ready(T),
    /// The resource is still loading or compiling.
    Pending,
    /// The resource can never become ready (missing, or failed to compile).
    Failed(String),
}

impl<T> Fetch<T> {
    /// Returns the value if ready.
    pub fn ready(self) -> Option<T> {
        match self {
            Fetch::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Returns `true` for [`Fetch::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }

    /// Maps the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Ready(value) => Fetch::Ready(f(value)),
            Fetch::Pending => Fetch::Pending,
            Fetch::Failed(reason) => Fetch::Failed(reason),
        }
    }
}

/// A key identifying a mesh in a [`MeshProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshRef(pub u64);

/// A key identifying a texture in a [`TextureProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureRef(pub u64);

impl TextureRef {
    /// Derives a stable key from an asset path.
    pub fn from_path(path: &str) -> Self {
        Self(crate::stable_hasher().hash_one(path))
    }
}

/// A mesh resident on the GPU.
///
/// Vertex and index data are read in the vertex stage through their device
/// addresses, so no vertex input state is bound per draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    /// The vertex buffer.
    pub vertices: BufferId,
    /// The `u32` index buffer.
    pub indices: BufferId,
    /// Number of indices.
    pub index_count: u32,
    /// Device address of `vertices`.
    pub vertex_address: u64,
    /// Device address of `indices`.
    pub index_address: u64,
}

/// A texture resident on the GPU together with the sampler it is read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    /// The view to sample.
    pub view: TextureViewId,
    /// The sampler.
    pub sampler: SamplerId,
}

/// Resolves shader names to compiled modules.
pub trait ShaderProvider: Send + Sync + Debug {
    /// Polls for a compiled shader; never blocks.
    fn try_fetch(&self, name: &str) -> Fetch<CompiledShader>;
}

/// Resolves mesh keys to GPU buffers.
pub trait MeshProvider: Send + Sync + Debug {
    /// Polls for a resident mesh; never blocks.
    fn try_fetch(&self, mesh: MeshRef) -> Fetch<GpuMesh>;
}

/// Resolves texture keys to views and samplers.
pub trait TextureProvider: Send + Sync + Debug {
    /// Polls for a resident texture; never blocks.
    fn try_fetch(&self, texture: TextureRef) -> Fetch<GpuTexture>;
}

/// The asset collaborators a renderer polls every frame.
#[derive(Debug, Clone)]
pub struct GpuAssets {
    /// Shader lookups.
    pub shaders: Arc<dyn ShaderProvider>,
    /// Mesh lookups.
    pub meshes: Arc<dyn MeshProvider>,
    /// Texture lookups.
    pub textures: Arc<dyn TextureProvider>,
}
