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

//! Provides the public, backend-agnostic rendering contracts for the Umbra renderer.
//!
//! This module defines the "common language" for all rendering operations. It contains
//! the abstract `traits` (like [`GraphicsDevice`]), data structures (like [`BufferDescriptor`]),
//! the render graph description, material definitions, GPU record layouts and the
//! error types that form the stable, public-facing API for rendering.
//!
//! The 'how' is handled by a concrete backend in the `umbra-infra` crate which
//! implements these traits. The passes in `umbra-lanes` only talk to these traits.

pub mod api;
pub mod error;
pub mod material;
pub mod traits;
pub mod uniforms;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::error::{PipelineError, RenderError, RenderGraphError, ResourceError, ShaderError};
pub use self::material::{DrawPass, MaterialDef, MaterialId};
pub use self::traits::*;
pub use self::uniforms::{
    CameraUniform, LightRecord, LightSettings, ObjectRecord, OcclusionParams,
    MAX_OCCLUSION_SAMPLES, OBJECT_TEXTURE_SLOTS,
};
