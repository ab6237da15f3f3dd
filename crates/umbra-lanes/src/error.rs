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

//! Error types of the rendering lanes.

use thiserror::Error;
use umbra_core::renderer::{RenderGraphError, ResourceError};

/// A per-frame staging buffer ran out of slots.
///
/// Capacities are configuration, so an overflow means the configuration is
/// too small for the scene.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{buffer} buffer is full ({capacity} slots)")]
pub struct CapacityError {
    /// Which buffer overflowed.
    pub buffer: &'static str,
    /// Its fixed capacity.
    pub capacity: usize,
}

/// A fatal error raised while building or recording a pass.
#[derive(Error, Debug)]
pub enum PassError {
    /// Creating or updating a GPU object failed.
    #[error("GPU resource error: {0}")]
    Resource(#[from] ResourceError),
    /// A render graph description is malformed.
    #[error("Invalid render graph: {0}")]
    RenderGraph(#[from] RenderGraphError),
    /// A staging buffer overflowed.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    /// A material the pass cannot work without will never become ready.
    #[error("Pass '{pass}' needs shader '{shader}', which is unusable: {reason}")]
    InvalidMaterial {
        /// The pass.
        pass: &'static str,
        /// The shader name.
        shader: String,
        /// Why it failed.
        reason: String,
    },
    /// The pass was used after `destroy`.
    #[error("Pass '{0}' was already destroyed")]
    Destroyed(&'static str),
}

/// An error loading or saving a [`RendererConfig`](crate::RendererConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The RON text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The configuration could not be serialized.
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
