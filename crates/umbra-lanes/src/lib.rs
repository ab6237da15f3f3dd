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

//! # Umbra Lanes
//!
//! The hot path of the frame renderer. Every pass in [`render_lane`] follows
//! the same steps each frame: query the scene, resolve each drawable's
//! material through a content-hash cache, stage per-object and per-light
//! records into this frame's buffers, batch draws into a render plan, and
//! record the plan into a render pass.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod material;
pub mod render_lane;
pub mod staging;

pub use config::RendererConfig;
pub use error::{CapacityError, ConfigError, PassError};
pub use frame::{FrameArgs, PerFrame};
pub use render_lane::{Pass, RenderContext, Renderer};
