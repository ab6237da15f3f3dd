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

//! Content-hash material caches and the per-material draw machinery.
//!
//! - [`MaterialCache`]: lazily built, memoized materials keyed by
//!   [`MaterialId`](umbra_core::renderer::MaterialId).
//! - [`PipelineCache`]: pipelines for passes that own their buffers.
//! - [`MaterialSorter`]: full per-frame material instances drawing drawables.
//! - [`SamplerTable`] / [`ShadowSlots`]: texture and shadow-map slot assignment.

mod cache;
mod pipeline;
mod sampler_table;
mod sorter;

pub use cache::*;
pub use pipeline::*;
pub use sampler_table::*;
pub use sorter::*;
