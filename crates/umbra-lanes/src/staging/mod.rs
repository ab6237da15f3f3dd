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

//! CPU-side arenas flushed to GPU storage once per frame, and the batching
//! of their records into draw calls.
//!
//! - [`ObjectBuffer`] / [`LightBuffer`]: fixed-capacity record arrays.
//! - [`IndirectDrawBuffer`]: indirect draw arguments, one per object.
//! - [`RenderPlan`]: groups objects into batches sharing a pipeline.

mod buffer;
mod indirect;
mod plan;

pub use buffer::*;
pub use indirect::*;
pub use plan::*;
