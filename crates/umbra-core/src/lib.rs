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

//! # Umbra Core
//!
//! Foundational crate containing the backend-agnostic contracts of the Umbra
//! frame renderer: math, GPU resource descriptors and traits, the render graph
//! description, material definitions, GPU record layouts and the scene
//! capability layer the passes query.

#![warn(missing_docs)]

pub mod macros;
pub mod math;
pub mod renderer;
pub mod scene;

/// The hasher behind every content hash in the engine.
///
/// Seeds are fixed so equal values hash equal across runs of the same build.
pub fn stable_hasher() -> ahash::RandomState {
    ahash::RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}
