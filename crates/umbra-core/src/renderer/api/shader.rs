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

//! Shader module descriptors and the compiled-shader handle passed to pipelines.

use std::borrow::Cow;

/// Entry point name every vertex stage must export.
pub const VERTEX_ENTRY_POINT: &str = "vs_main";
/// Entry point name every fragment stage must export.
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

/// Represents the source data for a shader module.
#[derive(Debug, Clone)]
pub enum ShaderSourceData<'a> {
    /// WGSL source text.
    Wgsl(Cow<'a, str>),
}

/// Describes a shader module to be created by the `GraphicsDevice`.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The shader source.
    pub source: ShaderSourceData<'a>,
}

/// An opaque handle representing a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub usize);

/// A shader that finished compiling, as handed out by a `ShaderProvider`.
///
/// `texture_slots` lists the material texture names the shader samples, in
/// the order their table indices are packed into the object record.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShader {
    /// The registry name (e.g. `"pass/shadow"`).
    pub name: String,
    /// The backend module holding both stages.
    pub module: ShaderModuleId,
    /// Material texture slots read by the fragment stage.
    pub texture_slots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_module_id_equality() {
        assert_eq!(ShaderModuleId(1), ShaderModuleId(1));
        assert_ne!(ShaderModuleId(1), ShaderModuleId(2));
    }

    #[test]
    fn test_shader_module_descriptor_borrows_source() {
        let source_code = "@vertex fn vs_main() {}";
        let descriptor = ShaderModuleDescriptor {
            label: Some("test_shader"),
            source: ShaderSourceData::Wgsl(Cow::Borrowed(source_code)),
        };
        let ShaderSourceData::Wgsl(ref cow) = descriptor.source;
        assert_eq!(cow.as_ref(), source_code);
        assert_eq!(descriptor.label, Some("test_shader"));
    }
}
