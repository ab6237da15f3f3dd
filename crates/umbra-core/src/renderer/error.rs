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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::render_graph::RenderPassId;
use crate::renderer::api::shader::ShaderModuleId;
use std::fmt;

/// An error related to the compilation of a shader module.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderError {
    /// The shader source failed to compile into a backend-specific module.
    CompilationError {
        /// A descriptive label for the shader.
        label: String,
        /// Detailed error messages from the shader compiler.
        details: String,
    },
    /// A required entry point (`vs_main` / `fs_main`) is missing.
    MissingEntryPoint {
        /// A descriptive label for the shader.
        label: String,
        /// The entry point name that was not found.
        entry_point: String,
    },
    /// No shader source is registered under this name.
    NotFound {
        /// The requested name.
        name: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::MissingEntryPoint { label, entry_point } => {
                write!(f, "Shader '{label}' has no '{entry_point}' entry point")
            }
            ShaderError::NotFound { name } => write!(f, "No shader named '{name}'"),
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation of a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A shader module provided for the pipeline was invalid or destroyed.
    InvalidShaderModule {
        /// The ID of the invalid shader module.
        id: ShaderModuleId,
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The render pass the pipeline targets does not exist.
    InvalidRenderPass {
        /// The ID of the render pass.
        id: RenderPassId,
    },
    /// The subpass index is out of range for the render pass.
    InvalidSubpass {
        /// The render pass.
        render_pass: RenderPassId,
        /// The requested subpass.
        subpass: u32,
    },
    /// The number of blend states does not match the subpass colour outputs.
    ColorTargetMismatch {
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
        /// Colour outputs of the subpass.
        expected: usize,
        /// Blend states supplied.
        found: usize,
    },
    /// The specified render pipeline ID is not valid.
    InvalidRenderPipeline {
        /// The ID of the invalid render pipeline.
        id: RenderPipelineId,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidShaderModule { id, pipeline_label } => write!(
                f,
                "Invalid shader module {:?} for pipeline '{}'",
                id,
                pipeline_label.as_deref().unwrap_or("Unknown")
            ),
            PipelineError::InvalidRenderPass { id } => {
                write!(f, "Invalid render pass ID: {id:?}")
            }
            PipelineError::InvalidSubpass {
                render_pass,
                subpass,
            } => write!(f, "Render pass {render_pass:?} has no subpass {subpass}"),
            PipelineError::ColorTargetMismatch {
                pipeline_label,
                expected,
                found,
            } => write!(
                f,
                "Pipeline '{}' supplies {} blend states but the subpass writes {} colour targets",
                pipeline_label.as_deref().unwrap_or("Unknown"),
                found,
                expected
            ),
            PipelineError::InvalidRenderPipeline { id } => {
                write!(f, "Invalid render pipeline ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// A malformed render graph description. Always a programming error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderGraphError {
    /// The pass declares no subpass.
    NoSubpasses {
        /// The pass name.
        pass: String,
    },
    /// Two attachments share a name.
    DuplicateAttachment {
        /// The pass name.
        pass: String,
        /// The duplicated name.
        attachment: String,
    },
    /// A subpass references an attachment that is not declared.
    UnknownAttachment {
        /// The pass name.
        pass: String,
        /// The referencing subpass.
        subpass: String,
        /// The missing attachment.
        attachment: String,
    },
    /// A subpass reads an input attachment no earlier subpass wrote.
    InputNotWritten {
        /// The pass name.
        pass: String,
        /// The reading subpass.
        subpass: String,
        /// The attachment.
        attachment: String,
    },
    /// A subpass uses depth but the pass has no depth attachment.
    MissingDepth {
        /// The pass name.
        pass: String,
        /// The subpass.
        subpass: String,
    },
    /// A dependency names a subpass that does not exist.
    UnknownSubpass {
        /// The pass name.
        pass: String,
        /// The missing subpass name.
        subpass: String,
    },
    /// A dependency that cannot be expressed (both sides external, or backwards).
    InvalidDependency {
        /// The pass name.
        pass: String,
        /// What is wrong.
        reason: String,
    },
}

impl fmt::Display for RenderGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderGraphError::NoSubpasses { pass } => {
                write!(f, "Render pass '{pass}' declares no subpass")
            }
            RenderGraphError::DuplicateAttachment { pass, attachment } => {
                write!(f, "Render pass '{pass}' declares attachment '{attachment}' twice")
            }
            RenderGraphError::UnknownAttachment {
                pass,
                subpass,
                attachment,
            } => write!(
                f,
                "Subpass '{pass}/{subpass}' references unknown attachment '{attachment}'"
            ),
            RenderGraphError::InputNotWritten {
                pass,
                subpass,
                attachment,
            } => write!(
                f,
                "Subpass '{pass}/{subpass}' reads '{attachment}' before any subpass writes it"
            ),
            RenderGraphError::MissingDepth { pass, subpass } => write!(
                f,
                "Subpass '{pass}/{subpass}' uses depth but the pass has no depth attachment"
            ),
            RenderGraphError::UnknownSubpass { pass, subpass } => {
                write!(f, "Render pass '{pass}' has no subpass named '{subpass}'")
            }
            RenderGraphError::InvalidDependency { pass, reason } => {
                write!(f, "Invalid dependency in render pass '{pass}': {reason}")
            }
        }
    }
}

impl std::error::Error for RenderGraphError {}

/// An error related to the creation or use of a GPU resource (buffers, textures, etc.).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A render pass could not be built from its description.
    RenderGraph(RenderGraphError),
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// A write or copy exceeded the destination resource.
    OutOfBounds {
        /// Byte offset of the access.
        offset: u64,
        /// Length of the access in bytes.
        len: u64,
        /// Size of the resource in bytes.
        size: u64,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::RenderGraph(err) => write!(f, "Render graph error: {err}"),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds { offset, len, size } => write!(
                f,
                "Resource access out of bounds: {len} bytes at offset {offset} in a {size}-byte resource"
            ),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            ResourceError::RenderGraph(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

impl From<RenderGraphError> for ResourceError {
    fn from(err: RenderGraphError) -> Self {
        ResourceError::RenderGraph(err)
    }
}

/// A high-level error that aborts frame rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The graphics device was lost.
    DeviceLost,
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::DeviceLost => write!(f, "The graphics device was lost."),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::MissingEntryPoint {
            label: "pass/depth".to_string(),
            entry_point: "fs_main".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Shader 'pass/depth' has no 'fs_main' entry point"
        );
    }

    #[test]
    fn resource_error_wraps_graph_error() {
        let graph_err = RenderGraphError::MissingDepth {
            pass: "depth".to_string(),
            subpass: "main".to_string(),
        };
        let res_err: ResourceError = graph_err.into();
        assert_eq!(
            format!("{res_err}"),
            "Render graph error: Subpass 'depth/main' uses depth but the pass has no depth attachment"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_chain() {
        let res_err: ResourceError = ShaderError::NotFound {
            name: "missing".to_string(),
        }
        .into();
        let render_err: RenderError = res_err.into();
        assert!(render_err.source().is_some());
        assert!(render_err.source().unwrap().source().is_some());
    }
}
