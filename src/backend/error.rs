// Bring-up errors
//
// Every failure during bring-up is fatal; there is no retry anywhere.
// Variants carry the step that failed and the raw API result so the
// operator log says exactly which call was rejected.

use ash::vk;
use std::fmt;
use thiserror::Error;

use super::lifecycle::LifecycleState;
use super::shader::ShaderKind;

/// The creation step an API call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Context,
    Diagnostics,
    DeviceSelection,
    Swapchain,
    ImageViews,
    ShaderModule,
    RenderPass,
    PipelineLayout,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Context => "instance creation",
            Stage::Diagnostics => "debug messenger setup",
            Stage::DeviceSelection => "device selection",
            Stage::Swapchain => "swapchain creation",
            Stage::ImageViews => "image view creation",
            Stage::ShaderModule => "shader module creation",
            Stage::RenderPass => "render pass creation",
            Stage::PipelineLayout => "pipeline layout creation",
            Stage::Pipeline => "graphics pipeline creation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BringUpError {
    #[error("Failed to load Vulkan library: {0}. Is Vulkan installed?")]
    LoaderUnavailable(String),

    #[error("Validation layer {layer} requested, but not available")]
    ValidationLayerUnavailable { layer: String },

    #[error("Instance extension {extension} is not available on this host")]
    InstanceExtensionUnavailable { extension: String },

    #[error("Vulkan call failed during {stage}: {result}")]
    ContextCreationFailed { stage: Stage, result: vk::Result },

    #[error("Query failed during {stage}: {result}")]
    QueryFailed { stage: Stage, result: vk::Result },

    #[error("Window handle unavailable: {0}")]
    WindowHandleUnavailable(#[from] raw_window_handle::HandleError),

    #[error("Surface creation failed: {result}")]
    SurfaceCreationFailed { result: vk::Result },

    #[error("No Vulkan-capable GPU found")]
    NoDeviceFound,

    #[error("No suitable GPU found ({candidates} candidate(s) rejected)")]
    NoSuitableDevice { candidates: usize },

    #[error("Logical device creation failed: {result}")]
    DeviceCreationFailed { result: vk::Result },

    #[error("Swapchain setup failed during {stage}: {result}")]
    SwapchainCreationFailed { stage: Stage, result: vk::Result },

    #[error("Pipeline setup failed during {stage}: {result}")]
    PipelineCreationFailed { stage: Stage, result: vk::Result },

    #[error("Failed to load {kind} shader '{name}': {source}")]
    ShaderLoadFailed {
        name: String,
        kind: ShaderKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} is not allowed in state {state}")]
    InvalidState { operation: &'static str, state: LifecycleState },
}

pub type Result<T, E = BringUpError> = std::result::Result<T, E>;
