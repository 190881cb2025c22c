//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Validation was requested but the Khronos layer is not installed.
    #[error("Validation layer {0} is not available")]
    ValidationLayerMissing(String),

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// A format lacks a feature the renderer depends on.
    #[error("Format {format:?} does not support {feature}")]
    UnsupportedFormat { format: vk::Format, feature: String },

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A fixed-size resource table is full.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// SPIR-V could not be read from disk.
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error bubbled up from core types.
    #[error(transparent)]
    Core(#[from] ember_core::Error),
}

impl GpuError {
    /// Whether the error means the swapchain no longer matches its surface.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
