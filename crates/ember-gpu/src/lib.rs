//! Vulkan abstraction layer for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection and device selection
//! - Memory allocation via gpu-allocator
//! - Command buffers and blocking immediate submission
//! - Swapchain handling and the per-window [`Viewport`]
//! - Descriptor, pipeline, barrier and dynamic rendering helpers

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod viewport;

pub use ash;
pub use ash::vk;

pub use barrier::{cmd_image_barriers, full_range, image_barrier, transition_image, ImageState};
pub use capabilities::{DeviceFeatures, GpuCapabilities, GpuVendor};
pub use command::{CommandPool, ImmediateSubmit};
pub use context::{GpuContext, GpuContextBuilder};
pub use deferred::DeferredQueue;
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use error::{GpuError, Result};
pub use frame::{FrameContext, FrameData, FrameRing};
pub use image::{format_aspect, mip_extent, mip_level_count, ImageDesc, ImageKind, Texture};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{push_constant_range, BlendMode, GraphicsPipeline, GraphicsPipelineConfig};
pub use rendering::{begin_rendering, end_rendering, AttachmentTarget, LoadOp, RenderInfo};
pub use sampler::SamplerDesc;
pub use shader::load_spirv;
pub use surface::SurfaceContext;
pub use upload::upload_buffer;
pub use viewport::{FrameOutcome, Viewport, DEPTH_FORMAT};
