//! Core types, math, and handles for the Ember renderer.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Typed resource handles and their allocator
//! - GPU-shared vertex and material layouts
//! - Bounding volumes and frustum culling
//! - Common error types

pub mod error;
pub mod handle;
pub mod math;
pub mod types;

pub use error::{Error, Result};
pub use handle::{HandleAllocator, MaterialHandle, MeshHandle, ResourceHandle, TextureHandle};
pub use math::{Aabb, Frustum};
pub use types::{AlphaMode, GpuMaterial, MaterialFlags, Vertex};

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    pub const FRAMES_IN_FLIGHT: usize = 2;
    /// Upper bound on bindless texture slots (clamped to the device limit).
    pub const MAX_BINDLESS_TEXTURES: u32 = 4096;
    /// Number of material slots in the material buffer.
    pub const MAX_MATERIALS: u32 = 4096;

    /// Edge length of the environment cubemap faces.
    pub const ENVIRONMENT_CUBE_SIZE: u32 = 512;
    /// Edge length of the diffuse irradiance cubemap faces.
    pub const IRRADIANCE_CUBE_SIZE: u32 = 32;
    /// Edge length of mip 0 of the specular prefiltered cubemap.
    pub const PREFILTER_CUBE_SIZE: u32 = 128;
    /// Mip count of the prefiltered cubemap (roughness 0..=1).
    pub const PREFILTER_MIP_LEVELS: u32 = 5;
    /// Edge length of the split-sum BRDF lookup table.
    pub const BRDF_LUT_SIZE: u32 = 512;

    /// Largest SSAO sample kernel the AO uniform block can hold.
    pub const MAX_SSAO_KERNEL: usize = 64;
    /// Number of rotation vectors in the SSAO noise table (4x4 tile).
    pub const SSAO_NOISE_SIZE: usize = 16;
}
