//! Rasterization renderer for Ember.
//!
//! This crate provides:
//! - Depth prepass, forward PBR lighting and skybox passes
//! - Image-based lighting bakes (environment, irradiance, prefilter, BRDF LUT)
//! - Screen-space ambient occlusion with a separable blur
//! - HDR composite with tonemapping
//! - Bindless texture, material and mesh managers
//! - A per-frame render graph that plans image barriers
//! - Camera and fly-camera controls

pub mod camera;
pub mod draw;
pub mod graph;
pub mod ibl;
pub mod passes;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod targets;

pub use camera::{Camera, FlyCamera, MoveInput, SceneUniforms};
pub use draw::{DrawContext, DrawPushConstants, DrawStats, RenderObject};
pub use graph::{Access, GraphImage, ImageId, RenderGraph};
pub use ibl::EnvironmentMaps;
pub use renderer::{FrameStats, OutputTarget, Renderer};
pub use resources::{MaterialManager, MeshManager, Surface, TextureManager};
pub use scene::{gpu_material, GpuScene};
pub use settings::{AoSettings, RenderSettings, Tonemap};
pub use shaders::ShaderLibrary;
pub use targets::RenderTargets;
