//! Bindless GPU resource managers.

pub mod material;
pub mod mesh;
pub mod texture;

pub use material::{default_material, validate_material, DirtyTracker, MaterialManager};
pub use mesh::{GpuMesh, MeshManager, Surface};
pub use texture::TextureManager;
