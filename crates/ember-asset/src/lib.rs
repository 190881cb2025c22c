//! Asset loading for the Ember renderer.
//!
//! - glTF 2.0 scenes into [`SceneData`]
//! - Parallel image decoding
//! - HDR environment maps

pub mod decode;
pub mod environment;
pub mod error;
pub mod scene;

pub use decode::{decode_images, ImageData, ImageSource};
pub use environment::{load_environment, HdrImage};
pub use error::{AssetError, Result};
pub use scene::{
    load_gltf, load_gltf_slice, MaterialData, MeshData, MeshInstance, NodeData, PrimitiveData,
    SceneData,
};
