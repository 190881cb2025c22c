//! Asset loading errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid asset data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, AssetError>;
