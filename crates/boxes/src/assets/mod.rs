//! Asset loading
//!
//! Decoding of image data for textures. Loading is exposed as a capability
//! ([`ImageLoader`]) so the texture layer never blocks on I/O itself.

pub mod image_loader;

pub use image_loader::{
    BlockingImageLoader, ImageData, ImageLoader, ImageSource, LoadCallback, ThreadedImageLoader,
};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
