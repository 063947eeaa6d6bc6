//! Image loading utilities for texture data
//!
//! Provides PNG decoding through the `image` crate plus two loader strategies:
//! a background-thread loader for applications and a blocking loader for
//! tools and tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::AssetError;

/// Loaded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();

        log::debug!("Loading image from: {:?}", path_ref);

        if !path_ref.exists() {
            return Err(AssetError::NotFound(path_ref.display().to_string()));
        }

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image: {}", e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Load image from memory (useful for embedded resources)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::InvalidData(format!("Failed to load image from bytes: {}", e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::debug!("Loaded image {}x{} from memory", width, height);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Create a solid color image (useful for testing and defaults)
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        let mut data = Vec::with_capacity(pixel_count * 4);

        for _ in 0..pixel_count {
            data.extend_from_slice(&color);
        }

        Self {
            data,
            width,
            height,
        }
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk
    Path(PathBuf),
    /// Encoded image bytes already in memory
    Bytes(Arc<[u8]>),
}

impl ImageSource {
    /// Decode the source on the current thread
    pub fn decode(&self) -> Result<ImageData, AssetError> {
        match self {
            Self::Path(path) => ImageData::from_file(path),
            Self::Bytes(bytes) => ImageData::from_bytes(bytes),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Completion callback invoked once an image has been decoded (or failed)
pub type LoadCallback = Box<dyn FnOnce(Result<ImageData, AssetError>) + Send + 'static>;

/// Image loading capability
///
/// Implementations decode `source` at some point and invoke `done` exactly
/// once. The callback may run on another thread.
pub trait ImageLoader {
    /// Start loading an image
    fn load(&self, source: ImageSource, done: LoadCallback);
}

/// Decodes each image on its own background thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedImageLoader;

impl ImageLoader for ThreadedImageLoader {
    fn load(&self, source: ImageSource, done: LoadCallback) {
        let spawned = std::thread::Builder::new()
            .name("boxes-image-decode".to_string())
            .spawn(move || done(source.decode()));

        if let Err(e) = spawned {
            log::error!("Failed to spawn image decode thread: {}", e);
        }
    }
}

/// Decodes images immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingImageLoader;

impl ImageLoader for BlockingImageLoader {
    fn load(&self, source: ImageSource, done: LoadCallback) {
        done(source.decode());
    }
}
