//! Textures
//!
//! Anything a material can bind to a sampler implements [`Texture`]. GPU
//! objects are created lazily on the first [`Texture::prepare`], which also
//! uploads any data queued since the previous call. Until real data arrives
//! a texture holds a 1x1 zeroed placeholder, so binding never fails.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use log::warn;

use crate::assets::{AssetError, ImageData, ImageLoader, ImageSource};

use super::backend::{
    GpuBackend, TextureDataType, TextureFilter, TextureFormat, TextureHandle, TextureParameter,
    TextureTarget, TextureWrap,
};

/// A bindable texture
pub trait Texture: fmt::Debug {
    /// Create the GPU object if needed and flush pending uploads
    fn prepare(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle>;

    /// Whether the texture binds to the cubemap target
    fn is_cubemap(&self) -> bool {
        false
    }

    /// Free the GPU object
    fn delete(&mut self, gpu: &mut dyn GpuBackend);
}

/// Texture shared between materials
pub type SharedTexture = Rc<RefCell<dyn Texture>>;

/// Raw pixel data for one mip level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed pixels in the texture's format and type
    pub data: Vec<u8>,
}

impl From<ImageData> for TextureData {
    fn from(image: ImageData) -> Self {
        Self {
            width: image.width,
            height: image.height,
            data: image.data,
        }
    }
}

/// Zeroed single-pixel data for a format/type combination
pub(crate) fn placeholder_pixel(format: TextureFormat, data_type: TextureDataType) -> Vec<u8> {
    vec![0; format.components() * data_type.bytes_per_component()]
}

/// Storage and sampling options shared by 2D textures and cubemaps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureOptions {
    /// Pixel format
    pub format: TextureFormat,
    /// Component type
    pub data_type: TextureDataType,
    /// Generate mipmaps after level-0 uploads
    pub mipmaps: bool,
    /// Horizontal wrapping
    pub wrap_s: TextureWrap,
    /// Vertical wrapping
    pub wrap_t: TextureWrap,
    /// Minification filter; derived from `mipmaps` when unset
    pub min_filter: Option<TextureFilter>,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            format: TextureFormat::Rgba,
            data_type: TextureDataType::UnsignedByte,
            mipmaps: false,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
            min_filter: None,
        }
    }
}

impl TextureOptions {
    /// Effective minification filter
    pub fn resolved_min_filter(&self) -> TextureFilter {
        self.min_filter.unwrap_or(if self.mipmaps {
            TextureFilter::LinearMipmapLinear
        } else {
            TextureFilter::Linear
        })
    }
}

/// 2D texture fed from raw pixel data
#[derive(Debug)]
pub struct DataTexture {
    handle: Option<TextureHandle>,
    options: TextureOptions,
    initial: TextureData,
    pending: BTreeMap<u32, TextureData>,
}

impl DataTexture {
    /// Create a texture holding a 1x1 placeholder
    pub fn new(options: TextureOptions) -> Self {
        Self {
            handle: None,
            initial: TextureData {
                width: 1,
                height: 1,
                data: placeholder_pixel(options.format, options.data_type),
            },
            options,
            pending: BTreeMap::new(),
        }
    }

    /// Create a texture with explicit initial contents
    pub fn with_data(options: TextureOptions, initial: TextureData) -> Self {
        Self {
            initial,
            ..Self::new(options)
        }
    }

    /// Options the texture was created with
    pub fn options(&self) -> &TextureOptions {
        &self.options
    }

    /// Replace a mip level on the next [`prepare`](Texture::prepare)
    ///
    /// A later update to the same level before then wins.
    pub fn queue_update(&mut self, data: TextureData, level: u32) {
        self.pending.insert(level, data);
    }

    /// Whether uploads are waiting for the next prepare
    pub fn needs_update(&self) -> bool {
        !self.pending.is_empty()
    }

    fn create(&mut self, gpu: &mut dyn GpuBackend) -> TextureHandle {
        let handle = gpu.create_texture();
        let target = TextureTarget::Texture2D;

        gpu.bind_texture(target, Some(handle));
        gpu.tex_image_2d(
            target,
            0,
            self.options.format,
            self.initial.width,
            self.initial.height,
            self.options.data_type,
            Some(&self.initial.data),
        );
        gpu.tex_parameter(target, TextureParameter::WrapS(self.options.wrap_s));
        gpu.tex_parameter(target, TextureParameter::WrapT(self.options.wrap_t));

        if self.options.mipmaps {
            gpu.generate_mipmap(target);
        }

        gpu.tex_parameter(target, TextureParameter::MinFilter(self.options.resolved_min_filter()));

        handle
    }

    fn upload_pending(&mut self, gpu: &mut dyn GpuBackend, handle: TextureHandle) {
        let target = TextureTarget::Texture2D;
        gpu.bind_texture(target, Some(handle));

        for (level, data) in std::mem::take(&mut self.pending) {
            gpu.tex_image_2d(
                target,
                level,
                self.options.format,
                data.width,
                data.height,
                self.options.data_type,
                Some(&data.data),
            );

            if self.options.mipmaps && level == 0 {
                gpu.generate_mipmap(target);
            }
        }
    }
}

impl Default for DataTexture {
    fn default() -> Self {
        Self::new(TextureOptions::default())
    }
}

impl Texture for DataTexture {
    fn prepare(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let handle = self.create(gpu);
                self.handle = Some(handle);
                handle
            }
        };

        if self.needs_update() {
            self.upload_pending(gpu, handle);
        }

        Some(handle)
    }

    fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_texture(handle);
        }
    }
}

/// 2D texture whose contents are decoded asynchronously
///
/// Binds the placeholder until the loader reports back, then uploads the
/// decoded image on the next prepare.
#[derive(Debug)]
pub struct ImageTexture {
    inner: DataTexture,
    incoming: Option<Receiver<Result<ImageData, AssetError>>>,
}

impl ImageTexture {
    /// Start loading `source` through `loader`
    ///
    /// Decoded images are always RGBA8, so `format` and `data_type` are
    /// overridden accordingly.
    pub fn load(source: impl Into<ImageSource>, loader: &dyn ImageLoader, options: TextureOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        loader.load(
            source.into(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        Self {
            inner: DataTexture::new(TextureOptions {
                format: TextureFormat::Rgba,
                data_type: TextureDataType::UnsignedByte,
                ..options
            }),
            incoming: Some(rx),
        }
    }

    /// Whether the image has arrived (or failed) and been handed over
    pub fn is_settled(&self) -> bool {
        self.incoming.is_none()
    }

    fn poll(&mut self) {
        let Some(rx) = &self.incoming else {
            return;
        };

        match rx.try_recv() {
            Ok(Ok(image)) => {
                self.inner.queue_update(image.into(), 0);
                self.incoming = None;
            }
            Ok(Err(e)) => {
                warn!("Image texture failed to load, keeping placeholder: {}", e);
                self.incoming = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                warn!("Image loader dropped its callback without reporting");
                self.incoming = None;
            }
        }
    }
}

impl Texture for ImageTexture {
    fn prepare(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        self.poll();
        self.inner.prepare(gpu)
    }

    fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        self.inner.delete(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{BlockingImageLoader, LoadCallback};
    use crate::render::headless::{GpuCall, RecordingBackend};

    #[test]
    fn test_placeholder_sized_from_format() {
        assert_eq!(placeholder_pixel(TextureFormat::Rgb, TextureDataType::UnsignedByte).len(), 3);
        assert_eq!(placeholder_pixel(TextureFormat::Rgba, TextureDataType::Float).len(), 16);
        assert_eq!(placeholder_pixel(TextureFormat::Alpha, TextureDataType::HalfFloat).len(), 2);
    }

    #[test]
    fn test_min_filter_follows_mipmaps() {
        let options = TextureOptions { mipmaps: true, ..Default::default() };
        assert_eq!(options.resolved_min_filter(), TextureFilter::LinearMipmapLinear);
        assert_eq!(TextureOptions::default().resolved_min_filter(), TextureFilter::Linear);
    }

    #[test]
    fn test_queued_update_uploads_once() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut texture = DataTexture::default();

        let handle = texture.prepare(&mut gpu);
        texture.queue_update(TextureData { width: 2, height: 2, data: vec![7; 16] }, 0);
        assert_eq!(texture.prepare(&mut gpu), handle);
        texture.prepare(&mut gpu);

        let uploads = log.count(|c| matches!(c, GpuCall::TexImage2D { width: 2, height: 2, .. }));
        assert_eq!(uploads, 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::CreateTexture(_))), 1);
    }

    #[test]
    fn test_image_texture_upgrades_after_load() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();

        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        let source = ImageSource::Bytes(bytes.into_inner().into());

        let mut texture = ImageTexture::load(source, &BlockingImageLoader, TextureOptions::default());
        texture.prepare(&mut gpu);

        assert!(texture.is_settled());
        assert_eq!(log.count(|c| matches!(c, GpuCall::TexImage2D { width: 3, height: 2, .. })), 1);
    }

    #[derive(Debug)]
    struct NeverLoader;

    impl ImageLoader for NeverLoader {
        fn load(&self, _source: ImageSource, _done: LoadCallback) {}
    }

    #[test]
    fn test_dropped_callback_keeps_placeholder() {
        let mut gpu = RecordingBackend::new();
        let mut texture = ImageTexture::load("missing.png", &NeverLoader, TextureOptions::default());

        assert!(texture.prepare(&mut gpu).is_some());
        assert!(texture.is_settled());
    }
}
