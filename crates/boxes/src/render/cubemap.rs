//! Cubemap textures
//!
//! Per-level updates are collected face by face and only uploaded once all
//! six faces of that level have arrived.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver};

use log::warn;

use crate::assets::{AssetError, ImageData, ImageLoader, ImageSource};

use super::backend::{
    GpuBackend, TextureDataType, TextureFilter, TextureFormat, TextureHandle, TextureParameter,
    TextureTarget,
};
use super::texture::{placeholder_pixel, Texture, TextureData, TextureOptions};

/// One face of a cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeFace {
    /// All faces in upload order
    pub const ALL: [CubeFace; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Upload target for this face
    pub fn target(self) -> TextureTarget {
        match self {
            Self::PositiveX => TextureTarget::CubeMapPositiveX,
            Self::NegativeX => TextureTarget::CubeMapNegativeX,
            Self::PositiveY => TextureTarget::CubeMapPositiveY,
            Self::NegativeY => TextureTarget::CubeMapNegativeY,
            Self::PositiveZ => TextureTarget::CubeMapPositiveZ,
            Self::NegativeZ => TextureTarget::CubeMapNegativeZ,
        }
    }
}

/// One value per cube face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeOf<T> {
    /// +X
    pub px: T,
    /// -X
    pub nx: T,
    /// +Y
    pub py: T,
    /// -Y
    pub ny: T,
    /// +Z
    pub pz: T,
    /// -Z
    pub nz: T,
}

impl<T: Clone> CubeOf<T> {
    /// The same value on every face
    pub fn splat(value: T) -> Self {
        Self {
            px: value.clone(),
            nx: value.clone(),
            py: value.clone(),
            ny: value.clone(),
            pz: value.clone(),
            nz: value,
        }
    }
}

impl<T> CubeOf<T> {
    /// Value for a face
    pub fn get(&self, face: CubeFace) -> &T {
        match face {
            CubeFace::PositiveX => &self.px,
            CubeFace::NegativeX => &self.nx,
            CubeFace::PositiveY => &self.py,
            CubeFace::NegativeY => &self.ny,
            CubeFace::PositiveZ => &self.pz,
            CubeFace::NegativeZ => &self.nz,
        }
    }
}

type PartialCube = [Option<TextureData>; 6];

/// Cubemap fed from raw pixel data
#[derive(Debug)]
pub struct Cubemap {
    handle: Option<TextureHandle>,
    options: TextureOptions,
    initial_width: u32,
    initial: CubeOf<Vec<u8>>,
    pending: BTreeMap<u32, PartialCube>,
}

impl Cubemap {
    /// Create a cubemap with 1x1 placeholder faces
    ///
    /// Cubemaps generate mipmaps unless `options` says otherwise; pass
    /// [`Cubemap::default_options`] for that behaviour.
    pub fn new(options: TextureOptions) -> Self {
        Self {
            handle: None,
            initial_width: 1,
            initial: CubeOf::splat(placeholder_pixel(options.format, options.data_type)),
            options,
            pending: BTreeMap::new(),
        }
    }

    /// Create a cubemap with explicit square initial faces
    pub fn with_data(options: TextureOptions, width: u32, faces: CubeOf<Vec<u8>>) -> Self {
        Self {
            initial_width: width,
            initial: faces,
            ..Self::new(options)
        }
    }

    /// Default cubemap options (mipmapped RGBA8)
    pub fn default_options() -> TextureOptions {
        TextureOptions {
            mipmaps: true,
            ..Default::default()
        }
    }

    /// Queue one face of a mip level
    pub fn queue_update(&mut self, face: CubeFace, data: TextureData, level: u32) {
        self.pending.entry(level).or_default()[face.index()] = Some(data);
    }

    /// Whether any level is waiting for faces or upload
    pub fn needs_update(&self) -> bool {
        !self.pending.is_empty()
    }

    fn create(&mut self, gpu: &mut dyn GpuBackend) -> TextureHandle {
        let handle = gpu.create_texture();
        gpu.bind_texture(TextureTarget::CubeMap, Some(handle));

        for face in CubeFace::ALL {
            gpu.tex_image_2d(
                face.target(),
                0,
                self.options.format,
                self.initial_width,
                self.initial_width,
                self.options.data_type,
                Some(self.initial.get(face)),
            );
        }

        gpu.tex_parameter(TextureTarget::CubeMap, TextureParameter::MinFilter(TextureFilter::Linear));
        handle
    }

    fn upload_complete_levels(&mut self, gpu: &mut dyn GpuBackend, handle: TextureHandle) {
        gpu.bind_texture(TextureTarget::CubeMap, Some(handle));

        let complete: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, faces)| faces.iter().all(Option::is_some))
            .map(|(level, _)| *level)
            .collect();

        for level in complete {
            let Some(faces) = self.pending.remove(&level) else {
                continue;
            };

            for (face, data) in CubeFace::ALL.into_iter().zip(faces.iter()) {
                if let Some(data) = data {
                    gpu.tex_image_2d(
                        face.target(),
                        level,
                        self.options.format,
                        data.width,
                        data.height,
                        self.options.data_type,
                        Some(&data.data),
                    );
                }
            }

            if self.options.mipmaps && level == 0 {
                gpu.generate_mipmap(TextureTarget::CubeMap);
            }
        }

        gpu.tex_parameter(
            TextureTarget::CubeMap,
            TextureParameter::MinFilter(self.options.resolved_min_filter()),
        );
    }
}

impl Default for Cubemap {
    fn default() -> Self {
        Self::new(Self::default_options())
    }
}

impl Texture for Cubemap {
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
            self.upload_complete_levels(gpu, handle);
        }

        Some(handle)
    }

    fn is_cubemap(&self) -> bool {
        true
    }

    fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_texture(handle);
        }
    }
}

/// Cubemap whose six faces are decoded asynchronously
#[derive(Debug)]
pub struct ImageCubemap {
    inner: Cubemap,
    incoming: Receiver<(CubeFace, Result<ImageData, AssetError>)>,
}

impl ImageCubemap {
    /// Start loading one image per face
    pub fn load(sources: CubeOf<ImageSource>, loader: &dyn ImageLoader, options: TextureOptions) -> Self {
        let (tx, rx) = mpsc::channel();

        for face in CubeFace::ALL {
            let tx = tx.clone();
            loader.load(
                sources.get(face).clone(),
                Box::new(move |result| {
                    let _ = tx.send((face, result));
                }),
            );
        }

        Self {
            inner: Cubemap::new(TextureOptions {
                format: TextureFormat::Rgba,
                data_type: TextureDataType::UnsignedByte,
                ..options
            }),
            incoming: rx,
        }
    }

    fn poll(&mut self) {
        for (face, result) in self.incoming.try_iter() {
            match result {
                Ok(image) => self.inner.queue_update(face, image.into(), 0),
                Err(e) => warn!("Cubemap face {:?} failed to load: {}", face, e),
            }
        }
    }
}

impl Texture for ImageCubemap {
    fn prepare(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        self.poll();
        self.inner.prepare(gpu)
    }

    fn is_cubemap(&self) -> bool {
        true
    }

    fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        self.inner.delete(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{GpuCall, RecordingBackend};

    fn face(width: u32) -> TextureData {
        TextureData {
            width,
            height: width,
            data: vec![0; (width * width * 4) as usize],
        }
    }

    fn level_uploads(log: &crate::render::headless::CallLog, level: u32) -> usize {
        log.count(|c| matches!(c, GpuCall::TexImage2D { level: l, width: 4, .. } if *l == level))
    }

    #[test]
    fn test_placeholder_faces_on_create() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut cubemap = Cubemap::default();

        cubemap.prepare(&mut gpu);

        assert_eq!(log.count(|c| matches!(c, GpuCall::TexImage2D { width: 1, .. })), 6);
        assert!(cubemap.is_cubemap());
    }

    #[test]
    fn test_partial_level_waits_for_all_faces() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut cubemap = Cubemap::default();

        for f in &CubeFace::ALL[..5] {
            cubemap.queue_update(*f, face(4), 0);
        }
        cubemap.prepare(&mut gpu);
        assert_eq!(level_uploads(&log, 0), 0);
        assert!(cubemap.needs_update());

        cubemap.queue_update(CubeFace::NegativeZ, face(4), 0);
        cubemap.prepare(&mut gpu);
        assert_eq!(level_uploads(&log, 0), 6);
        assert!(!cubemap.needs_update());
        assert_eq!(log.count(|c| matches!(c, GpuCall::GenerateMipmap(TextureTarget::CubeMap))), 1);
    }
}
