//! Off-screen render targets
//!
//! A [`Framebuffer`] renders into a color texture with optional depth and/or
//! stencil storage, and can be sampled afterwards as a [`Texture`].

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::backend::{
    Attachment, ClearFlags, FramebufferHandle, GpuBackend, RenderbufferFormat, RenderbufferHandle,
    TextureDataType, TextureFilter, TextureFormat, TextureHandle, TextureParameter, TextureTarget,
    TextureWrap,
};
use super::context::RenderContext;
use super::texture::Texture;

/// Framebuffer creation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferOptions {
    /// Width in pixels; the drawing-buffer width when unset
    pub width: Option<u32>,
    /// Height in pixels; the drawing-buffer height when unset
    pub height: Option<u32>,
    /// Attach depth storage
    pub depth: bool,
    /// Attach stencil storage
    pub stencil: bool,
}

/// Framebuffer shared between a pipeline and the materials sampling it
pub type SharedFramebuffer = Rc<RefCell<Framebuffer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuxStorage {
    None,
    Depth(RenderbufferHandle),
    Stencil(RenderbufferHandle),
    DepthStencil(RenderbufferHandle),
}

/// Color texture plus optional depth/stencil storage
#[derive(Debug)]
pub struct Framebuffer {
    fbo: Option<FramebufferHandle>,
    texture: Option<TextureHandle>,
    storage: AuxStorage,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// Create and allocate a framebuffer
    pub fn new(ctx: &mut RenderContext, options: FramebufferOptions) -> Self {
        let width = options.width.unwrap_or_else(|| ctx.width());
        let height = options.height.unwrap_or_else(|| ctx.height());
        let gpu = ctx.gpu.as_mut();

        let fbo = gpu.create_framebuffer();
        let texture = gpu.create_texture();

        let storage = match (options.depth, options.stencil) {
            (true, true) => AuxStorage::DepthStencil(gpu.create_renderbuffer()),
            (true, false) => AuxStorage::Depth(gpu.create_renderbuffer()),
            (false, true) => AuxStorage::Stencil(gpu.create_renderbuffer()),
            (false, false) => AuxStorage::None,
        };

        let mut framebuffer = Self {
            fbo: Some(fbo),
            texture: Some(texture),
            storage,
            width,
            height,
        };
        framebuffer.set_size(gpu, width, height);
        framebuffer
    }

    /// Wrap for sharing
    pub fn into_shared(self) -> SharedFramebuffer {
        Rc::new(RefCell::new(self))
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color attachment, until deleted
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Whether depth storage is attached
    pub fn has_depth(&self) -> bool {
        matches!(
            self.storage,
            AuxStorage::Depth(_) | AuxStorage::DepthStencil(_)
        )
    }

    /// Whether stencil storage is attached
    pub fn has_stencil(&self) -> bool {
        matches!(
            self.storage,
            AuxStorage::Stencil(_) | AuxStorage::DepthStencil(_)
        )
    }

    /// Reallocate all attachments at a new size
    pub fn set_size(&mut self, gpu: &mut dyn GpuBackend, width: u32, height: u32) {
        self.width = width;
        self.height = height;

        let (Some(fbo), Some(texture)) = (self.fbo, self.texture) else {
            return;
        };
        let target = TextureTarget::Texture2D;

        gpu.bind_texture(target, Some(texture));
        gpu.tex_image_2d(target, 0, TextureFormat::Rgba, width, height, TextureDataType::UnsignedByte, None);
        gpu.tex_parameter(target, TextureParameter::MagFilter(TextureFilter::Linear));
        gpu.tex_parameter(target, TextureParameter::MinFilter(TextureFilter::Linear));
        gpu.tex_parameter(target, TextureParameter::WrapS(TextureWrap::ClampToEdge));
        gpu.tex_parameter(target, TextureParameter::WrapT(TextureWrap::ClampToEdge));

        gpu.bind_framebuffer(Some(fbo));
        gpu.framebuffer_texture_2d(Attachment::Color0, texture);

        let mut attach = |renderbuffer, format, attachment| {
            gpu.bind_renderbuffer(Some(renderbuffer));
            gpu.renderbuffer_storage(format, width, height);
            gpu.framebuffer_renderbuffer(attachment, renderbuffer);
        };

        match self.storage {
            AuxStorage::None => {}
            AuxStorage::Depth(rb) => attach(rb, RenderbufferFormat::DepthComponent16, Attachment::Depth),
            AuxStorage::Stencil(rb) => attach(rb, RenderbufferFormat::StencilIndex8, Attachment::Stencil),
            AuxStorage::DepthStencil(rb) => {
                attach(rb, RenderbufferFormat::DepthStencil, Attachment::DepthStencil);
            }
        }
    }

    /// GPU framebuffer object, `None` after [`delete`](Self::delete)
    pub fn handle(&self) -> Option<FramebufferHandle> {
        self.fbo
    }

    /// Render into this framebuffer
    pub fn bind(&self, gpu: &mut dyn GpuBackend) {
        gpu.bind_framebuffer(self.fbo);
        gpu.viewport(0, 0, self.width, self.height);
    }

    /// Clear color plus whichever of depth and stencil are attached
    pub fn clear(&self, gpu: &mut dyn GpuBackend) {
        let mut flags = ClearFlags::COLOR;
        if self.has_depth() {
            flags |= ClearFlags::DEPTH;
        }
        if self.has_stencil() {
            flags |= ClearFlags::STENCIL;
        }
        self.bind(gpu);
        gpu.clear(flags);
    }

    /// Clear only the color attachment
    pub fn clear_color(&self, gpu: &mut dyn GpuBackend) {
        self.bind(gpu);
        gpu.clear(ClearFlags::COLOR);
    }

    /// Clear only depth
    pub fn clear_depth(&self, gpu: &mut dyn GpuBackend) {
        self.bind(gpu);
        gpu.clear(ClearFlags::DEPTH);
    }

    /// Clear only stencil
    pub fn clear_stencil(&self, gpu: &mut dyn GpuBackend) {
        self.bind(gpu);
        gpu.clear(ClearFlags::STENCIL);
    }

    /// Free the framebuffer, its texture and any renderbuffers
    pub fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(fbo) = self.fbo.take() {
            gpu.delete_framebuffer(fbo);
        }
        if let Some(texture) = self.texture.take() {
            gpu.delete_texture(texture);
        }
        match std::mem::replace(&mut self.storage, AuxStorage::None) {
            AuxStorage::None => {}
            AuxStorage::Depth(rb) | AuxStorage::Stencil(rb) | AuxStorage::DepthStencil(rb) => {
                gpu.delete_renderbuffer(rb);
            }
        }
    }
}

impl Texture for Framebuffer {
    fn prepare(&mut self, _gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        self.texture
    }

    fn delete(&mut self, gpu: &mut dyn GpuBackend) {
        Framebuffer::delete(self, gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{GpuCall, RecordingBackend};

    fn context() -> (RenderContext, crate::render::CallLog) {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        (RenderContext::new(Box::new(gpu), 320, 240), log)
    }

    #[test]
    fn test_defaults_to_drawing_buffer_size() {
        let (mut ctx, log) = context();
        let framebuffer = Framebuffer::new(&mut ctx, FramebufferOptions::default());

        assert_eq!((framebuffer.width(), framebuffer.height()), (320, 240));
        assert_eq!(log.count(|c| matches!(c, GpuCall::CreateRenderbuffer(_))), 0);
        assert!(log
            .calls()
            .iter()
            .any(|c| matches!(c, GpuCall::TexImage2D { width: 320, height: 240, has_data: false, .. })));
    }

    #[test]
    fn test_depth_and_stencil_share_storage() {
        let (mut ctx, log) = context();
        let framebuffer = Framebuffer::new(
            &mut ctx,
            FramebufferOptions { depth: true, stencil: true, ..Default::default() },
        );

        assert!(framebuffer.has_depth() && framebuffer.has_stencil());
        assert_eq!(log.count(|c| matches!(c, GpuCall::CreateRenderbuffer(_))), 1);
        assert_eq!(
            log.count(|c| matches!(c, GpuCall::FramebufferRenderbuffer(Attachment::DepthStencil, _))),
            1
        );

        log.clear();
        framebuffer.clear(ctx.gpu.as_mut());
        assert_eq!(
            log.snapshot().last(),
            Some(&GpuCall::Clear(ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL))
        );
    }

    #[test]
    fn test_resize_reallocates_storage() {
        let (mut ctx, log) = context();
        let mut framebuffer = Framebuffer::new(
            &mut ctx,
            FramebufferOptions { width: Some(8), height: Some(8), depth: true, ..Default::default() },
        );

        framebuffer.set_size(ctx.gpu.as_mut(), 16, 4);

        assert_eq!(
            log.count(|c| matches!(
                c,
                GpuCall::RenderbufferStorage { format: RenderbufferFormat::DepthComponent16, width: 16, height: 4 }
            )),
            1
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut ctx, log) = context();
        let mut framebuffer = Framebuffer::new(
            &mut ctx,
            FramebufferOptions { stencil: true, ..Default::default() },
        );

        framebuffer.delete(ctx.gpu.as_mut());
        framebuffer.delete(ctx.gpu.as_mut());

        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteRenderbuffer(_))), 1);
        assert_eq!(framebuffer.prepare(ctx.gpu.as_mut()), None);
    }
}
