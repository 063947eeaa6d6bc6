//! # Renderer
//!
//! Top-level entry point: owns the [`RenderContext`], establishes global GPU
//! state and renders scenes or single geometries into the screen or a
//! framebuffer.

use log::info;

use crate::core::config::RendererConfig;
use crate::scene::Scene;

use super::backend::{Capability, ClearFlags, CullFace, GpuBackend};
use super::context::RenderContext;
use super::framebuffer::Framebuffer;
use super::geometry::BufferGeometry;
use super::headless::{CallLog, RecordingBackend};
use super::material::Material;
use super::{RenderError, RenderResult};

/// Scene and direct-draw renderer
///
/// ## Frame Setup
///
/// Each [`render`](Self::render) call runs pending deferred jobs, binds
/// the target, clears it when `auto_clear` is set, enables depth testing
/// and blending, optionally enables back-face culling, then hands the
/// context to the scene.
#[derive(Debug)]
pub struct Renderer {
    ctx: RenderContext,
    config: RendererConfig,
}

impl Renderer {
    /// Create a renderer over `gpu`
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InitializationFailed`] for a zero-sized drawing
    /// buffer.
    pub fn new(gpu: Box<dyn GpuBackend>, config: RendererConfig) -> RenderResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(RenderError::InitializationFailed(format!(
                "drawing buffer must not be empty, got {}x{}",
                config.width, config.height
            )));
        }

        info!(
            "Renderer initialized at {}x{} (transparency: {}, antialias: {})",
            config.width, config.height, config.transparency, config.antialias
        );

        Ok(Self {
            ctx: RenderContext::new(gpu, config.width, config.height),
            config,
        })
    }

    /// Renderer over a [`RecordingBackend`], returning its call log
    ///
    /// # Errors
    ///
    /// Same as [`Renderer::new`].
    pub fn headless(config: RendererConfig) -> RenderResult<(Self, CallLog)> {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        Ok((Self::new(Box::new(gpu), config)?, log))
    }

    /// The render context
    pub fn ctx(&self) -> &RenderContext {
        &self.ctx
    }

    /// The render context, for creating and deleting resources
    pub fn ctx_mut(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Drawing buffer width
    pub fn width(&self) -> u32 {
        self.ctx.width()
    }

    /// Drawing buffer height
    pub fn height(&self) -> u32 {
        self.ctx.height()
    }

    /// Resize the drawing buffer
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.ctx.set_size(width, height);
    }

    /// Change the color used by every color clear
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.config.clear_color = color;
    }

    /// Clear color, depth and stencil of the bound target
    pub fn clear(&mut self) {
        self.clear_with(ClearFlags::all());
    }

    /// Clear only color
    pub fn clear_color_buffer(&mut self) {
        self.clear_with(ClearFlags::COLOR);
    }

    /// Clear only depth
    pub fn clear_depth_buffer(&mut self) {
        self.ctx.gpu.clear(ClearFlags::DEPTH);
    }

    /// Clear only stencil
    pub fn clear_stencil_buffer(&mut self) {
        self.ctx.gpu.clear(ClearFlags::STENCIL);
    }

    fn clear_with(&mut self, flags: ClearFlags) {
        let [r, g, b, a] = self.config.clear_color;
        let gpu = self.ctx.gpu.as_mut();
        gpu.clear_color(r, g, b, a);
        gpu.clear(flags);
    }

    /// Run this frame's share of deferred jobs
    pub fn run_deferred(&mut self) -> usize {
        self.ctx.run_deferred(self.config.deferred_compilations_per_frame)
    }

    fn bind_target(&mut self, framebuffer: Option<&Framebuffer>) {
        let (width, height) = (self.ctx.width(), self.ctx.height());
        let gpu = self.ctx.gpu.as_mut();
        match framebuffer {
            Some(framebuffer) => framebuffer.bind(gpu),
            None => {
                gpu.bind_framebuffer(None);
                gpu.viewport(0, 0, width, height);
            }
        }
    }

    /// Render `scene` into `framebuffer`, or the screen when `None`
    pub fn render(&mut self, scene: &mut Scene, framebuffer: Option<&Framebuffer>) {
        self.run_deferred();
        self.bind_target(framebuffer);

        if self.config.auto_clear {
            self.clear();
        }

        let gpu = self.ctx.gpu.as_mut();
        gpu.enable(Capability::DepthTest);
        gpu.enable(Capability::Blend);
        if self.config.cull_faces {
            gpu.enable(Capability::CullFace);
            gpu.cull_face(CullFace::Back);
        }

        scene.render(&mut self.ctx);
    }

    /// Draw one geometry with one material, bypassing any scene
    pub fn render_direct(
        &mut self,
        geometry: &mut BufferGeometry,
        material: &mut Material,
        framebuffer: Option<&Framebuffer>,
    ) {
        self.run_deferred();
        self.bind_target(framebuffer);

        if material.use_program(&mut self.ctx) {
            geometry.draw(&mut self.ctx, material);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::BlendFactor;
    use crate::render::{FramebufferOptions, GpuCall};
    use crate::scene::{Camera, Node, Renderable};

    fn renderer(config: RendererConfig) -> (Renderer, CallLog) {
        Renderer::headless(config).unwrap()
    }

    #[test]
    fn test_empty_drawing_buffer_is_rejected() {
        let result = Renderer::headless(RendererConfig::new(0, 600));
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }

    #[test]
    fn test_frame_setup_before_scene() {
        let (mut renderer, log) = renderer(RendererConfig::new(320, 240).with_clear_color([0.5, 0.0, 0.0, 1.0]));
        let mut scene = Scene::new();

        renderer.render(&mut scene, None);

        assert_eq!(
            log.snapshot(),
            vec![
                GpuCall::BindFramebuffer(None),
                GpuCall::Viewport { x: 0, y: 0, width: 320, height: 240 },
                GpuCall::ClearColor([0.5, 0.0, 0.0, 1.0]),
                GpuCall::Clear(ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL),
                GpuCall::Enable(Capability::DepthTest),
                GpuCall::Enable(Capability::Blend),
                GpuCall::Enable(Capability::CullFace),
                GpuCall::CullFace(CullFace::Back),
            ]
        );
    }

    #[test]
    fn test_manual_clear_and_no_culling() {
        let config = RendererConfig::new(8, 8).with_auto_clear(false).with_cull_faces(false);
        let (mut renderer, log) = renderer(config);
        let mut scene = Scene::new();

        renderer.render(&mut scene, None);

        assert_eq!(log.count(|c| matches!(c, GpuCall::Clear(_))), 0);
        assert_eq!(log.count(|c| matches!(c, GpuCall::Enable(Capability::CullFace))), 0);

        renderer.clear_depth_buffer();
        assert_eq!(log.snapshot().last(), Some(&GpuCall::Clear(ClearFlags::DEPTH)));
    }

    #[test]
    fn test_scene_into_framebuffer() {
        let (mut renderer, log) = renderer(RendererConfig::new(64, 64));
        let target = Framebuffer::new(renderer.ctx_mut(), FramebufferOptions { width: Some(16), height: Some(16), ..Default::default() });

        let mut scene = Scene::new();
        let root = scene.root();
        let camera = scene.add(root, Node::camera(Camera::default()));
        scene.set_active_camera(Some(camera));
        scene.add(
            root,
            Node::renderable(Renderable::new(
                BufferGeometry::new(vec![0.0; 9]).into_shared(),
                Material::default().into_shared(),
            )),
        );
        log.clear();

        renderer.render(&mut scene, Some(&target));

        let calls = log.snapshot();
        assert!(matches!(calls[0], GpuCall::BindFramebuffer(Some(_))));
        assert_eq!(calls[1], GpuCall::Viewport { x: 0, y: 0, width: 16, height: 16 });
        assert!(calls.contains(&GpuCall::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)));
        assert_eq!(log.draw_count(), 1);
    }

    #[test]
    fn test_render_direct_draws_once() {
        let (mut renderer, log) = renderer(RendererConfig::default());
        let mut geometry = BufferGeometry::new(vec![0.0; 9]);
        let mut material = Material::default();

        renderer.render_direct(&mut geometry, &mut material, None);

        assert_eq!(log.draw_count(), 1);
        assert_eq!(log.calls()[1], GpuCall::Viewport { x: 0, y: 0, width: 800, height: 600 });
    }

    #[test]
    fn test_deferred_material_compiles_on_later_frame() {
        let (mut renderer, log) = renderer(RendererConfig::default());
        let mut geometry = BufferGeometry::new(vec![0.0; 9]);
        let mut material = Material::default().with_deferred_compilation(true);

        renderer.render_direct(&mut geometry, &mut material, None);
        assert_eq!(log.draw_count(), 0);
        assert_eq!(renderer.ctx().deferred.len(), 1);

        renderer.render_direct(&mut geometry, &mut material, None);
        assert_eq!(log.draw_count(), 1);
    }
}
