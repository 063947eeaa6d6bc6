//! # Post-Processing
//!
//! [`PostFxPipeline`] runs a list of steps through two framebuffers used as
//! rotating read and write targets. Each material step samples the previous
//! output as `u_tDiffuse0..N`, receives the elapsed time in milliseconds as
//! `u_fTime` and draws one full-screen triangle. Scene steps render a scene.
//! Explicit framebuffer steps redirect the write of the step before them and
//! the read of the step after them.
//!
//! After every drawing step the read buffer is cleared and the two buffers
//! swap, so the latest output is always in the read position.

use log::debug;

use crate::core::config::PostFxConfig;
use crate::scene::Scene;

use super::backend::BlendFactor;
use super::framebuffer::{Framebuffer, FramebufferOptions, SharedFramebuffer};
use super::geometry::BufferGeometry;
use super::material::{Material, SharedMaterial};
use super::renderer::Renderer;
use super::shaders;
use super::texture::SharedTexture;
use super::uniform::UniformValue;

/// One entry of a post-processing chain
#[derive(Debug)]
pub enum PostFxStep<'a> {
    /// Full-screen shader pass
    Material(SharedMaterial),
    /// Render a scene
    Scene(&'a mut Scene),
    /// Explicit target for the previous step and source for the next
    Framebuffer(SharedFramebuffer),
    /// Several sources for the next step; the first is the previous step's target
    Framebuffers(Vec<SharedFramebuffer>),
}

impl PostFxStep<'_> {
    fn write_target(&self) -> Option<SharedFramebuffer> {
        match self {
            Self::Framebuffer(framebuffer) => Some(SharedFramebuffer::clone(framebuffer)),
            Self::Framebuffers(framebuffers) => framebuffers.first().cloned(),
            _ => None,
        }
    }

    fn read_sources(&self) -> Option<Vec<SharedFramebuffer>> {
        match self {
            Self::Framebuffer(framebuffer) => Some(vec![SharedFramebuffer::clone(framebuffer)]),
            Self::Framebuffers(framebuffers) if !framebuffers.is_empty() => Some(framebuffers.clone()),
            _ => None,
        }
    }
}

/// Where the last step of a chain draws
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostFxOutput {
    /// The default framebuffer
    #[default]
    Screen,
    /// The next ping-pong buffer, readable afterwards through [`PostFxPipeline::result`]
    PingPong,
}

/// Build a full-screen pass material from a fragment shader
///
/// The vertex stage passes positions through unprojected and forwards `a_vUv`.
pub fn shader_pass(fragment_source: &str) -> Material {
    Material::new(shaders::UNPROJECTED_VERTEX_SHADER, fragment_source)
}

/// Two-buffer post-effects chain
#[derive(Debug)]
pub struct PostFxPipeline {
    tri: BufferGeometry,
    fbo_a: Option<SharedFramebuffer>,
    fbo_b: Option<SharedFramebuffer>,
}

impl PostFxPipeline {
    /// Create the pipeline and, unless skipped, its two framebuffers
    pub fn new(renderer: &mut Renderer, config: &PostFxConfig) -> Self {
        let tri = BufferGeometry::new(vec![-1.0, -1.0, 0.0, 3.0, -1.0, 0.0, -1.0, 3.0, 0.0])
            .with_attribute("a_vUv", vec![0.0, 0.0, 2.0, 0.0, 0.0, 2.0]);

        let (fbo_a, fbo_b) = if config.skip_fbo_generation {
            (None, None)
        } else {
            let options = FramebufferOptions {
                width: Some(config.width.unwrap_or_else(|| renderer.width())),
                height: Some(config.height.unwrap_or_else(|| renderer.height())),
                depth: config.depth,
                stencil: config.stencil,
            };
            let ctx = renderer.ctx_mut();
            (
                Some(Framebuffer::new(ctx, options).into_shared()),
                Some(Framebuffer::new(ctx, options).into_shared()),
            )
        };

        Self { tri, fbo_a, fbo_b }
    }

    /// Buffer currently in the read position
    ///
    /// After a [`PostFxOutput::PingPong`] render this holds the final output.
    pub fn result(&self) -> Option<SharedFramebuffer> {
        self.fbo_a.clone()
    }

    /// Buffer currently in the write position
    pub fn scratch(&self) -> Option<SharedFramebuffer> {
        self.fbo_b.clone()
    }

    /// Run `steps`, drawing the last one to the screen
    pub fn render(&mut self, renderer: &mut Renderer, steps: &mut [PostFxStep<'_>]) {
        self.render_to(renderer, steps, PostFxOutput::Screen);
    }

    /// Run `steps` with an explicit final target
    pub fn render_to(&mut self, renderer: &mut Renderer, steps: &mut [PostFxStep<'_>], output: PostFxOutput) {
        renderer
            .ctx_mut()
            .gpu
            .blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

        for index in 0..steps.len() {
            let reads = index
                .checked_sub(1)
                .and_then(|previous| steps[previous].read_sources())
                .unwrap_or_else(|| self.fbo_a.iter().cloned().collect());

            let write = match steps.get(index + 1) {
                Some(next) => next.write_target().or_else(|| self.fbo_b.clone()),
                None if output == PostFxOutput::PingPong => self.fbo_b.clone(),
                None => None,
            };
            let target = write.as_ref().map(|framebuffer| framebuffer.borrow());

            match &mut steps[index] {
                PostFxStep::Material(material) => {
                    let mut material = material.borrow_mut();
                    for (unit, buffer) in reads.into_iter().enumerate() {
                        let texture: SharedTexture = buffer;
                        material.set_uniform(format!("u_tDiffuse{unit}"), UniformValue::Texture(texture));
                    }
                    material.set_uniform("u_fTime", renderer.ctx().elapsed_ms());

                    renderer.render_direct(&mut self.tri, &mut material, target.as_deref());
                }
                PostFxStep::Scene(scene) => {
                    renderer.render(scene, target.as_deref());
                }
                PostFxStep::Framebuffer(_) | PostFxStep::Framebuffers(_) => continue,
            }

            drop(target);
            self.swap_buffers(renderer);
        }
    }

    fn swap_buffers(&mut self, renderer: &mut Renderer) {
        if let Some(fbo_a) = &self.fbo_a {
            fbo_a.borrow().clear(renderer.ctx_mut().gpu.as_mut());
        }
        std::mem::swap(&mut self.fbo_a, &mut self.fbo_b);
    }

    /// Resize both framebuffers
    pub fn set_size(&mut self, renderer: &mut Renderer, width: u32, height: u32) {
        debug!("Resizing post-processing buffers to {}x{}", width, height);
        let gpu = renderer.ctx_mut().gpu.as_mut();
        for framebuffer in self.fbo_a.iter().chain(self.fbo_b.iter()) {
            framebuffer.borrow_mut().set_size(gpu, width, height);
        }
    }

    /// Free both framebuffers and the full-screen triangle
    pub fn delete(&mut self, renderer: &mut Renderer) {
        let ctx = renderer.ctx_mut();
        for framebuffer in self.fbo_a.iter().chain(self.fbo_b.iter()) {
            framebuffer.borrow_mut().delete(ctx.gpu.as_mut());
        }
        self.tri.delete(ctx);
    }
}
