//! # Renderer Configuration
//!
//! Serializable settings for the [`Renderer`](crate::render::Renderer) and
//! [`PostFxPipeline`](crate::render::PostFxPipeline). Both structs implement
//! [`Config`] so they can be read from TOML or RON files.
//!
//! ```toml
//! width = 1280
//! height = 720
//! clear_color = [0.1, 0.1, 0.1, 1.0]
//! ```

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// RGBA clear color
pub type Color = [f32; 4];

/// # Renderer Configuration
///
/// Drawing-buffer size and the global GPU state the renderer establishes
/// before each scene render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Drawing buffer width in pixels
    pub width: u32,
    /// Drawing buffer height in pixels
    pub height: u32,
    /// Color used by every color clear
    pub clear_color: Color,
    /// Clear color, depth and stencil before each scene render
    pub auto_clear: bool,
    /// Enable back-face culling for scene renders
    pub cull_faces: bool,
    /// Request an alpha channel on the drawing buffer
    pub transparency: bool,
    /// Request multisampling on the drawing buffer
    pub antialias: bool,
    /// Maximum deferred jobs (shader compilations) run at the start of a frame
    pub deferred_compilations_per_frame: usize,
}

impl RendererConfig {
    /// Create a configuration with the given drawing-buffer size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, clear_color: Color) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Enable or disable automatic clearing
    pub fn with_auto_clear(mut self, auto_clear: bool) -> Self {
        self.auto_clear = auto_clear;
        self
    }

    /// Enable or disable back-face culling
    pub fn with_cull_faces(mut self, cull_faces: bool) -> Self {
        self.cull_faces = cull_faces;
        self
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            auto_clear: true,
            cull_faces: true,
            transparency: false,
            antialias: false,
            deferred_compilations_per_frame: 1,
        }
    }
}

impl Config for RendererConfig {}

/// # Post-Processing Configuration
///
/// Size and attachments of the two ping-pong framebuffers owned by a
/// post-effects pipeline. A `None` size follows the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxConfig {
    /// Framebuffer width override
    pub width: Option<u32>,
    /// Framebuffer height override
    pub height: Option<u32>,
    /// Attach a depth buffer to both framebuffers
    pub depth: bool,
    /// Attach a stencil buffer to both framebuffers
    pub stencil: bool,
    /// Do not allocate the ping-pong framebuffers
    pub skip_fbo_generation: bool,
}

impl Config for PostFxConfig {}
