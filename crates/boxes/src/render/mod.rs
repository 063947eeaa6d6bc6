//! # Rendering Layer
//!
//! GPU resources and the passes that use them, over any [`GpuBackend`].
//!
//! ## Architecture
//!
//! - **Backend**: [`GpuBackend`] is the WebGL-shaped device boundary;
//!   [`RecordingBackend`] is a headless implementation that records calls
//! - **Context**: [`RenderContext`] owns the backend, the shared
//!   [`ProgramCache`] and the deferred job queue
//! - **Resources**: [`Material`], [`BufferGeometry`], textures and
//!   [`Framebuffer`]s, created by application code and released with `delete`
//! - **Passes**: [`Renderer`] draws scenes and single geometries;
//!   [`PostFxPipeline`] chains full-screen effects through two framebuffers
//!
//! The per-frame path never returns errors. Shader failures, missing
//! cameras and malformed attributes are logged and the frame continues.

pub mod backend;
pub mod context;
pub mod cubemap;
pub mod framebuffer;
pub mod geometry;
pub mod headless;
pub mod material;
pub mod post;
pub mod program_cache;
pub mod renderer;
pub mod shaders;
pub mod texture;
pub mod uniform;

pub use backend::{DrawMode, GpuBackend, ATTRIBUTE_NOT_FOUND};
pub use context::{DeferredJob, DeferredQueue, RenderContext, Scheduler};
pub use cubemap::{CubeFace, CubeOf, Cubemap, ImageCubemap};
pub use framebuffer::{Framebuffer, FramebufferOptions, SharedFramebuffer};
pub use geometry::{AttributeLayout, BufferGeometry, InstancedAttribute, SharedGeometry, SharedInstancedAttribute};
pub use headless::{CallLog, GpuCall, RecordingBackend};
pub use material::{Material, MaterialId, SharedMaterial};
pub use post::{shader_pass, PostFxOutput, PostFxPipeline, PostFxStep};
pub use program_cache::{ProgramCache, ProgramKey};
pub use renderer::Renderer;
pub use texture::{DataTexture, ImageTexture, SharedTexture, Texture, TextureData, TextureOptions};
pub use uniform::UniformValue;

/// Errors raised for misuse of the rendering API
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The renderer could not be set up from its configuration
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// An instanced attribute was initialised twice
    ///
    /// Mutate the data through the instance views and call `update` instead.
    #[error("Cannot reinitialise instanced attribute, use update instead")]
    AttributeReinitialized,
}

/// Result type for fallible rendering calls
pub type RenderResult<T> = Result<T, RenderError>;
