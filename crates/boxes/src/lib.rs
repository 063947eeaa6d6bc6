//! # Boxes
//!
//! A retained scene graph and GPU resource layer over a WebGL-style backend.
//!
//! ## Features
//!
//! - **Scene Graph**: arena-backed tree with transforms, visibility, layers and hooks
//! - **Cached Render Queue**: rebuilt only after structural changes, stable-sorted by order
//! - **Stencil Masks**: any subtree can mask a renderable
//! - **Materials**: shared, reference-counted program cache and uniform binding
//! - **Geometry**: interleaved buffers with per-material vertex arrays and instancing
//! - **Post Effects**: two-framebuffer ping-pong chains
//! - **Picking**: sphere and polygon hit regions
//! - **Headless Backend**: records every GPU call for tests and tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boxes::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let (mut renderer, _log) = Renderer::headless(RendererConfig::default())?;
//!
//!     let mut scene = Scene::new();
//!     let root = scene.root();
//!     let camera = scene.add(
//!         root,
//!         Node::camera(Camera::default()).with_translation(Vec3::new(0.0, 0.0, 5.0)),
//!     );
//!     scene.set_active_camera(Some(camera));
//!
//!     let geometry = BufferGeometry::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
//!     scene.add(
//!         root,
//!         Node::renderable(Renderable::new(geometry.into_shared(), Material::default().into_shared())),
//!     );
//!
//!     renderer.render(&mut scene, None);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        assets::{BlockingImageLoader, ImageData, ImageLoader, ImageSource, ThreadedImageLoader},
        config::Config,
        core::config::{PostFxConfig, RendererConfig},
        foundation::math::{Mat4, Vec2, Vec3, Vec4},
        render::{
            shader_pass, BufferGeometry, DataTexture, Framebuffer, FramebufferOptions, ImageTexture,
            InstancedAttribute, Material, PostFxOutput, PostFxPipeline, PostFxStep, RenderError,
            Renderer, UniformValue,
        },
        scene::{BlendMode, Camera, HitRegion, Node, NodeId, Renderable, Scene, UniformProvider},
    };
}
