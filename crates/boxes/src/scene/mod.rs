//! Scene graph
//!
//! Nodes live in a [`Scene`] arena and are addressed by [`NodeId`]. A frame
//! is rendered in two passes: transforms every frame, then a cached queue
//! of [`RenderTask`]s that is rebuilt only after structural changes.

pub mod camera;
pub mod hit_region;
pub mod node;
pub mod render_queue;
pub mod renderable;
pub mod scene_graph;
pub mod transform;
pub mod uniform_provider;

#[cfg(test)]
mod tests;

pub use camera::{Camera, Projection};
pub use hit_region::{point_in_polygon, HitRegion, HitShape};
pub use node::{Node, NodeHook, NodeId, NodeKind};
pub use render_queue::{RenderTask, TaskAction};
pub use renderable::{BlendMode, Renderable};
pub use scene_graph::Scene;
pub use transform::Transform;
pub use uniform_provider::UniformProvider;
