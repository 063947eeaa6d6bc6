//! Scene nodes
//!
//! Every participant in the tree is a [`Node`]: shared hierarchy, visibility
//! and transform fields plus a [`NodeKind`] payload saying what the node
//! contributes during traversal.

use std::fmt;

use slotmap::new_key_type;

use crate::foundation::math::Vec3;

use super::camera::Camera;
use super::hit_region::HitRegion;
use super::renderable::Renderable;
use super::transform::Transform;
use super::uniform_provider::UniformProvider;

new_key_type! {
    /// Handle of a node inside a [`Scene`](super::Scene)
    pub struct NodeId;
}

/// Per-node callback run during traversal
pub type NodeHook = Box<dyn FnMut(&mut Node)>;

/// What a node contributes to the frame
#[derive(Debug)]
pub enum NodeKind {
    /// Structural grouping only; children inherit the parent's world matrix
    Group,
    /// Transform without drawing
    Transform,
    /// Drawable geometry and material
    Renderable(Renderable),
    /// Viewpoint producing view and projection matrices
    Camera(Camera),
    /// Uniform values applied to every renderable below it
    UniformProvider(UniformProvider),
    /// Picking region resolved each transform pass
    HitRegion(HitRegion),
}

impl NodeKind {
    /// Whether the node owns a local transform
    pub fn has_transform(&self) -> bool {
        matches!(self, Self::Transform | Self::Renderable(_) | Self::Camera(_))
    }
}

/// A node in the scene tree
pub struct Node {
    /// Optional debug name
    pub name: Option<String>,
    pub(crate) visible: bool,
    pub(crate) mask_only: bool,
    pub(crate) layer: Option<u32>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Local TRS and the matrices from the last transform pass
    pub transform: Transform,
    /// Node payload
    pub kind: NodeKind,
    pub(crate) on_before_transform: Option<NodeHook>,
    pub(crate) on_before_render: Option<NodeHook>,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            name: None,
            visible: true,
            mask_only: false,
            layer: None,
            parent: None,
            children: Vec::new(),
            transform: Transform::default(),
            kind,
            on_before_transform: None,
            on_before_render: None,
        }
    }

    /// Plain grouping node
    pub fn group() -> Self {
        Self::with_kind(NodeKind::Group)
    }

    /// Transform-only node
    pub fn transform_node() -> Self {
        Self::with_kind(NodeKind::Transform)
    }

    /// Drawable node
    pub fn renderable(renderable: Renderable) -> Self {
        Self::with_kind(NodeKind::Renderable(renderable))
    }

    /// Camera node
    pub fn camera(camera: Camera) -> Self {
        Self::with_kind(NodeKind::Camera(camera))
    }

    /// Uniform provider node
    pub fn uniform_provider(provider: UniformProvider) -> Self {
        Self::with_kind(NodeKind::UniformProvider(provider))
    }

    /// Hit region node
    pub fn hit_region(region: HitRegion) -> Self {
        Self::with_kind(NodeKind::HitRegion(region))
    }

    /// Set a debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the local translation
    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.transform.translation = translation;
        self
    }

    /// Set the local rotation in degrees
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.transform.rotation = rotation;
        self
    }

    /// Set the local scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    /// Set the rotation and scale pivot
    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.transform.origin = origin;
        self
    }

    /// Tag this node and, unless overridden, its descendants with a layer
    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Only draw this node while it is part of a mask
    pub fn mask_only(mut self) -> Self {
        self.mask_only = true;
        self
    }

    /// Start hidden
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Run `hook` right before this node's matrices are recomputed
    pub fn with_on_before_transform(mut self, hook: impl FnMut(&mut Node) + 'static) -> Self {
        self.on_before_transform = Some(Box::new(hook));
        self
    }

    /// Run `hook` right before this node draws
    pub fn with_on_before_render(mut self, hook: impl FnMut(&mut Node) + 'static) -> Self {
        self.on_before_render = Some(Box::new(hook));
        self
    }

    /// Whether the node takes part in traversal
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the node only draws inside a mask
    pub fn is_mask_only(&self) -> bool {
        self.mask_only
    }

    /// The node's own layer tag
    pub fn layer(&self) -> Option<u32> {
        self.layer
    }

    /// Parent, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in draw order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Renderable payload
    pub fn as_renderable(&self) -> Option<&Renderable> {
        match &self.kind {
            NodeKind::Renderable(renderable) => Some(renderable),
            _ => None,
        }
    }

    /// Mutable renderable payload
    pub fn as_renderable_mut(&mut self) -> Option<&mut Renderable> {
        match &mut self.kind {
            NodeKind::Renderable(renderable) => Some(renderable),
            _ => None,
        }
    }

    /// Camera payload
    pub fn as_camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Mutable camera payload
    pub fn as_camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Uniform provider payload
    pub fn as_uniform_provider(&self) -> Option<&UniformProvider> {
        match &self.kind {
            NodeKind::UniformProvider(provider) => Some(provider),
            _ => None,
        }
    }

    /// Mutable uniform provider payload
    pub fn as_uniform_provider_mut(&mut self) -> Option<&mut UniformProvider> {
        match &mut self.kind {
            NodeKind::UniformProvider(provider) => Some(provider),
            _ => None,
        }
    }

    /// Hit region payload
    pub fn as_hit_region(&self) -> Option<&HitRegion> {
        match &self.kind {
            NodeKind::HitRegion(region) => Some(region),
            _ => None,
        }
    }

    pub(crate) fn has_before_render(&self) -> bool {
        self.on_before_render.is_some()
    }

    pub(crate) fn run_before_transform(&mut self) {
        if let Some(mut hook) = self.on_before_transform.take() {
            hook(self);
            self.on_before_transform.get_or_insert(hook);
        }
    }

    pub(crate) fn run_before_render(&mut self) {
        if let Some(mut hook) = self.on_before_render.take() {
            hook(self);
            self.on_before_render.get_or_insert(hook);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("visible", &self.visible)
            .field("mask_only", &self.mask_only)
            .field("layer", &self.layer)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_hooks_survive_being_called() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let mut node = Node::transform_node().with_on_before_transform(move |node| {
            seen.set(seen.get() + 1);
            node.transform.translation.x += 1.0;
        });

        node.run_before_transform();
        node.run_before_transform();

        assert_eq!(calls.get(), 2);
        assert_eq!(node.transform.translation.x, 2.0);
        assert!(node.on_before_transform.is_some());
    }

    #[test]
    fn test_only_spatial_kinds_own_transforms() {
        assert!(Node::transform_node().kind.has_transform());
        assert!(Node::camera(Camera::default()).kind.has_transform());
        assert!(!Node::group().kind.has_transform());
        assert!(!Node::uniform_provider(UniformProvider::default()).kind.has_transform());
        assert!(!Node::hit_region(HitRegion::default()).kind.has_transform());
    }
}
