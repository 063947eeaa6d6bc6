//! Scene graph
//!
//! The [`Scene`] owns every node in a slot-map arena and renders in two
//! passes. The transform pass walks the tree every frame. The queue pass
//! flattens the tree into sorted [`RenderTask`]s and is cached until a
//! structural change (append, remove, visibility, mask, order or layer)
//! invalidates it.
//!
//! Mask subtrees are ordinary arena nodes that are not attached to the
//! tree; their root is referenced by the owning renderable and transformed
//! with the owner's world matrix as parent.

use std::rc::Rc;

use log::{debug, warn};
use slotmap::SlotMap;

use crate::foundation::math::{Mat4, Vec2};
use crate::render::RenderContext;

use super::camera::Camera;
use super::node::{Node, NodeHook, NodeId, NodeKind};
use super::render_queue::{self, RenderTask, TaskAction};

/// Retained scene: node arena, active camera and cached render queue
#[derive(Debug)]
pub struct Scene {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    active_camera: Option<NodeId>,
    active_layer: Option<u32>,
    render_queue: Rc<[RenderTask]>,
    should_rebuild: bool,
    queue_generation: u64,
    warned_no_camera: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene with an identity root group
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::group().with_name("root"));

        Self {
            nodes,
            root,
            active_camera: None,
            active_layer: None,
            render_queue: Rc::from(Vec::new()),
            should_rebuild: true,
            queue_generation: 0,
            warned_no_camera: false,
        }
    }

    /// The root node every attached node descends from
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena only holds the root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutably borrow a node
    ///
    /// Transform and payload edits are picked up on the next frame. Edits
    /// that change what gets drawn go through the `Scene` setters so the
    /// queue is rebuilt.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Every node in the arena
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Children of `id` in draw order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |node| node.children.as_slice())
    }

    /// Parent of `id`, if attached
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Store a detached node
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Store a node and append it under `parent`
    pub fn add(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.nodes.insert(node);
        self.append(parent, id);
        id
    }

    /// Make `child` the last child of `parent`
    ///
    /// A child already under `parent` is left alone. A child under another
    /// parent is detached from it first. Appends that would create a cycle
    /// are refused with a warning.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            warn!("Cannot append {:?} to {:?}: unknown node", child, parent);
            return;
        }
        if child == self.root || self.is_ancestor_or_self(child, parent) {
            warn!("Cannot append {:?} to {:?}: would create a cycle", child, parent);
            return;
        }
        if self.nodes[parent].children.contains(&child) {
            return;
        }

        if let Some(old_parent) = self.nodes[child].parent {
            self.remove(old_parent, child);
        }

        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        self.invalidate(parent);
    }

    /// Detach `child` from `parent`; a no-op if it is not a child
    pub fn remove(&mut self, parent: NodeId, child: NodeId) {
        let Some(node) = self.nodes.get_mut(parent) else {
            return;
        };
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return;
        };

        node.children.remove(index);
        if let Some(child) = self.nodes.get_mut(child) {
            child.parent = None;
        }
        self.invalidate(parent);
    }

    /// Detach `id` from whatever parent it has
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.remove(parent, id);
        }
    }

    /// Remove `id`, its descendants and their mask subtrees from the arena
    ///
    /// The nodes are handed back so their GPU resources can be released.
    pub fn destroy_subtree(&mut self, id: NodeId) -> Vec<Node> {
        if id == self.root {
            warn!("Cannot destroy the scene root");
            return Vec::new();
        }
        self.invalidate(id);
        self.detach(id);

        let mut removed = Vec::new();
        let mut removed_ids = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(node) = self.nodes.remove(next) else {
                continue;
            };
            pending.extend(node.children.iter().copied());
            if let Some(mask) = node.as_renderable().and_then(|r| r.mask) {
                pending.push(mask);
            }
            if self.active_camera == Some(next) {
                self.active_camera = None;
            }
            removed_ids.push(next);
            removed.push(node);
        }

        for node in self.nodes.values_mut() {
            if let NodeKind::Renderable(renderable) = &mut node.kind {
                if renderable.mask.is_some_and(|mask| removed_ids.contains(&mask)) {
                    renderable.mask = None;
                    self.should_rebuild = true;
                }
            }
        }

        removed
    }

    /// Exclude `id` and its subtree from both passes
    pub fn hide(&mut self, id: NodeId) {
        self.set_visible(id, false);
    }

    /// Include `id` again
    pub fn unhide(&mut self, id: NodeId) {
        self.set_visible(id, true);
    }

    fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.visible = visible;
            self.invalidate(id);
        }
    }

    /// Draw `renderable` only where the subtree rooted at `mask` draws
    ///
    /// The mask root is detached from the tree; it is transformed relative to
    /// the renderable. Passing `None` removes the mask.
    pub fn set_mask(&mut self, renderable: NodeId, mask: Option<NodeId>) {
        if self.nodes.get(renderable).and_then(Node::as_renderable).is_none() {
            warn!("Cannot set a mask on {:?}: not a renderable", renderable);
            return;
        }
        if let Some(mask) = mask {
            if !self.nodes.contains_key(mask) || mask == self.root {
                warn!("Cannot use {:?} as a mask", mask);
                return;
            }
            if self.is_ancestor_or_self(mask, renderable) {
                warn!("Mask {:?} contains its own renderable {:?}", mask, renderable);
                return;
            }
            self.detach(mask);
        }

        if let Some(target) = self.nodes.get_mut(renderable).and_then(Node::as_renderable_mut) {
            target.mask = mask;
        }
        self.invalidate(renderable);
    }

    /// Change a renderable's sort key
    pub fn set_render_order(&mut self, id: NodeId, order: f32) {
        if let Some(renderable) = self.nodes.get_mut(id).and_then(Node::as_renderable_mut) {
            renderable.render_order = order;
            self.invalidate(id);
        }
    }

    /// Change a node's layer tag
    pub fn set_layer(&mut self, id: NodeId, layer: Option<u32>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.layer = layer;
            self.invalidate(id);
        }
    }

    /// Toggle whether a node only draws as part of a mask
    pub fn set_mask_only(&mut self, id: NodeId, mask_only: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.mask_only = mask_only;
            self.invalidate(id);
        }
    }

    /// Replace a node's before-transform hook
    pub fn set_on_before_transform(&mut self, id: NodeId, hook: Option<NodeHook>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.on_before_transform = hook;
        }
    }

    /// Replace a node's before-render hook
    pub fn set_on_before_render(&mut self, id: NodeId, hook: Option<NodeHook>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.on_before_render = hook;
            self.invalidate(id);
        }
    }

    /// Camera node used for rendering and hit tests
    pub fn set_active_camera(&mut self, camera: Option<NodeId>) {
        self.active_camera = camera;
        self.warned_no_camera = false;
    }

    /// The active camera node
    pub fn active_camera(&self) -> Option<NodeId> {
        self.active_camera
    }

    /// The active camera's payload
    pub fn camera(&self) -> Option<&Camera> {
        self.active_camera
            .and_then(|id| self.nodes.get(id))
            .and_then(Node::as_camera)
    }

    /// Only execute top-level tasks tagged with `layer`; `None` runs all
    pub fn set_active_layer(&mut self, layer: Option<u32>) {
        self.active_layer = layer;
    }

    /// The layer filter
    pub fn active_layer(&self) -> Option<u32> {
        self.active_layer
    }

    /// Whether the next render rebuilds the queue
    pub fn needs_rebuild(&self) -> bool {
        self.should_rebuild
    }

    /// Number of queue rebuilds so far
    pub fn queue_generation(&self) -> u64 {
        self.queue_generation
    }

    /// The cached queue; shared until the next rebuild
    pub fn render_queue(&self) -> Rc<[RenderTask]> {
        Rc::clone(&self.render_queue)
    }

    /// Propagate a structural change upwards
    ///
    /// Marks the queue dirty when the change reaches the root or the root of
    /// a mask subtree.
    pub fn invalidate(&mut self, id: NodeId) {
        let top = self.top_of(id);
        if top == self.root || self.mask_owner(top).is_some() {
            self.should_rebuild = true;
        }
    }

    fn top_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes.get(id).and_then(|node| node.parent) {
            id = parent;
        }
        id
    }

    fn mask_owner(&self, mask_root: NodeId) -> Option<NodeId> {
        self.nodes.iter().find_map(|(id, node)| {
            node.as_renderable()
                .filter(|renderable| renderable.mask == Some(mask_root))
                .map(|_| id)
        })
    }

    /// Whether `ancestor` is `id` or above it, looking through mask owners
    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.parent(node).or_else(|| self.mask_owner(node));
        }
        false
    }

    /// Render one frame
    ///
    /// Runs the transform pass, resolves the camera, rebuilds the queue if
    /// it was invalidated and executes it. Without an active camera nothing
    /// is drawn.
    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.calculate_transforms();

        let Some((view, projection)) = self.resolve_camera() else {
            return;
        };

        self.queue_renderables();

        let queue = Rc::clone(&self.render_queue);
        for task in queue.iter() {
            let admitted = self
                .active_layer
                .map_or(true, |layer| task.layer == Some(layer));
            if admitted {
                self.execute(ctx, task, &view, &projection, false);
            }
        }
    }

    /// Recompute world matrices for every visible node
    pub fn calculate_transforms(&mut self) {
        for node in self.nodes.values_mut() {
            if let NodeKind::HitRegion(region) = &mut node.kind {
                region.detach();
            }
        }

        self.update_transforms(self.root, &Mat4::identity());
    }

    fn update_transforms(&mut self, id: NodeId, parent_world: &Mat4) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if !node.visible {
            return;
        }

        if node.kind.has_transform() {
            node.run_before_transform();
            node.transform.update_matrices(Some(parent_world));
        } else {
            node.transform.inherit_world_matrix(parent_world);
        }
        if let NodeKind::HitRegion(region) = &mut node.kind {
            region.set_world_matrix(parent_world);
        }

        let world = *node.transform.world_matrix();
        let mask = node.as_renderable().and_then(|r| r.mask);

        let mut index = 0;
        while let Some(&child) = self.nodes.get(id).and_then(|node| node.children.get(index)) {
            self.update_transforms(child, &world);
            index += 1;
        }

        if let Some(mask) = mask {
            self.update_transforms(mask, &world);
        }
    }

    fn resolve_camera(&mut self) -> Option<(Mat4, Mat4)> {
        let camera_id = self.active_camera.filter(|&id| {
            self.nodes.get(id).and_then(Node::as_camera).is_some()
        });
        let Some(camera_id) = camera_id else {
            if !self.warned_no_camera {
                warn!("Scene has no active camera, skipping render");
                self.warned_no_camera = true;
            }
            return None;
        };

        self.refresh_unreached(camera_id);
        let node = self.nodes.get_mut(camera_id)?;

        let world = *node.transform.world_matrix();
        let camera = node.as_camera_mut()?;
        camera.update_view_matrix(&world);
        Some((*camera.view_matrix(), *camera.projection_matrix()))
    }

    /// Recompute the world matrix of a node the transform pass skipped
    ///
    /// Applies to nodes outside the root tree and to nodes under a hidden
    /// ancestor. Mask roots continue the chain through their owner. Hooks do not run; only the matrices along the parent chain
    /// are refreshed.
    fn refresh_unreached(&mut self, id: NodeId) {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self
            .nodes
            .get(current)
            .and_then(|node| node.parent)
            .or_else(|| self.mask_owner(current))
        {
            chain.push(parent);
            current = parent;
        }

        let reached = chain.last() == Some(&self.root)
            && chain.iter().all(|&id| self.nodes.get(id).is_some_and(|node| node.visible));
        if reached {
            return;
        }

        let mut world = Mat4::identity();
        for &id in chain.iter().rev() {
            let Some(node) = self.nodes.get_mut(id) else {
                return;
            };
            if node.kind.has_transform() {
                node.transform.update_matrices(Some(&world));
            } else {
                node.transform.inherit_world_matrix(&world);
            }
            world = *node.transform.world_matrix();
        }
    }

    /// Rebuild the render queue if it was invalidated
    pub fn queue_renderables(&mut self) {
        if !self.should_rebuild {
            return;
        }

        let mut tasks = Vec::new();
        let mut providers = Vec::new();
        self.queue_node(self.root, &mut tasks, &mut providers, None, false);
        render_queue::sort_tasks(&mut tasks);

        debug!("Rebuilt render queue with {} top-level tasks", tasks.len());
        self.render_queue = Rc::from(tasks);
        self.should_rebuild = false;
        self.queue_generation += 1;
    }

    fn queue_node(
        &self,
        id: NodeId,
        out: &mut Vec<RenderTask>,
        providers: &mut Vec<NodeId>,
        inherited_layer: Option<u32>,
        queue_masks: bool,
    ) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !node.visible || (node.mask_only && !queue_masks) {
            return;
        }

        let layer = node.layer.or(inherited_layer);
        let mut provides = false;

        match &node.kind {
            NodeKind::Renderable(renderable) => {
                let order = renderable.render_order;
                let path: Rc<[NodeId]> = Rc::from(providers.as_slice());
                match renderable.mask {
                    Some(_) if queue_masks => {
                        warn!("Nested mask on {:?} is not supported, drawing it unmasked", id);
                        out.push(RenderTask::draw(order, layer, id, path));
                    }
                    Some(mask) => {
                        let mut mask_tasks = Vec::new();
                        self.queue_node(mask, &mut mask_tasks, providers, layer, true);
                        render_queue::sort_tasks(&mut mask_tasks);
                        out.push(RenderTask::masked(order, layer, id, path, mask_tasks));
                    }
                    None => out.push(RenderTask::draw(order, layer, id, path)),
                }
            }
            NodeKind::Transform | NodeKind::Camera(_) if node.has_before_render() => {
                out.push(RenderTask::before_render(layer, id));
            }
            NodeKind::UniformProvider(_) => {
                providers.push(id);
                provides = true;
            }
            _ => {}
        }

        for &child in &node.children {
            self.queue_node(child, out, providers, layer, queue_masks);
        }

        if provides {
            providers.pop();
        }
    }

    fn execute(&mut self, ctx: &mut RenderContext, task: &RenderTask, view: &Mat4, projection: &Mat4, writing_mask: bool) {
        match &task.action {
            Some(TaskAction::Draw { node, providers }) => {
                self.draw_node(ctx, *node, providers, view, projection, writing_mask);
            }
            Some(TaskAction::BeforeRender { node }) => {
                if let Some(node) = self.nodes.get_mut(*node) {
                    node.run_before_render();
                }
            }
            Some(TaskAction::MaskWrite) => render_queue::begin_mask_write(ctx.gpu.as_mut()),
            Some(TaskAction::MaskTest { node, providers }) => {
                render_queue::begin_mask_test(ctx.gpu.as_mut());
                self.draw_node(ctx, *node, providers, view, projection, false);
                render_queue::end_mask(ctx.gpu.as_mut());
            }
            None => {}
        }

        // Siblings after a MaskWrite and before the MaskTest make up the mask
        let mut writing_mask = writing_mask;
        for subtask in &task.subtasks {
            match subtask.action {
                Some(TaskAction::MaskWrite) => writing_mask = true,
                Some(TaskAction::MaskTest { .. }) => writing_mask = false,
                _ => {}
            }
            self.execute(ctx, subtask, view, projection, writing_mask);
        }
    }

    fn draw_node(
        &mut self,
        ctx: &mut RenderContext,
        id: NodeId,
        providers: &[NodeId],
        view: &Mat4,
        projection: &Mat4,
        writing_mask: bool,
    ) {
        let Some(renderable) = self.nodes.get(id).and_then(Node::as_renderable) else {
            return;
        };
        {
            let mut material = renderable.material.borrow_mut();
            for provider in providers {
                if let Some(provider) = self.nodes.get(*provider).and_then(Node::as_uniform_provider) {
                    provider.apply_to(&mut material);
                }
            }
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.run_before_render();

        if let Some(renderable) = node.as_renderable() {
            let world = node.transform.world_matrix();
            if writing_mask {
                renderable.render_mask(ctx, world, view, projection);
            } else {
                renderable.render(ctx, world, view, projection);
            }
        }
    }

    /// Score `coords` (NDC) against one hit region using the active camera
    pub fn hit_test(&self, id: NodeId, coords: Vec2) -> f32 {
        let (Some(camera), Some(region)) = (self.camera(), self.nodes.get(id).and_then(Node::as_hit_region)) else {
            return 0.0;
        };
        region.test(camera, coords)
    }

    /// The hit region scoring highest at `coords`, if any scores above zero
    ///
    /// Only regions reached by the last transform pass are considered.
    pub fn pick(&self, coords: Vec2) -> Option<(NodeId, f32)> {
        let camera = self.camera()?;
        self.nodes
            .iter()
            .filter_map(|(id, node)| {
                let region = node.as_hit_region().filter(|region| region.is_attached())?;
                let score = region.test(camera, coords);
                (score > 0.0).then_some((id, score))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}
