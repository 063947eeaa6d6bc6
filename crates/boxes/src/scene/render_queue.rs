//! Render tasks
//!
//! The queue is a flat list of [`RenderTask`]s sorted by `order`. A masked
//! renderable becomes one composite task whose three subtasks bracket the
//! mask draws with stencil setup and the masked draw itself:
//!
//! ```text
//! [ MaskWrite (-inf) | mask group (0): mask draws... | MaskTest (+inf) ]
//! ```
//!
//! Subtasks run in stored order after the composite's own action and are
//! never re-sorted against the outer queue.

use std::rc::Rc;

use crate::render::backend::{Capability, ClearFlags, GpuBackend, StencilFunc, StencilOp};

use super::node::NodeId;

/// Work performed by a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    /// Apply providers, run the node's before-render hook, then draw it
    Draw {
        /// Renderable node
        node: NodeId,
        /// Uniform providers on the path from the root, outermost first
        providers: Rc<[NodeId]>,
    },
    /// Run a non-drawing node's before-render hook
    BeforeRender {
        /// Hook owner
        node: NodeId,
    },
    /// Clear stencil and start writing the mask silhouette
    MaskWrite,
    /// Switch stencil to test, draw the masked node and stop testing
    MaskTest {
        /// Masked renderable node
        node: NodeId,
        /// Uniform providers on the path from the root, outermost first
        providers: Rc<[NodeId]>,
    },
}

/// Entry in a scene's render queue
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTask {
    /// Sort key, ascending
    pub order: f32,
    /// Layer tag checked against the scene's active layer
    pub layer: Option<u32>,
    /// Work done before the subtasks
    pub action: Option<TaskAction>,
    /// Nested tasks in execution order
    pub subtasks: Vec<RenderTask>,
}

impl RenderTask {
    pub(crate) fn draw(order: f32, layer: Option<u32>, node: NodeId, providers: Rc<[NodeId]>) -> Self {
        Self {
            order,
            layer,
            action: Some(TaskAction::Draw { node, providers }),
            subtasks: Vec::new(),
        }
    }

    pub(crate) fn before_render(layer: Option<u32>, node: NodeId) -> Self {
        Self {
            order: 0.0,
            layer,
            action: Some(TaskAction::BeforeRender { node }),
            subtasks: Vec::new(),
        }
    }

    /// Composite for a masked renderable; `mask_tasks` must already be sorted
    pub(crate) fn masked(
        order: f32,
        layer: Option<u32>,
        node: NodeId,
        providers: Rc<[NodeId]>,
        mask_tasks: Vec<RenderTask>,
    ) -> Self {
        let write = Self {
            order: f32::NEG_INFINITY,
            layer,
            action: Some(TaskAction::MaskWrite),
            subtasks: Vec::new(),
        };
        let mask = Self {
            order: 0.0,
            layer,
            action: None,
            subtasks: mask_tasks,
        };
        let test = Self {
            order: f32::INFINITY,
            layer,
            action: Some(TaskAction::MaskTest { node, providers }),
            subtasks: Vec::new(),
        };

        Self {
            order,
            layer,
            action: None,
            subtasks: vec![write, mask, test],
        }
    }

    /// Actions in execution order, depth first
    pub fn flatten(&self) -> Vec<&TaskAction> {
        let mut actions = Vec::new();
        self.collect_actions(&mut actions);
        actions
    }

    fn collect_actions<'a>(&'a self, actions: &mut Vec<&'a TaskAction>) {
        if let Some(action) = &self.action {
            actions.push(action);
        }
        for subtask in &self.subtasks {
            subtask.collect_actions(actions);
        }
    }
}

/// Stable ascending sort by `order`
pub(crate) fn sort_tasks(tasks: &mut [RenderTask]) {
    tasks.sort_by(|a, b| a.order.total_cmp(&b.order));
}

/// Write 1 into the stencil wherever the mask draws, without touching color or depth
pub(crate) fn begin_mask_write(gpu: &mut dyn GpuBackend) {
    gpu.clear(ClearFlags::STENCIL);
    gpu.enable(Capability::StencilTest);
    gpu.stencil_func(StencilFunc::Always, 1, 0xff);
    gpu.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace);
    gpu.stencil_mask(0xff);
    gpu.color_mask(false, false, false, false);
    gpu.depth_mask(false);
}

/// Only pass fragments where the mask wrote, with color and depth writes back on
pub(crate) fn begin_mask_test(gpu: &mut dyn GpuBackend) {
    gpu.stencil_func(StencilFunc::Equal, 1, 0xff);
    gpu.stencil_mask(0x00);
    gpu.color_mask(true, true, true, true);
    gpu.depth_mask(true);
}

pub(crate) fn end_mask(gpu: &mut dyn GpuBackend) {
    gpu.disable(Capability::StencilTest);
}
