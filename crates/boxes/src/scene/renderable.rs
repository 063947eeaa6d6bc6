//! Drawable scene payload

use serde::{Deserialize, Serialize};

use crate::foundation::math::Mat4;
use crate::render::backend::{BlendFactor, Capability, CullFace};
use crate::render::{RenderContext, SharedGeometry, SharedMaterial, UniformValue};

use super::node::NodeId;

/// How a renderable's fragments combine with the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// Source-alpha blending
    #[default]
    Normal,
    /// Source added onto destination
    Additive,
}

/// Geometry drawn with a material plus the per-draw GPU state
#[derive(Debug)]
pub struct Renderable {
    /// Vertex data
    pub geometry: SharedGeometry,
    /// Shader program and uniforms
    pub material: SharedMaterial,
    /// Test fragments against the depth buffer
    pub depth_test: bool,
    /// Write fragments to the depth buffer
    pub depth_write: bool,
    /// Cull front faces instead of back faces
    pub flip_faces: bool,
    /// Blend equation
    pub blending: BlendMode,
    pub(crate) render_order: f32,
    pub(crate) mask: Option<NodeId>,
}

impl Renderable {
    /// Pair a geometry with a material
    ///
    /// The model, view and projection uniforms are seeded with identity so
    /// they can be updated in place on every draw.
    pub fn new(geometry: SharedGeometry, material: SharedMaterial) -> Self {
        {
            let mut material = material.borrow_mut();
            for name in ["u_mModel", "u_mView", "u_mProjection"] {
                if material.get_uniform(name).is_none() {
                    material.set_uniform(name, Mat4::identity());
                }
            }
        }

        Self {
            geometry,
            material,
            depth_test: true,
            depth_write: true,
            flip_faces: false,
            blending: BlendMode::Normal,
            render_order: 0.0,
            mask: None,
        }
    }

    /// Sort key within the render queue
    pub fn with_render_order(mut self, render_order: f32) -> Self {
        self.render_order = render_order;
        self
    }

    /// Enable or disable depth testing
    pub fn with_depth_test(mut self, depth_test: bool) -> Self {
        self.depth_test = depth_test;
        self
    }

    /// Enable or disable depth writes
    pub fn with_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }

    /// Cull front faces
    pub fn with_flip_faces(mut self, flip_faces: bool) -> Self {
        self.flip_faces = flip_faces;
        self
    }

    /// Set the blend mode
    pub fn with_blending(mut self, blending: BlendMode) -> Self {
        self.blending = blending;
        self
    }

    /// Sort key within the render queue
    pub fn render_order(&self) -> f32 {
        self.render_order
    }

    /// Root of the stencil mask subtree, if any
    pub fn mask(&self) -> Option<NodeId> {
        self.mask
    }

    /// Draw with the given matrices
    ///
    /// Skips the draw while the material is not ready. Only the depth,
    /// culling and blend state this renderable changed is reset afterwards,
    /// so state set up by the caller survives consecutive draws.
    pub fn render(&self, ctx: &mut RenderContext, world: &Mat4, view: &Mat4, projection: &Mat4) {
        self.draw(ctx, world, view, projection, true);
    }

    /// Draw into the stencil while color and depth writes are off
    ///
    /// Leaves the depth mask alone so every draw of a mask stays write-free.
    pub(crate) fn render_mask(&self, ctx: &mut RenderContext, world: &Mat4, view: &Mat4, projection: &Mat4) {
        self.draw(ctx, world, view, projection, false);
    }

    fn draw(&self, ctx: &mut RenderContext, world: &Mat4, view: &Mat4, projection: &Mat4, depth_writes: bool) {
        let mut material = self.material.borrow_mut();
        for (name, matrix) in [("u_mModel", world), ("u_mView", view), ("u_mProjection", projection)] {
            material.update_uniform(name, |value| value.assign(&UniformValue::Mat4(*matrix)));
        }
        let toggle_depth_write = depth_writes && !self.depth_write;

        {
            let gpu = ctx.gpu.as_mut();
            if !self.depth_test {
                gpu.disable(Capability::DepthTest);
            }
            if toggle_depth_write {
                gpu.depth_mask(false);
            }
            if self.flip_faces {
                gpu.cull_face(CullFace::Front);
            }
            match self.blending {
                BlendMode::Additive => gpu.blend_func(BlendFactor::One, BlendFactor::One),
                BlendMode::Normal => gpu.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            }
        }

        if material.use_program(ctx) {
            self.geometry.borrow_mut().draw(ctx, &mut material);
        }

        let gpu = ctx.gpu.as_mut();
        if !self.depth_test {
            gpu.enable(Capability::DepthTest);
        }
        if toggle_depth_write {
            gpu.depth_mask(true);
        }
        if self.flip_faces {
            gpu.cull_face(CullFace::Back);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BufferGeometry, CallLog, GpuCall, Material, RecordingBackend};

    fn context() -> (RenderContext, CallLog) {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        (RenderContext::new(Box::new(gpu), 32, 32), log)
    }

    fn quad() -> Renderable {
        Renderable::new(
            BufferGeometry::new(vec![0.0; 9]).into_shared(),
            Material::default().into_shared(),
        )
    }

    #[test]
    fn test_matrices_seeded_with_identity() {
        let renderable = quad();
        let material = renderable.material.borrow();
        for name in ["u_mModel", "u_mView", "u_mProjection"] {
            assert!(matches!(material.get_uniform(name), Some(UniformValue::Mat4(m)) if *m == Mat4::identity()));
        }
    }

    #[test]
    fn test_state_is_restored_after_draw() {
        let (mut ctx, log) = context();
        let renderable = quad()
            .with_depth_test(false)
            .with_depth_write(false)
            .with_flip_faces(true)
            .with_blending(BlendMode::Additive);

        renderable.render(&mut ctx, &Mat4::identity(), &Mat4::identity(), &Mat4::identity());

        let calls = log.snapshot();
        let draw = calls.iter().position(GpuCall::is_draw).unwrap();
        let before = &calls[..draw];
        let after = &calls[draw..];

        assert!(before.contains(&GpuCall::Disable(Capability::DepthTest)));
        assert!(before.contains(&GpuCall::DepthMask(false)));
        assert!(before.contains(&GpuCall::CullFace(CullFace::Front)));
        assert!(before.contains(&GpuCall::BlendFunc(BlendFactor::One, BlendFactor::One)));
        assert!(after.contains(&GpuCall::Enable(Capability::DepthTest)));
        assert!(after.contains(&GpuCall::DepthMask(true)));
        assert!(after.contains(&GpuCall::CullFace(CullFace::Back)));
    }

    #[test]
    fn test_model_matrix_uploaded() {
        let (mut ctx, log) = context();
        let renderable = quad();
        let world = Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 2.0, 3.0));

        renderable.render(&mut ctx, &world, &Mat4::identity(), &Mat4::identity());

        let uploaded = log.calls().iter().any(|call| {
            matches!(call, GpuCall::UniformMatrix { data, .. } if data.as_slice() == world.as_slice())
        });
        assert!(uploaded);
    }

    #[test]
    fn test_deferred_material_skips_draw() {
        let (mut ctx, log) = context();
        let renderable = Renderable::new(
            BufferGeometry::new(vec![0.0; 9]).into_shared(),
            Material::default().with_deferred_compilation(true).into_shared(),
        );

        renderable.render(&mut ctx, &Mat4::identity(), &Mat4::identity(), &Mat4::identity());
        assert_eq!(log.draw_count(), 0);

        ctx.run_deferred(1);
        renderable.render(&mut ctx, &Mat4::identity(), &Mat4::identity(), &Mat4::identity());
        assert_eq!(log.draw_count(), 1);
    }

    #[test]
    fn test_default_state_is_left_untouched() {
        let (mut ctx, log) = context();
        quad().render(&mut ctx, &Mat4::identity(), &Mat4::identity(), &Mat4::identity());

        let touched = log.count(|c| {
            matches!(c, GpuCall::DepthMask(_) | GpuCall::Enable(_) | GpuCall::Disable(_) | GpuCall::CullFace(_))
        });
        assert_eq!(touched, 0);
    }

    #[test]
    fn test_mask_draw_never_enables_depth_writes() {
        let (mut ctx, log) = context();
        let renderable = quad().with_depth_write(false);

        renderable.render_mask(&mut ctx, &Mat4::identity(), &Mat4::identity(), &Mat4::identity());

        assert_eq!(log.draw_count(), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DepthMask(_))), 0);
    }
}
