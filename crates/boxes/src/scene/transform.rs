//! Local/world transform
//!
//! Translation, Euler rotation (degrees), non-uniform scale and a pivot
//! origin, composed into a local matrix and then into a world matrix with
//! the parent's world matrix.

use crate::foundation::math::{utils, Mat4, Vec3};

/// Node transform with cached matrices
///
/// The matrices are only current right after a transform pass; edit the
/// TRS fields freely in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Pivot that rotation and scale happen around
    pub origin: Vec3,
    /// Offset from the parent
    pub translation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
    /// Euler angles in degrees (X, then Y, then Z)
    pub rotation: Vec3,
    local_matrix: Mat4,
    world_matrix: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            origin: Vec3::zeros(),
            translation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            rotation: Vec3::zeros(),
            local_matrix: Mat4::identity(),
            world_matrix: Mat4::identity(),
        }
    }
}

impl Transform {
    /// Identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform with only a translation
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Matrix from the last [`update_local_matrix`](Self::update_local_matrix)
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    /// Matrix from the last [`update_world_matrix`](Self::update_world_matrix)
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Recompose the local matrix from the TRS fields
    pub fn update_local_matrix(&mut self) -> &Mat4 {
        let rotation = utils::quat_from_euler_degrees(&self.rotation);
        self.local_matrix = utils::from_rotation_translation_scale_origin(
            &rotation,
            &self.translation,
            &self.scale,
            &self.origin,
        );
        &self.local_matrix
    }

    /// `parent * local`, or just `local` at the top of a hierarchy
    pub fn update_world_matrix(&mut self, parent_world_matrix: Option<&Mat4>) {
        self.world_matrix = match parent_world_matrix {
            Some(parent) => parent * self.local_matrix,
            None => self.local_matrix,
        };
    }

    /// Local then world update
    pub fn update_matrices(&mut self, parent_world_matrix: Option<&Mat4>) {
        self.update_local_matrix();
        self.update_world_matrix(parent_world_matrix);
    }

    /// Adopt a world matrix directly, for nodes without their own TRS
    pub(crate) fn inherit_world_matrix(&mut self, world_matrix: &Mat4) {
        self.world_matrix = *world_matrix;
    }
}
