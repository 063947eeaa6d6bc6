//! Cameras
//!
//! A camera is a node payload. Its view matrix is the inverse of the node's
//! world matrix, refreshed by the scene right before the queue executes.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Mat4};

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Perspective frustum, `fov` is the vertical field of view in degrees
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Width over height
        aspect: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Axis-aligned box
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Top plane
        top: f32,
        /// Bottom plane
        bottom: f32,
        /// Near plane
        near: f32,
        /// Far plane
        far: f32,
    },
}

impl Projection {
    fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective { fov, aspect, near, far } => {
                Mat4::new_perspective(aspect, utils::deg_to_rad(fov), near, far)
            }
            Self::Orthographic { left, right, top, bottom, near, far } => {
                Mat4::new_orthographic(left, right, bottom, top, near, far)
            }
        }
    }
}

/// View and projection source for a scene
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection: Projection,
    projection_matrix: Mat4,
    view_matrix: Mat4,
}

impl Camera {
    /// Perspective camera
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::from_projection(Projection::Perspective { fov, aspect, near, far })
    }

    /// Orthographic camera
    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self::from_projection(Projection::Orthographic { left, right, top, bottom, near, far })
    }

    /// Camera with an explicit projection
    pub fn from_projection(projection: Projection) -> Self {
        Self {
            projection,
            projection_matrix: projection.matrix(),
            view_matrix: Mat4::identity(),
        }
    }

    /// Projection parameters
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Replace the projection parameters
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection_matrix();
    }

    /// Width over height
    ///
    /// Orthographic cameras derive it from their planes.
    pub fn aspect(&self) -> f32 {
        match self.projection {
            Projection::Perspective { aspect, .. } => aspect,
            Projection::Orthographic { left, right, top, bottom, .. } => {
                (right - left).abs() / (top - bottom).abs()
            }
        }
    }

    /// Change the aspect ratio of a perspective camera
    ///
    /// Orthographic cameras keep their planes; change those instead.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = new_aspect;
            self.update_projection_matrix();
        }
    }

    /// Recompute the projection matrix from the parameters
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self.projection.matrix();
    }

    /// Set the view matrix to the inverse of `world_matrix`
    pub fn update_view_matrix(&mut self, world_matrix: &Mat4) {
        self.view_matrix = world_matrix.try_inverse().unwrap_or_else(Mat4::identity);
    }

    /// Current projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// Current view matrix
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(90.0, 1.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_ortho_aspect_from_planes() {
        let camera = Camera::orthographic(-2.0, 2.0, 1.0, -1.0, -100.0, 100.0);
        assert_relative_eq!(camera.aspect(), 2.0);
    }

    #[test]
    fn test_view_is_inverse_world() {
        let mut camera = Camera::default();
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
        camera.update_view_matrix(&world);
        assert_relative_eq!(camera.view_matrix() * world, Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_set_aspect_rebuilds_projection() {
        let mut camera = Camera::default();
        let before = *camera.projection_matrix();
        camera.set_aspect(2.0);
        assert_relative_eq!(camera.projection_matrix()[(0, 0)], before[(0, 0)] / 2.0, epsilon = 1e-6);
        assert_relative_eq!(camera.projection_matrix()[(1, 1)], before[(1, 1)], epsilon = 1e-6);
    }

    #[test]
    fn test_perspective_fov_in_degrees() {
        let camera = Camera::default();
        // fov 90 => cot(45) = 1
        assert_relative_eq!(camera.projection_matrix()[(1, 1)], 1.0, epsilon = 1e-6);
    }
}
