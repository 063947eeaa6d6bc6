//! Picking regions
//!
//! A hit region is projected through the active camera and tested against a
//! point in normalized device coordinates. The scene stamps each region's
//! world matrix during the transform pass; a region that was not reached by
//! the last pass is considered detached.

use crate::foundation::math::{Mat4, Vec2, Vec4};

use super::camera::Camera;

/// Region geometry
#[derive(Debug, Clone, PartialEq)]
pub enum HitShape {
    /// Sphere around the node's origin
    Sphere {
        /// World-space radius
        radius: f32,
    },
    /// Closed ring in the node's XY plane
    Polygon {
        /// Ring vertices in local space
        verts: Vec<Vec2>,
    },
}

/// Pickable area attached to a node
#[derive(Debug, Clone, PartialEq)]
pub struct HitRegion {
    /// Region geometry
    pub shape: HitShape,
    world_matrix: Mat4,
    attached: bool,
}

impl HitRegion {
    /// Sphere region
    pub fn sphere(radius: f32) -> Self {
        Self::from_shape(HitShape::Sphere { radius })
    }

    /// Polygon region from flat `[x0, y0, x1, y1, ...]` coordinates
    ///
    /// A trailing odd coordinate is ignored.
    pub fn polygon(coords: &[f32]) -> Self {
        let verts = coords.chunks_exact(2).map(|c| Vec2::new(c[0], c[1])).collect();
        Self::from_shape(HitShape::Polygon { verts })
    }

    fn from_shape(shape: HitShape) -> Self {
        Self {
            shape,
            world_matrix: Mat4::identity(),
            attached: false,
        }
    }

    /// World matrix from the last transform pass
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Whether the last transform pass reached this region
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn set_world_matrix(&mut self, world_matrix: &Mat4) {
        self.world_matrix = *world_matrix;
        self.attached = true;
    }

    pub(crate) fn detach(&mut self) {
        self.attached = false;
    }

    /// Score `coords` (NDC) against this region
    ///
    /// Spheres return `1` at the projected center falling to `0` at the
    /// projected radius. Polygons return `1` inside and `0` outside, and
    /// always miss while detached.
    pub fn test(&self, camera: &Camera, coords: Vec2) -> f32 {
        match &self.shape {
            HitShape::Sphere { radius } => self.test_sphere(camera, coords, *radius),
            HitShape::Polygon { verts } => {
                if !self.attached {
                    return 0.0;
                }
                let ring = self.project_polygon(camera, verts);
                if point_in_polygon(coords, &ring) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn test_sphere(&self, camera: &Camera, coords: Vec2, radius: f32) -> f32 {
        let clip = camera.projection_matrix()
            * camera.view_matrix()
            * self.world_matrix
            * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let aspect = camera.aspect();

        let projected = Vec2::new(clip.x / clip.w * aspect, clip.y / clip.w);
        let pointer = Vec2::new(coords.x * aspect, coords.y);

        let max_distance = radius / clip.w * camera.projection_matrix()[(1, 1)];
        let distance = (pointer - projected).norm();

        if distance < max_distance {
            1.0 - distance / max_distance
        } else {
            0.0
        }
    }

    fn project_polygon(&self, camera: &Camera, verts: &[Vec2]) -> Vec<Vec2> {
        let matrix = camera.projection_matrix() * camera.view_matrix() * self.world_matrix;
        verts
            .iter()
            .map(|v| {
                let clip = matrix * Vec4::new(v.x, v.y, 0.0, 1.0);
                Vec2::new(clip.x / clip.w, clip.y / clip.w)
            })
            .collect()
    }
}

impl Default for HitRegion {
    fn default() -> Self {
        Self::polygon(&[-0.5, -0.5, -0.5, 0.5, 0.5, 0.5, 0.5, -0.5])
    }
}

/// Even-odd ray casting test
///
/// Points exactly on an edge or corner may land on either side.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    let Some(last) = polygon.len().checked_sub(1) else {
        return false;
    };

    let mut j = last;
    for (i, p0) in polygon.iter().enumerate() {
        let p1 = polygon[j];
        let crosses = (p0.y > point.y) != (p1.y > point.y)
            && point.x < (p1.x - p0.x) * (point.y - p0.y) / (p1.y - p0.y) + p0.x;
        if crosses {
            inside = !inside;
        }
        j = i;
    }

    inside
}
