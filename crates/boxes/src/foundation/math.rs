//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the few compositions the scene graph needs
//! (TRS-around-origin, degree Euler angles, homogeneous projection).

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix2, Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 2x2 matrix type
pub type Mat2 = Matrix2<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Mat4, Quat, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }

    /// Build a rotation from Euler angles given in degrees
    ///
    /// Rotation is applied around X, then Y, then Z.
    pub fn quat_from_euler_degrees(euler: &Vec3) -> Quat {
        Quat::from_euler_angles(
            deg_to_rad(euler.x),
            deg_to_rad(euler.y),
            deg_to_rad(euler.z),
        )
    }

    /// Compose translation, rotation and scale around a pivot
    ///
    /// Equivalent to `T(translation) * T(origin) * R * S * T(-origin)`.
    pub fn from_rotation_translation_scale_origin(
        rotation: &Quat,
        translation: &Vec3,
        scale: &Vec3,
        origin: &Vec3,
    ) -> Mat4 {
        Mat4::new_translation(&(translation + origin))
            * rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(scale)
            * Mat4::new_translation(&(-origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_composition() {
        let m = utils::from_rotation_translation_scale_origin(
            &Quat::identity(),
            &Vec3::zeros(),
            &Vec3::new(1.0, 1.0, 1.0),
            &Vec3::zeros(),
        );
        assert_relative_eq!(m, Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_scale_around_origin_keeps_pivot_fixed() {
        let pivot = Vec3::new(1.0, 1.0, 0.0);
        let m = utils::from_rotation_translation_scale_origin(
            &Quat::identity(),
            &Vec3::zeros(),
            &Vec3::new(2.0, 2.0, 2.0),
            &pivot,
        );
        let moved = m.transform_point(&nalgebra::Point3::from(pivot));
        assert_relative_eq!(moved.coords, pivot, epsilon = 1e-6);
    }

    #[test]
    fn test_euler_degrees_rotate_about_z() {
        let q = utils::quat_from_euler_degrees(&Vec3::new(0.0, 0.0, 90.0));
        let rotated = q * Vec3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(rotated, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }
}
