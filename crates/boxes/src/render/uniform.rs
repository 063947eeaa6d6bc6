//! Uniform values and upload
//!
//! A [`UniformValue`] is what application code stores on a material or a
//! uniform provider. How it reaches the GPU is decided by the uniform's
//! declared [`UniformType`], through the [`UniformSetter`] picked once per
//! uniform when the program is introspected.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;

use crate::foundation::math::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use super::backend::{GpuBackend, UniformLocation, UniformType};
use super::texture::{SharedTexture, Texture};

/// Value of a shader uniform
#[derive(Debug, Clone)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`, `bool` or a sampler's texture unit
    Int(i32),
    /// `vec2`
    Vec2(Vec2),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `ivec2`
    IVec2([i32; 2]),
    /// `ivec3`
    IVec3([i32; 3]),
    /// `ivec4`
    IVec4([i32; 4]),
    /// `mat2`
    Mat2(Mat2),
    /// `mat3`
    Mat3(Mat3),
    /// `mat4`
    Mat4(Mat4),
    /// Texture bound to a sampler
    Texture(SharedTexture),
}

impl UniformValue {
    /// Wrap any texture for use as a sampler value
    pub fn texture<T: Texture + 'static>(texture: Rc<RefCell<T>>) -> Self {
        Self::Texture(texture)
    }

    /// Float components, if this is a float-based value
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(std::slice::from_ref(v)),
            Self::Vec2(v) => Some(v.as_slice()),
            Self::Vec3(v) => Some(v.as_slice()),
            Self::Vec4(v) => Some(v.as_slice()),
            Self::Mat2(m) => Some(m.as_slice()),
            Self::Mat3(m) => Some(m.as_slice()),
            Self::Mat4(m) => Some(m.as_slice()),
            _ => None,
        }
    }

    /// Integer components, if this is an integer-based value
    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            Self::Int(v) => Some(std::slice::from_ref(v)),
            Self::IVec2(v) => Some(v.as_slice()),
            Self::IVec3(v) => Some(v.as_slice()),
            Self::IVec4(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Overwrite with `other` if both are the same kind, otherwise replace
    pub fn assign(&mut self, other: &UniformValue) {
        match (self, other) {
            (Self::Mat4(dst), Self::Mat4(src)) => dst.copy_from(src),
            (Self::Vec3(dst), Self::Vec3(src)) => dst.copy_from(src),
            (dst, src) => *dst = src.clone(),
        }
    }
}

macro_rules! uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

uniform_from! {
    f32 => Float,
    i32 => Int,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    [i32; 2] => IVec2,
    [i32; 3] => IVec3,
    [i32; 4] => IVec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
    SharedTexture => Texture,
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Int(i32::from(value))
    }
}

/// Uploads a value to a uniform location of the current program
pub type UniformSetter = fn(&mut dyn GpuBackend, UniformLocation, &UniformValue);

fn set_floats<const N: usize>(gpu: &mut dyn GpuBackend, location: UniformLocation, value: &UniformValue) {
    match value.as_floats() {
        Some(data) => gpu.uniform_floats(location, N, data),
        None => warn!("Uniform at {:?} expects floats, got {:?}", location, value),
    }
}

fn set_ints<const N: usize>(gpu: &mut dyn GpuBackend, location: UniformLocation, value: &UniformValue) {
    match value.as_ints() {
        Some(data) => gpu.uniform_ints(location, N, data),
        None => warn!("Uniform at {:?} expects integers, got {:?}", location, value),
    }
}

fn set_matrix<const N: usize>(gpu: &mut dyn GpuBackend, location: UniformLocation, value: &UniformValue) {
    match value.as_floats() {
        Some(data) => gpu.uniform_matrix(location, N, data),
        None => warn!("Uniform at {:?} expects a matrix, got {:?}", location, value),
    }
}

/// Setter for a declared uniform type
pub fn setter_for(ty: UniformType) -> UniformSetter {
    match ty {
        UniformType::Float => set_floats::<1> as UniformSetter,
        UniformType::FloatVec2 => set_floats::<2>,
        UniformType::FloatVec3 => set_floats::<3>,
        UniformType::FloatVec4 => set_floats::<4>,
        UniformType::Int | UniformType::Bool | UniformType::Sampler2D | UniformType::SamplerCube => {
            set_ints::<1>
        }
        UniformType::IntVec2 => set_ints::<2>,
        UniformType::IntVec3 => set_ints::<3>,
        UniformType::IntVec4 => set_ints::<4>,
        UniformType::FloatMat2 => set_matrix::<2>,
        UniformType::FloatMat3 => set_matrix::<3>,
        UniformType::FloatMat4 => set_matrix::<4>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{GpuCall, RecordingBackend};

    #[test]
    fn test_matrices_upload_column_major() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));

        setter_for(UniformType::FloatMat4)(&mut gpu, UniformLocation(0), &m.into());

        let calls = log.snapshot();
        let GpuCall::UniformMatrix { dimension, data, .. } = &calls[0] else {
            panic!("expected matrix upload, got {:?}", calls[0]);
        };
        assert_eq!(*dimension, 4);
        assert_eq!(&data[12..15], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mismatched_value_is_skipped() {
        let mut gpu = RecordingBackend::new();
        let log = gpu.log();

        setter_for(UniformType::FloatVec3)(&mut gpu, UniformLocation(0), &UniformValue::Int(3));
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_assign_keeps_kind_or_replaces() {
        let mut value = UniformValue::Mat4(Mat4::identity());
        value.assign(&UniformValue::Mat4(Mat4::zeros()));
        assert_eq!(value.as_floats().map(|f| f[0]), Some(0.0));

        value.assign(&UniformValue::Float(2.0));
        assert!(matches!(value, UniformValue::Float(v) if v == 2.0));
    }

    #[test]
    fn test_bool_becomes_int() {
        assert!(matches!(UniformValue::from(true), UniformValue::Int(1)));
    }
}
