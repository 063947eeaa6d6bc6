//! Buffer geometry
//!
//! [`BufferGeometry`] owns vertex data and uploads it as one interleaved
//! float buffer on first draw: the position stream first, then each
//! auxiliary attribute stream back to back. Because attribute slots differ
//! between programs, one vertex array object is cached per material the
//! geometry has been drawn with.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use super::backend::{
    BufferHandle, BufferTarget, BufferUsage, DrawMode, GpuBackend, VertexArrayHandle,
};
use super::context::RenderContext;
use super::material::{Material, MaterialId};
use super::{RenderError, RenderResult};

const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

/// Per-instance attribute data for instanced draws
///
/// Holds `length` floats per instance. Values wider than four floats span
/// consecutive attribute slots (a `mat4` takes four).
#[derive(Debug, Clone)]
pub struct InstancedAttribute {
    length: usize,
    dynamic: bool,
    data: Option<Vec<f32>>,
    needs_update: bool,
}

/// Instanced attribute shared between a geometry and application code
pub type SharedInstancedAttribute = Rc<RefCell<InstancedAttribute>>;

impl InstancedAttribute {
    /// Create an attribute with `length` floats per instance
    pub fn new(length: usize) -> Self {
        Self {
            length,
            dynamic: false,
            data: None,
            needs_update: true,
        }
    }

    /// Mark the attribute as rewritten every frame
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Wrap for sharing with a geometry
    pub fn into_shared(self) -> SharedInstancedAttribute {
        Rc::new(RefCell::new(self))
    }

    /// Allocate zeroed storage for `instances` instances
    pub fn init(&mut self, instances: usize) -> RenderResult<()> {
        if self.data.is_some() {
            return Err(RenderError::AttributeReinitialized);
        }
        self.data = Some(vec![0.0; instances * self.length]);
        Ok(())
    }

    /// Floats per instance
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether the attribute was marked dynamic
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// All instance data, empty before [`init`](Self::init)
    pub fn data(&self) -> &[f32] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// View of one instance
    pub fn instance(&self, index: usize) -> Option<&[f32]> {
        let start = index * self.length;
        self.data.as_ref()?.get(start..start + self.length)
    }

    /// Mutable view of one instance; call [`update`](Self::update) afterwards
    pub fn instance_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let start = index * self.length;
        self.data.as_mut()?.get_mut(start..start + self.length)
    }

    /// Flag the data for re-upload on the next draw
    pub fn update(&mut self) {
        if !self.dynamic && !self.needs_update {
            warn!("Updating an instanced attribute that is not marked dynamic");
        }
        self.needs_update = true;
    }

    /// Whether the data changed since the last upload
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    fn set_updated(&mut self) {
        self.needs_update = false;
    }

    fn slots(&self) -> usize {
        self.length.div_ceil(4).max(1)
    }
}

/// Placement of one attribute inside the interleaved buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    /// Attribute name in the shader
    pub name: String,
    /// Components per vertex
    pub size: i32,
    /// Byte offset of the stream
    pub offset: i32,
}

#[derive(Debug)]
struct InstancedRef {
    name: String,
    attribute: SharedInstancedAttribute,
    buffer: Option<BufferHandle>,
}

/// Geometry shared between renderables
pub type SharedGeometry = Rc<RefCell<BufferGeometry>>;

/// Vertex data plus its GPU buffers and per-material vertex arrays
#[derive(Debug)]
pub struct BufferGeometry {
    verts: Vec<f32>,
    stride: usize,
    vertex_name: String,
    attributes: Vec<(String, Vec<f32>)>,
    indices: Option<Vec<u16>>,
    mode: DrawMode,
    instances: usize,
    instanced: Vec<InstancedRef>,
    layout: Vec<AttributeLayout>,
    buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    vaos: HashMap<MaterialId, VertexArrayHandle>,
}

impl BufferGeometry {
    /// Geometry from 3-component positions, drawn as triangles
    pub fn new(verts: Vec<f32>) -> Self {
        Self {
            verts,
            stride: 3,
            vertex_name: "a_vPosition".to_string(),
            attributes: Vec::new(),
            indices: None,
            mode: DrawMode::Triangles,
            instances: 0,
            instanced: Vec::new(),
            layout: Vec::new(),
            buffer: None,
            index_buffer: None,
            vaos: HashMap::new(),
        }
    }

    /// Components per position
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Shader name of the position attribute
    pub fn with_vertex_name(mut self, name: impl Into<String>) -> Self {
        self.vertex_name = name.into();
        self
    }

    /// Add an auxiliary per-vertex attribute stream
    pub fn with_attribute(mut self, name: impl Into<String>, data: Vec<f32>) -> Self {
        self.attributes.push((name.into(), data));
        self
    }

    /// Draw with 16-bit indices
    pub fn with_indices(mut self, indices: Vec<u16>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Primitive mode
    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    /// Draw `instances` copies using per-instance attributes
    ///
    /// Each attribute is initialised for `instances` instances; passing an
    /// attribute that was already initialised is an error. With zero
    /// instances the attributes are ignored and the geometry draws normally.
    pub fn with_instancing<I, K>(mut self, instances: usize, attributes: I) -> RenderResult<Self>
    where
        I: IntoIterator<Item = (K, SharedInstancedAttribute)>,
        K: Into<String>,
    {
        if instances == 0 {
            return Ok(self);
        }
        self.instances = instances;
        for (name, attribute) in attributes {
            attribute.borrow_mut().init(instances)?;
            self.instanced.push(InstancedRef {
                name: name.into(),
                attribute,
                buffer: None,
            });
        }
        Ok(self)
    }

    /// Wrap for sharing between renderables
    pub fn into_shared(self) -> SharedGeometry {
        Rc::new(RefCell::new(self))
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.verts.len() / self.stride
    }

    /// Attribute placement; empty until the first draw
    pub fn layout(&self) -> &[AttributeLayout] {
        &self.layout
    }

    /// The interleaved vertex buffer, once uploaded
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Number of cached vertex arrays
    pub fn cached_vertex_arrays(&self) -> usize {
        self.vaos.len()
    }

    /// Build the interleaved buffer contents and attribute layout
    fn interleave(&mut self) -> Vec<f32> {
        let vertex_count = self.vertex_count();
        let mut data = self.verts.clone();

        self.layout.clear();
        self.layout.push(AttributeLayout {
            name: self.vertex_name.clone(),
            size: self.stride as i32,
            offset: 0,
        });

        for (name, values) in &self.attributes {
            let offset = (data.len() * FLOAT_BYTES) as i32;
            let fits = vertex_count > 0 && values.len() % vertex_count == 0;
            let size = if fits { values.len() / vertex_count } else { 0 };

            let size = if (1..=4).contains(&size) {
                data.extend_from_slice(values);
                size
            } else {
                warn!("Unsupported attribute size for \"{}\", filling with zeroes", name);
                data.resize(data.len() + vertex_count, 0.0);
                1
            };

            self.layout.push(AttributeLayout {
                name: name.clone(),
                size: size as i32,
                offset,
            });
        }

        data
    }

    fn ensure_buffers(&mut self, gpu: &mut dyn GpuBackend) {
        if self.buffer.is_some() {
            return;
        }

        let data = self.interleave();
        let buffer = gpu.create_buffer();
        gpu.bind_buffer(BufferTarget::Array, Some(buffer));
        gpu.buffer_data(BufferTarget::Array, bytemuck::cast_slice(&data), BufferUsage::StaticDraw);
        self.buffer = Some(buffer);

        if let Some(indices) = &self.indices {
            let index_buffer = gpu.create_buffer();
            gpu.bind_buffer(BufferTarget::ElementArray, Some(index_buffer));
            gpu.buffer_data(
                BufferTarget::ElementArray,
                bytemuck::cast_slice(indices),
                BufferUsage::StaticDraw,
            );
            self.index_buffer = Some(index_buffer);
        }

        for instanced in &mut self.instanced {
            let mut attribute = instanced.attribute.borrow_mut();
            let usage = if attribute.is_dynamic() {
                BufferUsage::DynamicDraw
            } else {
                BufferUsage::StaticDraw
            };

            let buffer = gpu.create_buffer();
            gpu.bind_buffer(BufferTarget::Array, Some(buffer));
            gpu.buffer_data(BufferTarget::Array, bytemuck::cast_slice(attribute.data()), usage);
            attribute.set_updated();
            instanced.buffer = Some(buffer);
        }
    }

    fn vertex_array_for(&mut self, gpu: &mut dyn GpuBackend, material: &mut Material) -> VertexArrayHandle {
        if let Some(vao) = self.vaos.get(&material.id()) {
            return *vao;
        }

        let vao = gpu.create_vertex_array();
        gpu.bind_vertex_array(Some(vao));

        if self.index_buffer.is_some() {
            gpu.bind_buffer(BufferTarget::ElementArray, self.index_buffer);
        }
        gpu.bind_buffer(BufferTarget::Array, self.buffer);

        for attribute in &self.layout {
            let location = material.get_attribute_location(gpu, &attribute.name);
            let Ok(location) = u32::try_from(location) else {
                continue;
            };

            gpu.enable_vertex_attrib_array(location);
            gpu.vertex_attrib_pointer(location, attribute.size, 0, attribute.offset);
        }

        for instanced in &self.instanced {
            let location = material.get_attribute_location(gpu, &instanced.name);
            let Ok(location) = u32::try_from(location) else {
                continue;
            };

            let attribute = instanced.attribute.borrow();
            let bytes_per_instance = (attribute.length() * FLOAT_BYTES) as i32;
            let size = attribute.length().min(4) as i32;

            gpu.bind_buffer(BufferTarget::Array, instanced.buffer);
            for slot in 0..attribute.slots() {
                let slot_location = location + slot as u32;
                gpu.enable_vertex_attrib_array(slot_location);
                gpu.vertex_attrib_pointer(slot_location, size, bytes_per_instance, (slot * 4 * FLOAT_BYTES) as i32);
                gpu.vertex_attrib_divisor(slot_location, 1);
            }
        }

        gpu.bind_vertex_array(None);

        self.vaos.insert(material.id(), vao);
        vao
    }

    /// Draw with `material`, which must already be in use
    ///
    /// Uploads buffers on the first call and builds a vertex array the first
    /// time each material is seen.
    pub fn draw(&mut self, ctx: &mut RenderContext, material: &mut Material) {
        let gpu = ctx.gpu.as_mut();

        self.ensure_buffers(gpu);
        let vao = self.vertex_array_for(gpu, material);
        gpu.bind_vertex_array(Some(vao));

        let count = match &self.indices {
            Some(indices) => indices.len() as i32,
            None => self.vertex_count() as i32,
        };

        if self.instanced.is_empty() {
            if self.indices.is_some() {
                gpu.draw_elements(self.mode, count, 0);
            } else {
                gpu.draw_arrays(self.mode, 0, count);
            }
        } else {
            for instanced in &self.instanced {
                let mut attribute = instanced.attribute.borrow_mut();
                if attribute.needs_update() {
                    gpu.bind_buffer(BufferTarget::Array, instanced.buffer);
                    gpu.buffer_sub_data(BufferTarget::Array, 0, bytemuck::cast_slice(attribute.data()));
                    attribute.set_updated();
                }
            }

            let instances = self.instances as i32;
            if self.indices.is_some() {
                gpu.draw_elements_instanced(self.mode, count, 0, instances);
            } else {
                gpu.draw_arrays_instanced(self.mode, 0, count, instances);
            }
        }

        gpu.bind_vertex_array(None);
    }

    /// Free buffers and every cached vertex array
    pub fn delete(&mut self, ctx: &mut RenderContext) {
        let gpu = ctx.gpu.as_mut();

        if let Some(buffer) = self.buffer.take() {
            gpu.delete_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            gpu.delete_buffer(buffer);
        }
        for instanced in &mut self.instanced {
            if let Some(buffer) = instanced.buffer.take() {
                gpu.delete_buffer(buffer);
            }
        }
        for (_, vao) in self.vaos.drain() {
            gpu.delete_vertex_array(vao);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{CallLog, GpuCall, RecordingBackend};

    const INSTANCED_VERTEX: &str = "attribute vec3 a_vPosition;
attribute mat4 a_mOffset;
void main() { gl_Position = a_mOffset * vec4(a_vPosition, 1); }
";

    fn setup() -> (RenderContext, CallLog, Material) {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut ctx = RenderContext::new(Box::new(gpu), 16, 16);
        let mut material = Material::default();
        material.use_program(&mut ctx);
        (ctx, log, material)
    }

    fn triangle() -> BufferGeometry {
        BufferGeometry::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    #[test]
    fn test_interleaved_layout() {
        let (mut ctx, log, mut material) = setup();
        let mut geometry = triangle().with_attribute("a_vUv", vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(
            geometry.layout(),
            &[
                AttributeLayout { name: "a_vPosition".into(), size: 3, offset: 0 },
                AttributeLayout { name: "a_vUv".into(), size: 2, offset: 36 },
            ]
        );
        let buffer = geometry.buffer().unwrap();
        assert_eq!(log.buffer_floats(buffer).unwrap().len(), 15);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DrawArrays { count: 3, .. })), 1);
    }

    #[test]
    fn test_mismatched_attribute_is_zero_filled() {
        let (mut ctx, log, mut material) = setup();
        let mut geometry = triangle().with_attribute("a_vUv", vec![1.0, 2.0, 3.0, 4.0]);

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(geometry.layout()[1].size, 1);
        let floats = log.buffer_floats(geometry.buffer().unwrap()).unwrap();
        assert_eq!(&floats[9..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vertex_array_cached_per_material() {
        let (mut ctx, log, mut material) = setup();
        let mut other = Material::default();
        other.use_program(&mut ctx);
        let mut geometry = triangle();

        geometry.draw(&mut ctx, &mut material);
        geometry.draw(&mut ctx, &mut material);
        assert_eq!(geometry.cached_vertex_arrays(), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::CreateBuffer(_))), 1);

        geometry.draw(&mut ctx, &mut other);
        assert_eq!(geometry.cached_vertex_arrays(), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCall::CreateVertexArray(_))), 2);
    }

    #[test]
    fn test_missing_attribute_is_not_enabled() {
        let (mut ctx, log, mut material) = setup();
        let mut geometry = triangle().with_attribute("a_vNormal", vec![0.0; 9]);

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(log.count(|c| matches!(c, GpuCall::EnableVertexAttribArray(_))), 1);
    }

    #[test]
    fn test_indexed_draw() {
        let (mut ctx, log, mut material) = setup();
        let mut geometry = triangle().with_indices(vec![0, 1, 2, 2, 1, 0]);

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(log.count(|c| matches!(c, GpuCall::DrawElements { count: 6, .. })), 1);
    }

    #[test]
    fn test_instanced_matrix_attribute() {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut ctx = RenderContext::new(Box::new(gpu), 16, 16);
        let mut material = Material::new(INSTANCED_VERTEX, crate::render::shaders::FRAGMENT_SHADER);
        material.use_program(&mut ctx);

        let offsets = InstancedAttribute::new(16).dynamic().into_shared();
        let mut geometry = triangle()
            .with_instancing(5, [("a_mOffset", Rc::clone(&offsets))])
            .unwrap();

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(log.count(|c| matches!(c, GpuCall::VertexAttribDivisor { divisor: 1, .. })), 4);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DrawArraysInstanced { instances: 5, .. })), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::BufferSubData { .. })), 0);

        offsets.borrow_mut().instance_mut(2).unwrap()[0] = 1.0;
        offsets.borrow_mut().update();
        geometry.draw(&mut ctx, &mut material);
        assert_eq!(log.count(|c| matches!(c, GpuCall::BufferSubData { len: 320, .. })), 1);
    }

    #[test]
    fn test_zero_instances_draws_plainly() {
        let gpu = RecordingBackend::new();
        let log = gpu.log();
        let mut ctx = RenderContext::new(Box::new(gpu), 16, 16);
        let mut material = Material::new(INSTANCED_VERTEX, crate::render::shaders::FRAGMENT_SHADER);
        material.use_program(&mut ctx);

        let offsets = InstancedAttribute::new(16).into_shared();
        let mut geometry = triangle()
            .with_instancing(0, [("a_mOffset", Rc::clone(&offsets))])
            .unwrap();

        geometry.draw(&mut ctx, &mut material);

        assert_eq!(log.count(|c| matches!(c, GpuCall::DrawArrays { count: 3, .. })), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DrawArraysInstanced { .. })), 0);
        assert_eq!(log.count(|c| matches!(c, GpuCall::VertexAttribDivisor { .. })), 0);
        assert!(offsets.borrow_mut().init(2).is_ok());
    }

    #[test]
    fn test_instanced_attribute_reinit_is_an_error() {
        let attribute = InstancedAttribute::new(4).into_shared();
        attribute.borrow_mut().init(2).unwrap();

        let result = triangle().with_instancing(2, [("a_vOffset", attribute)]);
        assert!(matches!(result, Err(RenderError::AttributeReinitialized)));
    }

    #[test]
    fn test_delete_frees_everything() {
        let (mut ctx, log, mut material) = setup();
        let mut geometry = triangle().with_indices(vec![0, 1, 2]);
        geometry.draw(&mut ctx, &mut material);

        geometry.delete(&mut ctx);

        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteBuffer(_))), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteVertexArray(_))), 1);
        assert_eq!(geometry.cached_vertex_arrays(), 0);
    }
}
