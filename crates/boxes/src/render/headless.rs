//! Headless recording backend
//!
//! [`RecordingBackend`] implements [`GpuBackend`] without a device. It hands
//! out handles, keeps just enough object state to answer introspection
//! queries, and appends every call to a shared [`CallLog`]. The demo renders
//! against it and the test-suite asserts on the recorded call sequence.
//!
//! Shader "compilation" scans the GLSL source for `uniform` and `attribute`
//! declarations. A source that is empty or contains `#error` fails to
//! compile, which makes the error paths reachable without a driver.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::backend::*;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum GpuCall {
    CreateBuffer(BufferHandle),
    BindBuffer(BufferTarget, Option<BufferHandle>),
    BufferData { target: BufferTarget, len: usize, usage: BufferUsage },
    BufferSubData { target: BufferTarget, offset: usize, len: usize },
    DeleteBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    DeleteVertexArray(VertexArrayHandle),
    EnableVertexAttribArray(u32),
    VertexAttribPointer { location: u32, size: i32, stride: i32, offset: i32 },
    VertexAttribDivisor { location: u32, divisor: u32 },
    CompileShader(ShaderStage, ShaderHandle),
    DeleteShader(ShaderHandle),
    LinkProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    DeleteProgram(ProgramHandle),
    UniformFloats { location: UniformLocation, components: usize, data: Vec<f32> },
    UniformInts { location: UniformLocation, components: usize, data: Vec<i32> },
    UniformMatrix { location: UniformLocation, dimension: usize, data: Vec<f32> },
    CreateTexture(TextureHandle),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<TextureHandle>),
    TexImage2D { target: TextureTarget, level: u32, format: TextureFormat, width: u32, height: u32, has_data: bool },
    TexParameter(TextureTarget, TextureParameter),
    GenerateMipmap(TextureTarget),
    DeleteTexture(TextureHandle),
    CreateFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    FramebufferTexture2D(Attachment, TextureHandle),
    DeleteFramebuffer(FramebufferHandle),
    CreateRenderbuffer(RenderbufferHandle),
    BindRenderbuffer(Option<RenderbufferHandle>),
    RenderbufferStorage { format: RenderbufferFormat, width: u32, height: u32 },
    FramebufferRenderbuffer(Attachment, RenderbufferHandle),
    DeleteRenderbuffer(RenderbufferHandle),
    Enable(Capability),
    Disable(Capability),
    BlendFunc(BlendFactor, BlendFactor),
    CullFace(CullFace),
    DepthMask(bool),
    ColorMask(bool, bool, bool, bool),
    StencilFunc(StencilFunc, i32, u32),
    StencilOp(StencilOp, StencilOp, StencilOp),
    StencilMask(u32),
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    ClearColor([f32; 4]),
    Clear(ClearFlags),
    DrawArrays { mode: DrawMode, first: i32, count: i32 },
    DrawElements { mode: DrawMode, count: i32, offset: i32 },
    DrawArraysInstanced { mode: DrawMode, first: i32, count: i32, instances: i32 },
    DrawElementsInstanced { mode: DrawMode, count: i32, offset: i32, instances: i32 },
}

impl GpuCall {
    /// Whether this call issues primitives
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawArrays { .. }
                | Self::DrawElements { .. }
                | Self::DrawArraysInstanced { .. }
                | Self::DrawElementsInstanced { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<GpuCall>,
    buffer_contents: HashMap<BufferHandle, Vec<u8>>,
    live_programs: usize,
}

/// Shared view of everything a [`RecordingBackend`] has seen
///
/// Cloning is cheap; all clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Rc<RefCell<Recording>>,
}

impl CallLog {
    /// All calls in submission order
    pub fn calls(&self) -> Ref<'_, [GpuCall]> {
        Ref::map(self.inner.borrow(), |r| r.calls.as_slice())
    }

    /// Copy of all calls, for assertions that outlive a borrow
    pub fn snapshot(&self) -> Vec<GpuCall> {
        self.inner.borrow().calls.clone()
    }

    /// Forget recorded calls; object state is kept
    pub fn clear(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    /// Number of calls matching a predicate
    pub fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of draw calls
    pub fn draw_count(&self) -> usize {
        self.count(GpuCall::is_draw)
    }

    /// Programs linked and not yet deleted
    pub fn live_programs(&self) -> usize {
        self.inner.borrow().live_programs
    }

    /// Current contents of a buffer reinterpreted as `f32`s
    pub fn buffer_floats(&self, buffer: BufferHandle) -> Option<Vec<f32>> {
        self.inner
            .borrow()
            .buffer_contents
            .get(&buffer)
            .map(|bytes| bytemuck::pod_collect_to_vec::<u8, f32>(bytes))
    }

    fn push(&self, call: GpuCall) {
        self.inner.borrow_mut().calls.push(call);
    }
}

#[derive(Debug)]
struct ShaderRecord {
    compiled: bool,
    log: String,
    uniforms: Vec<(String, UniformType)>,
    attributes: Vec<(String, u32)>,
}

#[derive(Debug)]
struct ProgramRecord {
    linked: bool,
    log: String,
    uniforms: Vec<ActiveUniform>,
    attributes: HashMap<String, i32>,
}

/// Device-less [`GpuBackend`] that records calls
#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: CallLog,
    next_id: u32,
    bound_buffers: HashMap<BufferTarget, BufferHandle>,
    shaders: HashMap<ShaderHandle, ShaderRecord>,
    programs: HashMap<ProgramHandle, ProgramRecord>,
}

impl RecordingBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared call log
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Number of attribute slots a GLSL type occupies
fn attribute_slots(ty: &str) -> u32 {
    match ty {
        "mat2" => 2,
        "mat3" => 3,
        "mat4" => 4,
        _ => 1,
    }
}

fn is_precision(token: &str) -> bool {
    matches!(token, "lowp" | "mediump" | "highp")
}

/// Scan a GLSL source for uniform and attribute declarations
fn scan_declarations(source: &str) -> (Vec<(String, UniformType)>, Vec<(String, u32)>) {
    let mut uniforms = Vec::new();
    let mut attributes = Vec::new();

    for statement in source.split(|c| c == ';' || c == '{' || c == '}') {
        let mut tokens = statement.split_whitespace().filter(|t| !is_precision(t));
        let qualifier = tokens.next();
        let (Some(ty), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let name = name.split('[').next().unwrap_or(name).to_string();

        match qualifier {
            Some("uniform") => {
                if let Some(uniform_type) = UniformType::from_glsl(ty) {
                    uniforms.push((name, uniform_type));
                }
            }
            Some("attribute") => attributes.push((name, attribute_slots(ty))),
            _ => {}
        }
    }

    (uniforms, attributes)
}

impl GpuBackend for RecordingBackend {
    fn create_buffer(&mut self) -> BufferHandle {
        let handle = BufferHandle(self.next());
        self.log.push(GpuCall::CreateBuffer(handle));
        handle
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        match buffer {
            Some(b) => self.bound_buffers.insert(target, b),
            None => self.bound_buffers.remove(&target),
        };
        self.log.push(GpuCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        if let Some(buffer) = self.bound_buffers.get(&target) {
            self.log
                .inner
                .borrow_mut()
                .buffer_contents
                .insert(*buffer, data.to_vec());
        }
        self.log.push(GpuCall::BufferData { target, len: data.len(), usage });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        if let Some(buffer) = self.bound_buffers.get(&target) {
            let mut recording = self.log.inner.borrow_mut();
            if let Some(contents) = recording.buffer_contents.get_mut(buffer) {
                let end = (offset + data.len()).min(contents.len());
                if offset < end {
                    contents[offset..end].copy_from_slice(&data[..end - offset]);
                }
            }
        }
        self.log.push(GpuCall::BufferSubData { target, offset, len: data.len() });
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.log.inner.borrow_mut().buffer_contents.remove(&buffer);
        self.log.push(GpuCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let handle = VertexArrayHandle(self.next());
        self.log.push(GpuCall::CreateVertexArray(handle));
        handle
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>) {
        self.log.push(GpuCall::BindVertexArray(vao));
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayHandle) {
        self.log.push(GpuCall::DeleteVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.log.push(GpuCall::EnableVertexAttribArray(location));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, size: i32, stride: i32, offset: i32) {
        self.log.push(GpuCall::VertexAttribPointer { location, size, stride, offset });
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.log.push(GpuCall::VertexAttribDivisor { location, divisor });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderHandle {
        let handle = ShaderHandle(self.next());

        let record = if source.trim().is_empty() {
            ShaderRecord {
                compiled: false,
                log: "ERROR: 0:0: empty shader source".to_string(),
                uniforms: Vec::new(),
                attributes: Vec::new(),
            }
        } else if let Some(line) = source.lines().position(|l| l.contains("#error")) {
            ShaderRecord {
                compiled: false,
                log: format!("ERROR: 0:{}: '#error' : user error", line + 1),
                uniforms: Vec::new(),
                attributes: Vec::new(),
            }
        } else {
            let (uniforms, mut attributes) = scan_declarations(source);
            if stage == ShaderStage::Fragment {
                attributes.clear();
            }
            ShaderRecord { compiled: true, log: String::new(), uniforms, attributes }
        };

        self.shaders.insert(handle, record);
        self.log.push(GpuCall::CompileShader(stage, handle));
        handle
    }

    fn shader_compile_status(&self, shader: ShaderHandle) -> bool {
        self.shaders.get(&shader).map_or(false, |s| s.compiled)
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        self.shaders.get(&shader).map(|s| s.log.clone()).unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
        self.log.push(GpuCall::DeleteShader(shader));
    }

    fn link_program(&mut self, vertex: ShaderHandle, fragment: ShaderHandle) -> ProgramHandle {
        let handle = ProgramHandle(self.next());

        let stages = [self.shaders.get(&vertex), self.shaders.get(&fragment)];
        let linked = stages.iter().all(|s| s.map_or(false, |s| s.compiled));

        let mut record = ProgramRecord {
            linked,
            log: String::new(),
            uniforms: Vec::new(),
            attributes: HashMap::new(),
        };

        if linked {
            let mut next_location = 0;
            for (name, ty) in stages.iter().flatten().flat_map(|s| s.uniforms.iter()) {
                if record.uniforms.iter().any(|u| &u.name == name) {
                    continue;
                }
                record.uniforms.push(ActiveUniform {
                    name: name.clone(),
                    ty: *ty,
                    location: UniformLocation(next_location),
                });
                next_location += 1;
            }

            let mut next_slot = 0;
            for (name, slots) in stages[0].iter().flat_map(|s| s.attributes.iter()) {
                record.attributes.insert(name.clone(), next_slot);
                next_slot += *slots as i32;
            }
        } else {
            record.log = "ERROR: one or more attached shaders not successfully compiled".to_string();
        }

        self.programs.insert(handle, record);
        self.log.inner.borrow_mut().live_programs += 1;
        self.log.push(GpuCall::LinkProgram(handle));
        handle
    }

    fn program_link_status(&self, program: ProgramHandle) -> bool {
        self.programs.get(&program).map_or(false, |p| p.linked)
    }

    fn program_info_log(&self, program: ProgramHandle) -> String {
        self.programs.get(&program).map(|p| p.log.clone()).unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.log.push(GpuCall::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            let mut recording = self.log.inner.borrow_mut();
            recording.live_programs = recording.live_programs.saturating_sub(1);
        }
        self.log.push(GpuCall::DeleteProgram(program));
    }

    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> i32 {
        self.programs
            .get(&program)
            .and_then(|p| p.attributes.get(name).copied())
            .unwrap_or(ATTRIBUTE_NOT_FOUND)
    }

    fn uniform_floats(&mut self, location: UniformLocation, components: usize, data: &[f32]) {
        self.log.push(GpuCall::UniformFloats { location, components, data: data.to_vec() });
    }

    fn uniform_ints(&mut self, location: UniformLocation, components: usize, data: &[i32]) {
        self.log.push(GpuCall::UniformInts { location, components, data: data.to_vec() });
    }

    fn uniform_matrix(&mut self, location: UniformLocation, dimension: usize, data: &[f32]) {
        self.log.push(GpuCall::UniformMatrix { location, dimension, data: data.to_vec() });
    }

    fn create_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next());
        self.log.push(GpuCall::CreateTexture(handle));
        handle
    }

    fn active_texture(&mut self, unit: u32) {
        self.log.push(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>) {
        self.log.push(GpuCall::BindTexture(target, texture));
    }

    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
        _data_type: TextureDataType,
        data: Option<&[u8]>,
    ) {
        self.log.push(GpuCall::TexImage2D {
            target,
            level,
            format,
            width,
            height,
            has_data: data.is_some(),
        });
    }

    fn tex_parameter(&mut self, target: TextureTarget, parameter: TextureParameter) {
        self.log.push(GpuCall::TexParameter(target, parameter));
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        self.log.push(GpuCall::GenerateMipmap(target));
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.log.push(GpuCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> FramebufferHandle {
        let handle = FramebufferHandle(self.next());
        self.log.push(GpuCall::CreateFramebuffer(handle));
        handle
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.log.push(GpuCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: TextureHandle) {
        self.log.push(GpuCall::FramebufferTexture2D(attachment, texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.log.push(GpuCall::DeleteFramebuffer(framebuffer));
    }

    fn create_renderbuffer(&mut self) -> RenderbufferHandle {
        let handle = RenderbufferHandle(self.next());
        self.log.push(GpuCall::CreateRenderbuffer(handle));
        handle
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) {
        self.log.push(GpuCall::BindRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage(&mut self, format: RenderbufferFormat, width: u32, height: u32) {
        self.log.push(GpuCall::RenderbufferStorage { format, width, height });
    }

    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: RenderbufferHandle) {
        self.log.push(GpuCall::FramebufferRenderbuffer(attachment, renderbuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.log.push(GpuCall::DeleteRenderbuffer(renderbuffer));
    }

    fn enable(&mut self, capability: Capability) {
        self.log.push(GpuCall::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.log.push(GpuCall::Disable(capability));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.log.push(GpuCall::BlendFunc(src, dst));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.log.push(GpuCall::CullFace(face));
    }

    fn depth_mask(&mut self, write: bool) {
        self.log.push(GpuCall::DepthMask(write));
    }

    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.log.push(GpuCall::ColorMask(red, green, blue, alpha));
    }

    fn stencil_func(&mut self, func: StencilFunc, reference: i32, mask: u32) {
        self.log.push(GpuCall::StencilFunc(func, reference, mask));
    }

    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.log.push(GpuCall::StencilOp(fail, depth_fail, pass));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.log.push(GpuCall::StencilMask(mask));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.log.push(GpuCall::Viewport { x, y, width, height });
    }

    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.log.push(GpuCall::ClearColor([red, green, blue, alpha]));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.log.push(GpuCall::Clear(flags));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        self.log.push(GpuCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: DrawMode, count: i32, offset: i32) {
        self.log.push(GpuCall::DrawElements { mode, count, offset });
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32) {
        self.log.push(GpuCall::DrawArraysInstanced { mode, first, count, instances });
    }

    fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, offset: i32, instances: i32) {
        self.log.push(GpuCall::DrawElementsInstanced { mode, count, offset, instances });
    }
}
