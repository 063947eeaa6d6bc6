//! Materials
//!
//! A [`Material`] pairs a vertex and fragment shader with the uniform values
//! and textures they consume. Programs come from the context's
//! [`ProgramCache`](super::ProgramCache), so materials with identical sources
//! share one GPU program.
//!
//! Uniform values set before the program exists are queued and flushed when
//! it is first compiled. Sampler uniforms are assigned texture units in the
//! order the program reports them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{trace, warn};

use super::backend::{
    GpuBackend, ProgramHandle, TextureTarget, UniformLocation, UniformType, ATTRIBUTE_NOT_FOUND,
};
use super::context::RenderContext;
use super::program_cache::ProgramKey;
use super::shaders;
use super::texture::SharedTexture;
use super::uniform::{setter_for, UniformSetter, UniformValue};

/// Process-unique material identity
///
/// Geometry caches one vertex array per material and keys it on this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

impl MaterialId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Material shared between renderables
pub type SharedMaterial = Rc<RefCell<Material>>;

#[derive(Debug)]
struct UniformRef {
    name: String,
    location: UniformLocation,
    ty: UniformType,
    setter: UniformSetter,
    value: Option<UniformValue>,
}

/// Shader program plus uniform state
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    vertex_source: Rc<str>,
    fragment_source: Rc<str>,
    key: ProgramKey,
    program: Option<ProgramHandle>,
    uniforms: Vec<UniformRef>,
    uniform_index: HashMap<String, usize>,
    attribute_locations: HashMap<String, i32>,
    queued_uniforms: Vec<(String, UniformValue)>,
    textures: Vec<Option<SharedTexture>>,
    defer_compilation: bool,
    compilation_started: bool,
}

impl Material {
    /// Create a material from shader sources
    pub fn new(vertex_source: &str, fragment_source: &str) -> Self {
        Self {
            id: MaterialId::next(),
            vertex_source: Rc::from(vertex_source),
            fragment_source: Rc::from(fragment_source),
            key: ProgramKey::new(vertex_source, fragment_source),
            program: None,
            uniforms: Vec::new(),
            uniform_index: HashMap::new(),
            attribute_locations: HashMap::new(),
            queued_uniforms: Vec::new(),
            textures: Vec::new(),
            defer_compilation: false,
            compilation_started: false,
        }
    }

    /// Default vertex shader with a custom fragment shader
    pub fn with_fragment_shader(fragment_source: &str) -> Self {
        Self::new(shaders::VERTEX_SHADER, fragment_source)
    }

    /// Compile on a later frame through the context's scheduler
    pub fn with_deferred_compilation(mut self, defer: bool) -> Self {
        self.defer_compilation = defer;
        self
    }

    /// Set initial uniform values
    pub fn with_uniforms<I, K, V>(mut self, uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UniformValue>,
    {
        for (name, value) in uniforms {
            self.set_uniform(name, value);
        }
        self
    }

    /// Wrap for sharing between renderables
    pub fn into_shared(self) -> SharedMaterial {
        Rc::new(RefCell::new(self))
    }

    /// Identity used for per-material caches
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Cache key of the shader source pair
    pub fn program_key(&self) -> ProgramKey {
        self.key
    }

    /// Program in use, once compiled
    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Whether the program has been acquired
    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    /// Make this material current
    ///
    /// Compiles the program if needed, binds it, uploads uniform values and
    /// binds textures to consecutive units. With deferred compilation the
    /// first call schedules the work and returns `false`; callers skip the
    /// draw until this returns `true`.
    pub fn use_program(&mut self, ctx: &mut RenderContext) -> bool {
        if self.program.is_none() {
            if self.defer_compilation && !ctx.programs.contains(self.key) {
                if !self.compilation_started {
                    self.compilation_started = true;
                    self.schedule_compilation(ctx);
                }
                return false;
            }
            self.compile(ctx);
        }

        let Some(program) = self.program else {
            return false;
        };

        let gpu = ctx.gpu.as_mut();
        gpu.use_program(Some(program));
        self.commit_uniforms(gpu);
        self.bind_textures(gpu);

        true
    }

    fn schedule_compilation(&self, ctx: &mut RenderContext) {
        let key = self.key;
        let vertex = Rc::clone(&self.vertex_source);
        let fragment = Rc::clone(&self.fragment_source);

        ctx.scheduler().schedule_deferred(Box::new(move |ctx| {
            ctx.programs.warm(ctx.gpu.as_mut(), key, &vertex, &fragment);
        }));
    }

    fn compile(&mut self, ctx: &mut RenderContext) {
        let program = ctx.programs.acquire(
            ctx.gpu.as_mut(),
            self.key,
            &self.vertex_source,
            &self.fragment_source,
        );
        self.program = Some(program);
        self.create_uniform_references(ctx.gpu.as_ref(), program);

        for (name, value) in std::mem::take(&mut self.queued_uniforms) {
            self.set_uniform(name, value);
        }
    }

    fn create_uniform_references(&mut self, gpu: &dyn GpuBackend, program: ProgramHandle) {
        self.uniforms.clear();
        self.uniform_index.clear();
        self.textures.clear();

        for active in gpu.active_uniforms(program) {
            let name = active.name.split('[').next().unwrap_or(&active.name).to_string();

            let value = if active.ty.is_sampler() {
                self.textures.push(None);
                Some(UniformValue::Int(self.textures.len() as i32 - 1))
            } else {
                None
            };

            self.uniform_index.insert(name.clone(), self.uniforms.len());
            self.uniforms.push(UniformRef {
                name,
                location: active.location,
                ty: active.ty,
                setter: setter_for(active.ty),
                value,
            });
        }
    }

    fn commit_uniforms(&self, gpu: &mut dyn GpuBackend) {
        for uniform in &self.uniforms {
            if let Some(value) = &uniform.value {
                (uniform.setter)(gpu, uniform.location, value);
            }
        }
    }

    fn bind_textures(&self, gpu: &mut dyn GpuBackend) {
        for (unit, texture) in self.textures.iter().enumerate() {
            gpu.active_texture(unit as u32);

            if let Some(texture) = texture {
                let Ok(mut texture) = texture.try_borrow_mut() else {
                    warn!("Texture on unit {} is borrowed, likely as the current render target", unit);
                    continue;
                };
                let target = if texture.is_cubemap() {
                    TextureTarget::CubeMap
                } else {
                    TextureTarget::Texture2D
                };
                let handle = texture.prepare(gpu);
                gpu.bind_texture(target, handle);
            }
        }
    }

    /// Resolve (and cache) a vertex attribute slot
    ///
    /// Returns [`ATTRIBUTE_NOT_FOUND`] before compilation or when the
    /// program has no such attribute.
    pub fn get_attribute_location(&mut self, gpu: &dyn GpuBackend, name: &str) -> i32 {
        let Some(program) = self.program else {
            return ATTRIBUTE_NOT_FOUND;
        };

        if let Some(location) = self.attribute_locations.get(name) {
            return *location;
        }

        let location = gpu.attribute_location(program, name);
        self.attribute_locations.insert(name.to_string(), location);
        location
    }

    /// Store a uniform value
    ///
    /// Before compilation the value is queued. Afterwards, names the program
    /// does not use are ignored. A texture assigned to a sampler is bound to
    /// that sampler's unit.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        let name = name.into();
        let value = value.into();

        if self.program.is_none() {
            match self.queued_uniforms.iter_mut().find(|(n, _)| *n == name) {
                Some((_, queued)) => *queued = value,
                None => self.queued_uniforms.push((name, value)),
            }
            return;
        }

        let Some(&index) = self.uniform_index.get(&name) else {
            trace!("Uniform {} is not used by the program", name);
            return;
        };
        let uniform = &mut self.uniforms[index];

        if uniform.ty.is_sampler() {
            match value {
                UniformValue::Texture(texture) => {
                    if let Some(UniformValue::Int(unit)) = uniform.value {
                        if let Some(slot) = self.textures.get_mut(unit as usize) {
                            *slot = Some(texture);
                        }
                    }
                }
                other => uniform.value = Some(other),
            }
        } else {
            uniform.value = Some(value);
        }
    }

    /// Store several uniform values
    pub fn set_uniforms<'a, I>(&mut self, uniforms: I)
    where
        I: IntoIterator<Item = (&'a String, &'a UniformValue)>,
    {
        for (name, value) in uniforms {
            self.set_uniform(name.clone(), value.clone());
        }
    }

    /// Mutate a stored value in place
    ///
    /// Warns if the uniform exists but was never given a value.
    pub fn update_uniform(&mut self, name: &str, update: impl FnOnce(&mut UniformValue)) {
        if self.program.is_none() {
            match self.queued_uniforms.iter_mut().find(|(n, _)| n == name) {
                Some((_, value)) => update(value),
                None => warn!("Cannot update uninitialized uniform {}, call set_uniform first", name),
            }
            return;
        }

        let Some(&index) = self.uniform_index.get(name) else {
            return;
        };

        match &mut self.uniforms[index].value {
            Some(value) => update(value),
            None => warn!("Cannot update uninitialized uniform {}, call set_uniform first", name),
        }
    }

    /// Mutate several stored values in place
    ///
    /// Closures of different types can be mixed by boxing them as
    /// `Box<dyn FnOnce(&mut UniformValue)>`.
    pub fn update_uniforms<I, S, F>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (S, F)>,
        S: AsRef<str>,
        F: FnOnce(&mut UniformValue),
    {
        for (name, update) in updates {
            self.update_uniform(name.as_ref(), update);
        }
    }

    /// Current value of a uniform (queued or committed)
    pub fn get_uniform(&self, name: &str) -> Option<&UniformValue> {
        if self.program.is_none() {
            return self
                .queued_uniforms
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v);
        }

        self.uniform_index
            .get(name)
            .and_then(|&index| self.uniforms[index].value.as_ref())
    }

    /// Names of the uniforms the program declares, in location order
    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.iter().map(|u| u.name.as_str())
    }

    /// Release the program reference
    ///
    /// The GPU program is only deleted once no other material shares it.
    /// Queued uniform state is kept so the material can be used again.
    pub fn delete(&mut self, ctx: &mut RenderContext) {
        if self.program.take().is_some() {
            ctx.programs.release(ctx.gpu.as_mut(), self.key);
        }

        for uniform in self.uniforms.drain(..) {
            if let Some(value) = uniform.value {
                if !uniform.ty.is_sampler() {
                    self.queued_uniforms.push((uniform.name, value));
                }
            }
        }
        self.uniform_index.clear();
        self.attribute_locations.clear();
        self.textures.clear();
        self.compilation_started = false;
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(shaders::VERTEX_SHADER, shaders::FRAGMENT_SHADER)
    }
}
