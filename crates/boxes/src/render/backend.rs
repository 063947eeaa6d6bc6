//! GPU backend abstraction
//!
//! This module defines the trait a graphics device must implement for the
//! scene and resource layers to drive it. The shape follows an immediate-mode,
//! WebGL-style context: objects are created and bound, state is toggled, and
//! draw calls are issued against whatever is currently bound.
//!
//! Handles are opaque `Copy` newtypes. A backend decides what the wrapped
//! integer means; the rest of the crate only stores and passes them back.

use bitflags::bitflags;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

gpu_handle!(
    /// Vertex or index buffer
    BufferHandle
);
gpu_handle!(
    /// 2D texture or cubemap
    TextureHandle
);
gpu_handle!(
    /// Linked shader program
    ProgramHandle
);
gpu_handle!(
    /// Single compiled shader stage
    ShaderHandle
);
gpu_handle!(
    /// Off-screen render target
    FramebufferHandle
);
gpu_handle!(
    /// Depth / stencil storage attached to a framebuffer
    RenderbufferHandle
);
gpu_handle!(
    /// Cached vertex attribute layout
    VertexArrayHandle
);
gpu_handle!(
    /// Location of an active uniform within a program
    UniformLocation
);

/// Returned by [`GpuBackend::attribute_location`] when a name does not resolve
pub const ATTRIBUTE_NOT_FOUND: i32 = -1;

/// Type tag of an active uniform, as reported by program introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    /// `float`
    Float,
    /// `vec2`
    FloatVec2,
    /// `vec3`
    FloatVec3,
    /// `vec4`
    FloatVec4,
    /// `int`
    Int,
    /// `ivec2`
    IntVec2,
    /// `ivec3`
    IntVec3,
    /// `ivec4`
    IntVec4,
    /// `bool`
    Bool,
    /// `mat2`
    FloatMat2,
    /// `mat3`
    FloatMat3,
    /// `mat4`
    FloatMat4,
    /// `sampler2D`
    Sampler2D,
    /// `samplerCube`
    SamplerCube,
}

impl UniformType {
    /// Parse a GLSL type keyword
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "float" => Self::Float,
            "vec2" => Self::FloatVec2,
            "vec3" => Self::FloatVec3,
            "vec4" => Self::FloatVec4,
            "int" => Self::Int,
            "ivec2" => Self::IntVec2,
            "ivec3" => Self::IntVec3,
            "ivec4" => Self::IntVec4,
            "bool" => Self::Bool,
            "mat2" => Self::FloatMat2,
            "mat3" => Self::FloatMat3,
            "mat4" => Self::FloatMat4,
            "sampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Whether values of this type reference a texture unit
    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }
}

/// One active uniform reported by [`GpuBackend::active_uniforms`]
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    /// Declared name; array uniforms may carry a `[0]` suffix
    pub name: String,
    /// Type tag
    pub ty: UniformType,
    /// Location to upload values to
    pub location: UniformLocation,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum DrawMode {
    /// Isolated points
    Points,
    /// Line segments between vertex pairs
    Lines,
    /// Connected line strip
    LineStrip,
    /// Closed line strip
    LineLoop,
    /// Independent triangles
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Expected update frequency of buffer contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once, drawn many times
    StaticDraw,
    /// Rewritten frequently
    DynamicDraw,
}

/// Server-side capabilities toggled by `enable`/`disable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Color blending
    Blend,
    /// Face culling
    CullFace,
    /// Stencil testing
    StencilTest,
}

/// Blend equation factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
}

/// Which faces get culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    /// Front-facing polygons
    Front,
    /// Back-facing polygons
    Back,
}

/// Stencil comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilFunc {
    /// Always passes
    Always,
    /// Passes when `(ref & mask) == (stencil & mask)`
    Equal,
    /// Passes when `(ref & mask) != (stencil & mask)`
    NotEqual,
    /// Never passes
    Never,
}

/// Stencil buffer update operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Keep the current value
    Keep,
    /// Set to zero
    Zero,
    /// Replace with the reference value
    Replace,
    /// Increment, clamping at the maximum
    Incr,
    /// Decrement, clamping at zero
    Decr,
}

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

/// Texture binding point or upload target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// Plain 2D texture
    Texture2D,
    /// Whole cubemap (binding and parameters)
    CubeMap,
    /// Cubemap face +X
    CubeMapPositiveX,
    /// Cubemap face -X
    CubeMapNegativeX,
    /// Cubemap face +Y
    CubeMapPositiveY,
    /// Cubemap face -Y
    CubeMapNegativeY,
    /// Cubemap face +Z
    CubeMapPositiveZ,
    /// Cubemap face -Z
    CubeMapNegativeZ,
}

/// Pixel format of texture data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum TextureFormat {
    /// Red, green, blue, alpha
    #[default]
    Rgba,
    /// Red, green, blue
    Rgb,
    /// Alpha only
    Alpha,
    /// Luminance only
    Luminance,
    /// Luminance and alpha
    LuminanceAlpha,
}

impl TextureFormat {
    /// Number of components per pixel
    pub fn components(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Rgb => 3,
            Self::LuminanceAlpha => 2,
            Self::Alpha | Self::Luminance => 1,
        }
    }
}

/// Component type of texture data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum TextureDataType {
    /// 8 bits per component
    #[default]
    UnsignedByte,
    /// 16-bit half float per component
    HalfFloat,
    /// 32-bit float per component
    Float,
}

impl TextureDataType {
    /// Size of one component in bytes
    pub fn bytes_per_component(self) -> usize {
        match self {
            Self::UnsignedByte => 1,
            Self::HalfFloat => 2,
            Self::Float => 4,
        }
    }
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum TextureWrap {
    /// Clamp to the edge texel
    #[default]
    ClampToEdge,
    /// Tile
    Repeat,
    /// Tile, mirroring every other repetition
    MirroredRepeat,
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
    /// Bilinear within the nearest mip level
    LinearMipmapNearest,
    /// Trilinear
    LinearMipmapLinear,
}

/// A single texture parameter assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureParameter {
    /// Horizontal wrapping
    WrapS(TextureWrap),
    /// Vertical wrapping
    WrapT(TextureWrap),
    /// Minification filter
    MinFilter(TextureFilter),
    /// Magnification filter
    MagFilter(TextureFilter),
}

/// Renderbuffer storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderbufferFormat {
    /// 16-bit depth
    DepthComponent16,
    /// 8-bit stencil
    StencilIndex8,
    /// Packed depth and stencil
    DepthStencil,
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// First color attachment
    Color0,
    /// Depth
    Depth,
    /// Stencil
    Stencil,
    /// Combined depth and stencil
    DepthStencil,
}

bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Color buffer
        const COLOR = 0b001;
        /// Depth buffer
        const DEPTH = 0b010;
        /// Stencil buffer
        const STENCIL = 0b100;
    }
}

/// Immediate-mode GPU device
///
/// Every method mirrors one call of a WebGL-style context. Implementations
/// are used from a single render thread; none of the methods may block on
/// the GPU.
pub trait GpuBackend {
    // Buffers

    /// Allocate a buffer object
    fn create_buffer(&mut self) -> BufferHandle;
    /// Bind a buffer (or unbind with `None`)
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);
    /// Replace the contents of the bound buffer
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    /// Overwrite part of the bound buffer starting at `offset` bytes
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);
    /// Free a buffer object
    fn delete_buffer(&mut self, buffer: BufferHandle);

    // Vertex arrays

    /// Allocate a vertex array object
    fn create_vertex_array(&mut self) -> VertexArrayHandle;
    /// Bind a vertex array (or unbind with `None`)
    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>);
    /// Free a vertex array object
    fn delete_vertex_array(&mut self, vao: VertexArrayHandle);
    /// Enable the attribute slot
    fn enable_vertex_attrib_array(&mut self, location: u32);
    /// Describe float attribute data in the bound array buffer
    fn vertex_attrib_pointer(&mut self, location: u32, size: i32, stride: i32, offset: i32);
    /// Set the instancing divisor of an attribute slot
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32);

    // Shaders and programs

    /// Create and compile a shader stage
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderHandle;
    /// Compile status of a shader
    fn shader_compile_status(&self, shader: ShaderHandle) -> bool;
    /// Compiler diagnostics of a shader
    fn shader_info_log(&self, shader: ShaderHandle) -> String;
    /// Free a shader object
    fn delete_shader(&mut self, shader: ShaderHandle);
    /// Create a program from two compiled stages and link it
    fn link_program(&mut self, vertex: ShaderHandle, fragment: ShaderHandle) -> ProgramHandle;
    /// Link status of a program
    fn program_link_status(&self, program: ProgramHandle) -> bool;
    /// Linker diagnostics of a program
    fn program_info_log(&self, program: ProgramHandle) -> String;
    /// Make a program current (or none)
    fn use_program(&mut self, program: Option<ProgramHandle>);
    /// Free a program object
    fn delete_program(&mut self, program: ProgramHandle);
    /// Enumerate active uniforms of a linked program
    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform>;
    /// Resolve an attribute slot; [`ATTRIBUTE_NOT_FOUND`] when absent
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> i32;

    // Uniforms (current program)

    /// Upload `float`/`vecN` values; `components` is N
    fn uniform_floats(&mut self, location: UniformLocation, components: usize, data: &[f32]);
    /// Upload `int`/`ivecN`/`bool`/sampler values; `components` is N
    fn uniform_ints(&mut self, location: UniformLocation, components: usize, data: &[i32]);
    /// Upload a column-major `matN`; `dimension` is N
    fn uniform_matrix(&mut self, location: UniformLocation, dimension: usize, data: &[f32]);

    // Textures

    /// Allocate a texture object
    fn create_texture(&mut self) -> TextureHandle;
    /// Select the active texture unit
    fn active_texture(&mut self, unit: u32);
    /// Bind a texture to the active unit (or unbind with `None`)
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>);
    /// Define a mip level of the bound texture; `None` allocates uninitialised storage
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
        data_type: TextureDataType,
        data: Option<&[u8]>,
    );
    /// Set a parameter of the bound texture
    fn tex_parameter(&mut self, target: TextureTarget, parameter: TextureParameter);
    /// Generate mipmaps for the bound texture
    fn generate_mipmap(&mut self, target: TextureTarget);
    /// Free a texture object
    fn delete_texture(&mut self, texture: TextureHandle);

    // Framebuffers

    /// Allocate a framebuffer object
    fn create_framebuffer(&mut self) -> FramebufferHandle;
    /// Bind a framebuffer; `None` targets the default drawing buffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    /// Attach a 2D texture to the bound framebuffer
    fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: TextureHandle);
    /// Free a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    /// Allocate a renderbuffer object
    fn create_renderbuffer(&mut self) -> RenderbufferHandle;
    /// Bind a renderbuffer
    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>);
    /// Allocate storage for the bound renderbuffer
    fn renderbuffer_storage(&mut self, format: RenderbufferFormat, width: u32, height: u32);
    /// Attach a renderbuffer to the bound framebuffer
    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: RenderbufferHandle);
    /// Free a renderbuffer object
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    // Fixed-function state

    /// Enable a capability
    fn enable(&mut self, capability: Capability);
    /// Disable a capability
    fn disable(&mut self, capability: Capability);
    /// Set the blend function
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    /// Choose which faces are culled
    fn cull_face(&mut self, face: CullFace);
    /// Enable or disable depth writes
    fn depth_mask(&mut self, write: bool);
    /// Enable or disable writes per color channel
    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool);
    /// Set the stencil comparison
    fn stencil_func(&mut self, func: StencilFunc, reference: i32, mask: u32);
    /// Set the stencil update operations
    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);
    /// Set the stencil write mask
    fn stencil_mask(&mut self, mask: u32);
    /// Set the viewport rectangle
    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    /// Set the color used by color clears
    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    /// Clear the selected buffers of the bound target
    fn clear(&mut self, flags: ClearFlags);

    // Draws

    /// Draw non-indexed primitives
    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32);
    /// Draw with 16-bit indices from the bound element buffer
    fn draw_elements(&mut self, mode: DrawMode, count: i32, offset: i32);
    /// Instanced [`draw_arrays`](Self::draw_arrays)
    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32);
    /// Instanced [`draw_elements`](Self::draw_elements)
    fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, offset: i32, instances: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glsl_type_keywords() {
        assert_eq!(UniformType::from_glsl("mat4"), Some(UniformType::FloatMat4));
        assert_eq!(UniformType::from_glsl("samplerCube"), Some(UniformType::SamplerCube));
        assert_eq!(UniformType::from_glsl("dvec3"), None);
        assert!(UniformType::Sampler2D.is_sampler());
        assert!(!UniformType::Int.is_sampler());
    }

    #[test]
    fn test_texture_format_sizes() {
        assert_eq!(TextureFormat::Rgba.components(), 4);
        assert_eq!(TextureFormat::LuminanceAlpha.components(), 2);
        assert_eq!(TextureDataType::Float.bytes_per_component(), 4);
    }

    #[test]
    fn test_clear_flags_combine() {
        let flags = ClearFlags::COLOR | ClearFlags::STENCIL;
        assert!(flags.contains(ClearFlags::COLOR));
        assert!(!flags.contains(ClearFlags::DEPTH));
    }
}
