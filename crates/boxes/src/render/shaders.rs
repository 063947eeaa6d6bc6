//! Built-in GLSL sources
//!
//! Used when a material is built without explicit shaders, and by
//! [`shader_pass`](crate::render::shader_pass) for full-screen effects.

/// Projects `a_vPosition` through model, view and projection matrices and
/// forwards `a_vUv`
pub const VERTEX_SHADER: &str = "\
attribute vec3 a_vPosition;
attribute vec2 a_vUv;
varying vec2 v_vUv;
uniform mat4 u_mModel;
uniform mat4 u_mView;
uniform mat4 u_mProjection;
void main() {
    v_vUv = a_vUv;
    gl_Position = u_mProjection * u_mView * u_mModel * vec4(a_vPosition, 1);
}
";

/// Visualises UV coordinates
pub const FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 v_vUv;
void main() {
    gl_FragColor = vec4(v_vUv, 1, 1);
}
";

/// Passes `a_vPosition` straight through as a clip-space position
pub const UNPROJECTED_VERTEX_SHADER: &str = "\
attribute vec3 a_vPosition;
attribute vec2 a_vUv;
varying vec2 v_vUv;
void main() {
    v_vUv = a_vUv;
    gl_Position = vec4(a_vPosition, 1);
}
";
