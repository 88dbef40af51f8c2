//! The GPU command sink.
//!
//! Everything the engine does to the graphics device goes through the
//! [`GpuDevice`] trait: compiling programs, looking up uniform slots, uploading
//! vertex and pixel data, and the per-frame bind/set/draw commands. The trait is
//! deliberately shaped like an immediate-mode API: uniforms are written to the
//! *currently used* program and persist until overwritten, texture units keep
//! their binding until rebound.
//!
//! Two sinks ship with the crate:
//!
//! - [`recording::RecordingDevice`] keeps every command in memory. Tests and
//!   headless runs use it to observe exactly what the renderer sent.
//! - [`wgpu_device::WgpuDevice`] drives a real surface through `wgpu`.

use cgmath::{Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4};

use crate::data_structures::{mesh::VertexLayout, texture::TextureData};

pub mod recording;
pub mod wgpu_device;
pub mod wgsl;

/// Opaque handle to a compiled program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque handle to an uploaded vertex array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub u32);

/// Opaque handle to an uploaded texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// A uniform slot inside one program.
///
/// Lookups that fail yield [`UniformLocation::INVALID`]; callers must not
/// forward writes to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

impl UniformLocation {
    pub const INVALID: UniformLocation = UniformLocation(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub(crate) fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

/// Vertex + fragment source pair for one material.
#[derive(Clone, Debug)]
pub struct ProgramSource {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

/// The shape of a uniform value, without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Float,
    Bool,
    Int,
}

/// A typed uniform payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
    Vec4(Vector4<f32>),
    Mat2(Matrix2<f32>),
    Mat3(Matrix3<f32>),
    Mat4(Matrix4<f32>),
    Float(f32),
    Bool(bool),
    Int(i32),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat2(_) => UniformKind::Mat2,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Int(_) => UniformKind::Int,
        }
    }

    /// Default value for a slot of the given kind.
    pub fn zero(kind: UniformKind) -> Self {
        use cgmath::{SquareMatrix, Zero};
        match kind {
            UniformKind::Vec2 => UniformValue::Vec2(Vector2::zero()),
            UniformKind::Vec3 => UniformValue::Vec3(Vector3::zero()),
            UniformKind::Vec4 => UniformValue::Vec4(Vector4::zero()),
            UniformKind::Mat2 => UniformValue::Mat2(Matrix2::identity()),
            UniformKind::Mat3 => UniformValue::Mat3(Matrix3::identity()),
            UniformKind::Mat4 => UniformValue::Mat4(Matrix4::identity()),
            UniformKind::Float => UniformValue::Float(0.0),
            UniformKind::Bool => UniformValue::Bool(false),
            UniformKind::Int => UniformValue::Int(0),
        }
    }
}

/// Immediate-mode command sink consumed by the renderer.
pub trait GpuDevice {
    /// Compile and link a program. Failure is fatal for the material that asked.
    fn compile_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle>;

    /// Resolve a named slot in `program`, or [`UniformLocation::INVALID`].
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation;

    fn create_texture(&mut self, data: &TextureData) -> anyhow::Result<TextureHandle>;

    /// Upload an interleaved float vertex stream described by `layout`.
    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: &VertexLayout,
    ) -> anyhow::Result<VertexArrayHandle>;

    /// Start a frame by clearing colour and depth targets.
    fn clear(&mut self, color: [f32; 4]);

    fn use_program(&mut self, program: ProgramHandle);

    /// Write `value` into `location` of the program currently in use.
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    /// Write a `vec3` array uniform (light positions and colours).
    fn set_uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]);

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle);

    /// Leave `unit` empty; samplers reading it see an opaque white texel.
    fn unbind_texture(&mut self, unit: usize);

    /// Draw `vertex_count` vertices of the bound vertex array as triangles.
    fn draw_arrays(&mut self, vertex_count: u32);
}
