use std::path::PathBuf;

use marabunta::{
    context::{Config, RenderContext, Viewport},
    data_structures::{
        material::{MaterialDescriptor, MaterialId},
        mesh::MeshId,
    },
    gpu::{ProgramSource, UniformKind, recording::RecordingDevice},
    resources::mesh::{Primitive, primitive},
};

/// Scene uniforms every test program declares.
pub const SCENE_FIELDS: &[(&str, &str)] = &[
    ("projectionMatrix", "mat4x4<f32>"),
    ("viewMatrix", "mat4x4<f32>"),
    ("transformMatrix", "mat4x4<f32>"),
    ("normalMatrix", "mat3x3<f32>"),
    ("viewPosition", "vec3<f32>"),
    ("time", "f32"),
    ("lightPosition", "array<vec3<f32>, 6>"),
    ("lightColor", "array<vec3<f32>, 6>"),
    ("lightCount", "i32"),
];

/// A vertex/fragment pair whose uniform struct holds the scene uniforms plus
/// `custom`, and which samples one texture per entry of `textures`.
pub fn program(name: &str, custom: &[(&str, &str)], textures: &[&str]) -> ProgramSource {
    let fields: String = SCENE_FIELDS
        .iter()
        .chain(custom)
        .map(|(name, ty)| format!("    {name}: {ty},\n"))
        .collect();
    let uniforms = format!(
        "struct Uniforms {{\n{fields}}}\n@group(0) @binding(0) var<uniform> u: Uniforms;\n"
    );
    let vertex = format!(
        "{uniforms}\n@vertex\nfn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {{\n    \
         return u.projectionMatrix * u.viewMatrix * u.transformMatrix * vec4<f32>(position, 1.0);\n}}\n"
    );
    let mut fragment = uniforms.clone();
    if !textures.is_empty() {
        fragment.push_str("@group(1) @binding(0) var sampler0: sampler;\n");
    }
    for (i, texture) in textures.iter().enumerate() {
        fragment.push_str(&format!(
            "@group(1) @binding({}) var {texture}: texture_2d<f32>;\n",
            i + 1
        ));
    }
    fragment.push_str("\n@fragment\nfn fs_main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0);\n}\n");
    ProgramSource {
        name: name.to_string(),
        vertex,
        fragment,
    }
}

pub fn asset_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
}

pub fn context() -> RenderContext<RecordingDevice> {
    let config = Config {
        asset_root: asset_root(),
        ..Default::default()
    };
    RenderContext::new(RecordingDevice::new(), config, Viewport::new(800, 600))
}

/// Material `name` with a single float uniform called `tint`.
pub fn tinted_material(ctx: &mut RenderContext<RecordingDevice>, name: &str) -> MaterialId {
    ctx.load_material(
        &program(name, &[("tint", "f32")], &[]),
        &MaterialDescriptor::new(name).uniform("tint", UniformKind::Float),
    )
    .expect("tinted material loads")
}

pub fn triangle(ctx: &mut RenderContext<RecordingDevice>) -> MeshId {
    ctx.load_mesh(primitive(Primitive::Triangle, false).expect("triangle table"))
        .expect("triangle uploads")
}

pub fn cube(ctx: &mut RenderContext<RecordingDevice>) -> MeshId {
    ctx.load_mesh(primitive(Primitive::Cube, true).expect("cube table"))
        .expect("cube uploads")
}
