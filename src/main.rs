//! The Marabunta world: five hundred cubes and planes scattered through a
//! 100 unit box, drawn with three materials, plus a small spinning rig of
//! triangles at the centre. The orbit camera looks at the centre of the swarm.

use anyhow::Context;
use cgmath::{EuclideanSpace, Matrix4, Point3, Vector3};
use marabunta::{
    context::{Config, RenderContext},
    data_structures::{
        light::Light,
        material::{MaterialDescriptor, MaterialId},
        mesh::VertexAttribute,
        model::{Behavior, Model},
    },
    flow,
    gpu::{GpuDevice, UniformKind, UniformValue, wgpu_device::WgpuDevice},
    resources::mesh::{Primitive, primitive},
};
use rand::Rng;

const WORLD_SIZE: i32 = 100;
const MODEL_COUNT: usize = 500;

fn main() -> anyhow::Result<()> {
    flow::run(Config::default(), build_world::<WgpuDevice>)
}

fn textured_material<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    texture_file: &str,
) -> anyhow::Result<MaterialId> {
    let material = ctx.load_material_from_assets(&MaterialDescriptor::new("textured").sampler("texture0"))?;
    let texture = ctx.load_texture_file(texture_file);
    ctx.material_mut(material)
        .context("textured material vanished")?
        .set_default_texture(0, texture);
    Ok(material)
}

fn build_world<D: GpuDevice>(ctx: &mut RenderContext<D>) -> anyhow::Result<()> {
    let primitive_material = ctx.load_material_from_assets(&MaterialDescriptor::new("primitive"))?;
    let emissive = ctx.load_material_from_assets(
        &MaterialDescriptor::new("emissive").uniform("emissive", UniformKind::Vec3),
    )?;
    let uvgrid = textured_material(ctx, "uvgrid.png")?;
    let grass = textured_material(ctx, "grass.png")?;

    let glow = ctx.create_instance(emissive, vec![UniformValue::Vec3(Vector3::new(1.0, 0.55, 0.1))])?;
    let materials = [
        (emissive, glow),
        (uvgrid, ctx.create_instance(uvgrid, vec![])?),
        (grass, ctx.create_instance(grass, vec![])?),
    ];

    let cube = ctx.load_mesh(primitive(Primitive::Cube, true)?.expand(&[VertexAttribute::Normal])?)?;
    let plane = ctx.load_mesh(primitive(Primitive::Plane, true)?.expand(&[VertexAttribute::Normal])?)?;
    let meshes = [cube, plane];

    let mut rng = rand::thread_rng();
    let mut mid_point = Vector3::new(0.0, 0.0, 0.0);
    for i in 0..MODEL_COUNT {
        let position = Vector3::new(
            rng.gen_range(0..WORLD_SIZE) as f32,
            rng.gen_range(0..WORLD_SIZE) as f32,
            rng.gen_range(0..WORLD_SIZE) as f32,
        );
        mid_point += position;
        let (material, instance) = materials[i % 3];
        ctx.add_model(
            Model::new(meshes[i % 2], material, instance).with_transform(Matrix4::from_translation(position)),
        )?;
    }
    let focus = Point3::from_vec(mid_point / MODEL_COUNT as f32);
    ctx.camera.focus = focus;

    let triangle = ctx.load_mesh(primitive(Primitive::Triangle, false)?)?;
    let plain = ctx.create_instance(primitive_material, vec![])?;
    let rig = ctx.spatial.add_root(Matrix4::from_translation(focus.to_vec()));
    ctx.add_model(
        Model::new(triangle, primitive_material, plain)
            .with_spatial(rig)
            .with_behavior(Behavior::spin(Vector3::unit_y(), 20.0)),
    )?;
    for offset in [-3.0, 3.0] {
        let arm = ctx
            .spatial
            .add_child(rig, Matrix4::from_translation(Vector3::new(offset, 0.0, 0.0)));
        ctx.add_model(
            Model::new(triangle, primitive_material, plain)
                .with_spatial(arm)
                .with_behavior(Behavior::Bob {
                    amplitude: 0.5,
                    frequency: 1.5,
                }),
        )?;
    }

    ctx.lights.add(Light::new(
        focus.to_vec() + Vector3::new(0.0, 80.0, 50.0),
        Vector3::new(1.0, 1.0, 1.0),
    ))?;
    ctx.lights.add(Light::new(focus.to_vec(), Vector3::new(0.9, 0.5, 0.2)))?;
    Ok(())
}
