use cgmath::{Matrix3, Matrix4, SquareMatrix, Vector3};
use marabunta::{
    data_structures::{
        material::{MaterialDescriptor, MaterialInstance, SceneUniform, normal_matrix},
        model::Model,
        texture::{MAX_TEXTURE_UNITS, TextureData},
    },
    gpu::{UniformKind, UniformValue, recording::Command},
    render::Renderer,
};

use crate::common::test_utils::{context, program, tinted_material, triangle};
mod common;

fn texture_binds(commands: &[Command]) -> Vec<(usize, u32)> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::BindTexture { unit, texture } => Some((*unit, texture.0)),
            _ => None,
        })
        .collect()
}

#[test]
fn should_resolve_declared_uniforms() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let material = ctx.material(material).unwrap();

    assert_eq!(material.name(), "tinted");
    assert_eq!(material.missing_uniforms(), 0);
    assert_eq!(material.custom_kinds(), &[UniformKind::Float]);
    assert!(material.custom_location(0).is_valid());
    for scene in SceneUniform::ALL {
        assert!(material.scene_location(scene).is_valid(), "{}", scene.name());
    }
}

#[test]
fn should_absorb_uniforms_the_program_does_not_use() {
    let mut ctx = context();
    let material = ctx
        .load_material(
            &program("partial", &[("tint", "f32")], &[]),
            &MaterialDescriptor::new("partial")
                .uniform("tint", UniformKind::Float)
                .uniform("ghost", UniformKind::Vec3),
        )
        .unwrap();
    assert_eq!(ctx.material(material).unwrap().missing_uniforms(), 1);
    assert!(!ctx.material(material).unwrap().custom_location(1).is_valid());

    let mesh = triangle(&mut ctx);
    let instance = ctx
        .create_instance(
            material,
            vec![UniformValue::Float(0.5), UniformValue::Vec3(Vector3::new(1.0, 2.0, 3.0))],
        )
        .unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();
    Renderer::new().render_frame(&mut ctx);

    assert_eq!(ctx.device.uniform_writes("tint"), vec![UniformValue::Float(0.5)]);
    assert!(ctx.device.uniform_writes("ghost").is_empty());
    assert_eq!(ctx.device.draw_count(), 1);
}

#[test]
fn should_count_scene_uniforms_missing_from_asset_programs() {
    let mut ctx = context();
    let material = ctx
        .load_material_from_assets(&MaterialDescriptor::new("primitive"))
        .unwrap();
    let material = ctx.material(material).unwrap();

    assert_eq!(material.missing_uniforms(), 5);
    assert!(material.scene_location(SceneUniform::Projection).is_valid());
    assert!(!material.scene_location(SceneUniform::LightPosition).is_valid());
}

#[test]
fn should_skip_the_normal_matrix_when_the_program_lacks_it() {
    let mut ctx = context();
    let material = ctx
        .load_material_from_assets(&MaterialDescriptor::new("primitive"))
        .unwrap();
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![]).unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();

    Renderer::new().render_frame(&mut ctx);

    assert_eq!(ctx.device.uniform_writes("transformMatrix").len(), 1);
    assert!(ctx.device.uniform_writes("normalMatrix").is_empty());
}

#[test]
fn should_fail_when_the_program_does_not_compile() {
    let mut ctx = context();
    ctx.device.fail_compilation_of("broken");

    let result = ctx.load_material(
        &program("broken", &[], &[]),
        &MaterialDescriptor::new("broken"),
    );

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}

#[test]
fn should_fail_for_an_empty_shader_stage() {
    let mut ctx = context();
    let mut source = program("hollow", &[], &[]);
    source.fragment.clear();

    assert!(ctx.load_material(&source, &MaterialDescriptor::new("hollow")).is_err());
}

#[test]
fn should_fail_when_assets_are_missing() {
    let mut ctx = context();

    assert!(ctx
        .load_material_from_assets(&MaterialDescriptor::new("does_not_exist"))
        .is_err());
}

#[test]
fn should_refuse_more_samplers_than_texture_units() {
    let mut ctx = context();
    let names: Vec<String> = (0..=MAX_TEXTURE_UNITS).map(|i| format!("texture{i}")).collect();
    let descriptor = names
        .iter()
        .fold(MaterialDescriptor::new("greedy"), |d, name| d.sampler(name.as_str()));

    assert!(ctx.load_material(&program("greedy", &[], &[]), &descriptor).is_err());
}

#[test]
fn should_assign_sampler_units_in_declaration_order() {
    let mut ctx = context();
    ctx.device.clear_commands();
    let material = ctx
        .load_material(
            &program("layered", &[], &["base", "detail"]),
            &MaterialDescriptor::new("layered").sampler("base").sampler("detail"),
        )
        .unwrap();

    assert_eq!(ctx.material(material).unwrap().sampler_count(), 2);
    assert_eq!(ctx.device.uniform_writes("base"), vec![UniformValue::Int(0)]);
    assert_eq!(ctx.device.uniform_writes("detail"), vec![UniformValue::Int(1)]);
}

#[test]
fn should_reject_instances_that_do_not_match_the_material() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");

    assert!(ctx.create_instance(material, vec![]).is_err());
    assert!(ctx
        .create_instance(material, vec![UniformValue::Float(1.0), UniformValue::Float(2.0)])
        .is_err());
    assert!(ctx.create_instance(material, vec![UniformValue::Int(1)]).is_err());
    assert!(ctx.create_instance(material, vec![UniformValue::Float(1.0)]).is_ok());
}

#[test]
fn should_create_instances_with_zero_values() {
    let mut ctx = context();
    let id = tinted_material(&mut ctx, "tinted");
    let material = ctx.material(id).unwrap();

    let instance = MaterialInstance::with_defaults(id, material);

    assert_eq!(instance.material(), id);
    assert_eq!(instance.len(), 1);
    assert_eq!(instance.get(0), &UniformValue::Float(0.0));
    assert!(instance.uniform(0).is_pending());
}

#[test]
#[should_panic(expected = "changes kind")]
fn should_refuse_to_change_the_kind_of_a_value() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();

    ctx.instance_mut(instance)
        .unwrap()
        .set(0, UniformValue::Vec3(Vector3::new(0.0, 0.0, 0.0)));
}

#[test]
fn should_fall_back_to_the_material_texture() {
    let mut ctx = context();
    let material = ctx
        .load_material(
            &program("textured", &[], &["texture0"]),
            &MaterialDescriptor::new("textured").sampler("texture0"),
        )
        .unwrap();
    let default = ctx.load_texture(TextureData::solid([255, 0, 0, 255])).unwrap();
    let special = ctx.load_texture(TextureData::solid([0, 0, 255, 255])).unwrap();
    ctx.material_mut(material)
        .unwrap()
        .set_default_texture(0, Some(default));
    let plain = ctx.create_instance(material, vec![]).unwrap();
    let marked = ctx.create_instance(material, vec![]).unwrap();
    ctx.instance_mut(marked)
        .unwrap()
        .set_texture(0, Some(special));
    let mesh = triangle(&mut ctx);
    ctx.add_model(Model::new(mesh, material, plain)).unwrap();
    ctx.add_model(Model::new(mesh, material, plain)).unwrap();
    ctx.add_model(Model::new(mesh, material, marked)).unwrap();
    ctx.device.clear_commands();

    let mut renderer = Renderer::new();
    let stats = renderer.render_frame(&mut ctx);

    let default = ctx.texture(default).unwrap().handle.0;
    let special = ctx.texture(special).unwrap().handle.0;
    assert_eq!(
        texture_binds(&ctx.device.take_commands()),
        vec![(0, default), (0, special)]
    );
    assert_eq!(stats.texture_swaps, 2);

    // the unit still holds `special` when the next frame starts with `plain`
    let stats = renderer.render_frame(&mut ctx);
    assert_eq!(
        texture_binds(&ctx.device.take_commands()),
        vec![(0, default), (0, special)]
    );
    assert_eq!(stats.texture_swaps, 2);
}

#[test]
fn should_bind_a_changed_default_texture_while_the_instance_stays_current() {
    let mut ctx = context();
    let material = ctx
        .load_material(
            &program("textured", &[], &["texture0"]),
            &MaterialDescriptor::new("textured").sampler("texture0"),
        )
        .unwrap();
    let grass = ctx.load_texture(TextureData::solid([0, 255, 0, 255])).unwrap();
    let sand = ctx.load_texture(TextureData::solid([255, 255, 0, 255])).unwrap();
    ctx.material_mut(material)
        .unwrap()
        .set_default_texture(0, Some(grass));
    let instance = ctx.create_instance(material, vec![]).unwrap();
    let mesh = triangle(&mut ctx);
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();
    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    ctx.device.clear_commands();

    ctx.material_mut(material)
        .unwrap()
        .set_default_texture(0, Some(sand));
    let stats = renderer.render_frame(&mut ctx);

    let sand = ctx.texture(sand).unwrap().handle.0;
    assert_eq!(texture_binds(&ctx.device.take_commands()), vec![(0, sand)]);
    assert_eq!(stats.texture_swaps, 1);

    let stats = renderer.render_frame(&mut ctx);
    assert!(texture_binds(&ctx.device.take_commands()).is_empty());
    assert_eq!(stats.instance_swaps, 0);
}

#[test]
fn should_empty_units_that_no_texture_is_assigned_to() {
    let mut ctx = context();
    let textured = ctx
        .load_material(
            &program("textured", &[], &["texture0"]),
            &MaterialDescriptor::new("textured").sampler("texture0"),
        )
        .unwrap();
    let blank = ctx
        .load_material(
            &program("blank", &[], &["texture0"]),
            &MaterialDescriptor::new("blank").sampler("texture0"),
        )
        .unwrap();
    let grid = ctx.load_texture(TextureData::solid([10, 20, 30, 255])).unwrap();
    ctx.material_mut(textured)
        .unwrap()
        .set_default_texture(0, Some(grid));
    let textured_instance = ctx.create_instance(textured, vec![]).unwrap();
    let blank_instance = ctx.create_instance(blank, vec![]).unwrap();
    let mesh = triangle(&mut ctx);
    ctx.add_model(Model::new(mesh, textured, textured_instance)).unwrap();
    ctx.add_model(Model::new(mesh, blank, blank_instance)).unwrap();
    ctx.device.clear_commands();

    let stats = Renderer::new().render_frame(&mut ctx);

    let grid = ctx.texture(grid).unwrap().handle.0;
    let commands = ctx.device.take_commands();
    let blank_program = ctx.material(blank).unwrap().program();
    let unbind_at = commands
        .iter()
        .position(|c| matches!(c, Command::UnbindTexture { unit: 0 }))
        .expect("unit 0 is emptied for the blank material");
    let blank_draw = commands
        .iter()
        .position(|c| matches!(c, Command::DrawArrays { program, .. } if *program == blank_program))
        .unwrap();
    assert_eq!(texture_binds(&commands), vec![(0, grid)]);
    assert!(unbind_at < blank_draw);
    assert_eq!(stats.texture_swaps, 2);
}

#[test]
fn should_not_rebind_a_texture_shared_by_instances() {
    let mut ctx = context();
    let material = ctx
        .load_material(
            &program("textured", &[("tint", "f32")], &["texture0"]),
            &MaterialDescriptor::new("textured")
                .uniform("tint", UniformKind::Float)
                .sampler("texture0"),
        )
        .unwrap();
    let shared = ctx.load_texture(TextureData::solid([255, 255, 255, 255])).unwrap();
    ctx.material_mut(material)
        .unwrap()
        .set_default_texture(0, Some(shared));
    let first = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    let second = ctx.create_instance(material, vec![UniformValue::Float(2.0)]).unwrap();
    let mesh = triangle(&mut ctx);
    ctx.add_model(Model::new(mesh, material, first)).unwrap();
    ctx.add_model(Model::new(mesh, material, second)).unwrap();
    ctx.device.clear_commands();

    let stats = Renderer::new().render_frame(&mut ctx);

    assert_eq!(texture_binds(ctx.device.commands()).len(), 1);
    assert_eq!(stats.instance_swaps, 2);
    assert_eq!(stats.texture_swaps, 1);
}

#[test]
fn should_load_textures_from_the_asset_root() {
    let mut ctx = context();

    let grid = ctx.load_texture_file("uvgrid.png").unwrap();
    let missing = ctx.load_texture_file("no_such_texture.png");

    let data = &ctx.texture(grid).unwrap().data;
    assert!(data.width > 0 && data.height > 0);
    assert!(missing.is_none());
    assert_eq!(
        ctx.device
            .count(|c| matches!(c, Command::CreateTexture { .. })),
        1
    );
}

#[test]
fn should_invert_and_transpose_for_normal_matrix() {
    let scale = Matrix4::from_nonuniform_scale(2.0, 4.0, 1.0);
    let normal = normal_matrix(scale * Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)));

    assert_eq!(normal, Matrix3::from_diagonal(Vector3::new(0.5, 0.25, 1.0)));
    assert_eq!(normal_matrix(Matrix4::from_scale(0.0)), Matrix3::identity());
}

#[test]
fn should_upload_the_transform_of_every_draw() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    let transform = Matrix4::from_translation(Vector3::new(0.0, 3.0, 0.0));
    ctx.add_model(Model::new(mesh, material, instance).with_transform(transform))
        .unwrap();

    Renderer::new().render_frame(&mut ctx);

    assert_eq!(
        ctx.device.uniform_writes("transformMatrix"),
        vec![UniformValue::Mat4(transform)]
    );
    assert_eq!(
        ctx.device.uniform_writes("normalMatrix"),
        vec![UniformValue::Mat3(Matrix3::identity())]
    );
}
