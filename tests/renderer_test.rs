use cgmath::{Matrix4, Vector3};
use marabunta::{
    context::RenderContext,
    data_structures::{
        light::Light,
        material::MaterialId,
        model::{Behavior, Model},
        spatial::SpatialTree,
    },
    gpu::{
        ProgramHandle, UniformValue,
        recording::{Command, RecordingDevice},
    },
    render::Renderer,
};

use crate::common::test_utils::{context, cube, tinted_material, triangle};
mod common;

fn scene_flushes_of(commands: &[Command], program: ProgramHandle) -> usize {
    commands
        .iter()
        .filter(|c| {
            matches!(c, Command::SetUniform { program: p, name, .. }
                if *p == program && name == "projectionMatrix")
        })
        .count()
}

fn draw_programs(commands: &[Command]) -> Vec<ProgramHandle> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::DrawArrays { program, .. } => Some(*program),
            _ => None,
        })
        .collect()
}

fn program_of(ctx: &RenderContext<RecordingDevice>, id: MaterialId) -> ProgramHandle {
    ctx.material(id).unwrap().program()
}

#[test]
fn should_bind_shared_state_once_per_frame() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let dim = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    let bright = ctx.create_instance(material, vec![UniformValue::Float(2.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, dim)).unwrap();
    ctx.add_model(Model::new(mesh, material, bright)).unwrap();
    ctx.device.clear_commands();

    let mut renderer = Renderer::new();
    let stats = renderer.render_frame(&mut ctx);

    let device = &ctx.device;
    assert_eq!(device.count(|c| matches!(c, Command::UseProgram(_))), 1);
    assert_eq!(device.count(|c| matches!(c, Command::BindVertexArray(_))), 1);
    assert_eq!(device.uniform_writes("projectionMatrix").len(), 1);
    assert_eq!(
        device.uniform_writes("tint"),
        vec![UniformValue::Float(1.0), UniformValue::Float(2.0)]
    );
    assert_eq!(device.uniform_writes("transformMatrix").len(), 2);
    assert_eq!(device.draw_count(), 2);

    assert_eq!(stats.material_swaps, 1);
    assert_eq!(stats.scene_flushes, 1);
    assert_eq!(stats.instance_swaps, 2);
    assert_eq!(stats.mesh_swaps, 1);
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn should_keep_bound_state_across_frames() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();

    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    ctx.device.clear_commands();
    let stats = renderer.render_frame(&mut ctx);

    assert_eq!(stats.material_swaps, 0);
    assert_eq!(stats.instance_swaps, 0);
    assert_eq!(stats.mesh_swaps, 0);
    // camera and time still change every frame
    assert_eq!(stats.scene_flushes, 1);
    assert_eq!(ctx.device.uniform_writes("time").len(), 1);
    assert!(ctx.device.uniform_writes("tint").is_empty());
    assert_eq!(ctx.device.draw_count(), 1);
}

#[test]
fn should_flush_scene_again_when_a_material_is_rebound() {
    let mut ctx = context();
    let a = tinted_material(&mut ctx, "a");
    let b = tinted_material(&mut ctx, "b");
    let mesh = triangle(&mut ctx);
    let a_instance = ctx.create_instance(a, vec![UniformValue::Float(0.0)]).unwrap();
    let b_instance = ctx.create_instance(b, vec![UniformValue::Float(0.0)]).unwrap();
    let first = ctx.add_model(Model::new(mesh, a, a_instance)).unwrap();
    let second = ctx.add_model(Model::new(mesh, b, b_instance)).unwrap();
    let third = ctx.add_model(Model::new(mesh, a, a_instance)).unwrap();
    ctx.device.clear_commands();

    let mut renderer = Renderer::new();
    renderer.begin_frame(&mut ctx);
    renderer.draw_model(&mut ctx, first);
    renderer.draw_model(&mut ctx, second);
    renderer.draw_model(&mut ctx, third);
    let stats = renderer.end_frame(&mut ctx);

    let commands = ctx.device.commands();
    assert_eq!(scene_flushes_of(commands, program_of(&ctx, a)), 2);
    assert_eq!(scene_flushes_of(commands, program_of(&ctx, b)), 1);
    assert_eq!(stats.material_swaps, 3);
    assert_eq!(stats.scene_flushes, 3);
    assert_eq!(stats.draw_calls, 3);
}

#[test]
fn should_flush_scene_once_for_consecutive_models() {
    let mut ctx = context();
    let a = tinted_material(&mut ctx, "a");
    let b = tinted_material(&mut ctx, "b");
    let mesh = triangle(&mut ctx);
    let a_instance = ctx.create_instance(a, vec![UniformValue::Float(0.0)]).unwrap();
    let b_instance = ctx.create_instance(b, vec![UniformValue::Float(0.0)]).unwrap();
    for _ in 0..3 {
        ctx.add_model(Model::new(mesh, a, a_instance)).unwrap();
        ctx.add_model(Model::new(mesh, b, b_instance)).unwrap();
    }
    ctx.device.clear_commands();

    let stats = Renderer::new().render_frame(&mut ctx);

    let commands = ctx.device.commands();
    assert_eq!(scene_flushes_of(commands, program_of(&ctx, a)), 1);
    assert_eq!(scene_flushes_of(commands, program_of(&ctx, b)), 1);
    assert_eq!(stats.material_swaps, 2);
    assert_eq!(stats.instance_swaps, 2);
    assert_eq!(stats.draw_calls, 6);
}

#[test]
fn should_send_instance_changes_exactly_once() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();
    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    ctx.device.clear_commands();

    ctx.instance_mut(instance).unwrap().set(0, UniformValue::Float(3.0));
    assert!(ctx.instance(instance).unwrap().is_dirty());
    renderer.render_frame(&mut ctx);
    renderer.render_frame(&mut ctx);

    assert_eq!(ctx.device.uniform_writes("tint"), vec![UniformValue::Float(3.0)]);
    assert!(!ctx.instance(instance).unwrap().is_dirty());
}

#[test]
fn should_keep_changes_pending_until_the_instance_is_drawn() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let drawn = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    let idle = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, drawn)).unwrap();

    ctx.instance_mut(idle).unwrap().set(0, UniformValue::Float(5.0));
    Renderer::new().render_frame(&mut ctx);

    let idle = ctx.instance(idle).unwrap();
    assert!(idle.is_dirty());
    assert!(idle.uniform(0).is_pending());
}

#[test]
fn should_resend_lights_only_after_they_change() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();
    ctx.lights
        .add(Light::new(Vector3::new(0.0, 10.0, 0.0), Vector3::new(1.0, 1.0, 1.0)))
        .unwrap();
    let light_uploads = |commands: &[Command]| {
        commands
            .iter()
            .filter(|c| matches!(c, Command::SetUniformVec3Array { name, .. } if name == "lightPosition"))
            .count()
    };

    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    assert_eq!(light_uploads(&ctx.device.take_commands()), 1);
    assert!(!ctx.lights.is_dirty());

    renderer.render_frame(&mut ctx);
    assert_eq!(light_uploads(&ctx.device.take_commands()), 0);

    ctx.lights.set_position(0, Vector3::new(5.0, 10.0, 0.0));
    renderer.render_frame(&mut ctx);
    let commands = ctx.device.take_commands();
    assert_eq!(light_uploads(&commands), 1);
    assert!(commands.contains(&Command::SetUniformVec3Array {
        program: program_of(&ctx, material),
        name: "lightPosition".to_string(),
        values: vec![[5.0, 10.0, 0.0]],
    }));
}

#[test]
fn should_send_light_count_with_the_lights() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(1.0)]).unwrap();
    ctx.add_model(Model::new(mesh, material, instance)).unwrap();
    for x in [1.0, 2.0] {
        ctx.lights
            .add(Light::new(Vector3::new(x, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)))
            .unwrap();
    }

    Renderer::new().render_frame(&mut ctx);

    assert_eq!(ctx.device.uniform_writes("lightCount"), vec![UniformValue::Int(2)]);
}

#[test]
fn should_reject_instances_of_other_materials() {
    let mut ctx = context();
    let a = tinted_material(&mut ctx, "a");
    let b = tinted_material(&mut ctx, "b");
    let mesh = triangle(&mut ctx);
    let b_instance = ctx.create_instance(b, vec![UniformValue::Float(0.0)]).unwrap();

    assert!(ctx.add_model(Model::new(mesh, a, b_instance)).is_err());
    assert!(ctx.models().is_empty());
}

#[test]
fn should_reject_unknown_spatial_nodes() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(0.0)]).unwrap();

    let mut other = SpatialTree::new();
    other.add_root(Matrix4::from_scale(1.0));
    let foreign = other.add_root(Matrix4::from_scale(1.0));

    let model = Model::new(mesh, material, instance).with_spatial(foreign);
    assert!(ctx.add_model(model).is_err());
}

#[test]
fn should_draw_spatial_models_with_their_combined_transform() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(0.0)]).unwrap();
    let root = ctx.spatial.add_root(Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)));
    let child = ctx
        .spatial
        .add_child(root, Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0)));
    ctx.add_model(
        Model::new(mesh, material, instance)
            .with_spatial(child)
            .with_transform(Matrix4::from_scale(100.0)),
    )
    .unwrap();

    Renderer::new().render_frame(&mut ctx);

    assert_eq!(
        ctx.device.uniform_writes("transformMatrix"),
        vec![UniformValue::Mat4(Matrix4::from_translation(Vector3::new(1.0, 2.0, 0.0)))]
    );
}

#[test]
fn should_reuse_spatial_results_within_a_frame() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(0.0)]).unwrap();
    let root = ctx.spatial.add_root(Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)));
    for x in [-1.0, 1.0] {
        let arm = ctx
            .spatial
            .add_child(root, Matrix4::from_translation(Vector3::new(x, 0.0, 0.0)));
        ctx.add_model(Model::new(mesh, material, instance).with_spatial(arm))
            .unwrap();
    }

    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    assert_eq!(ctx.spatial.recompute_count(), 3);
    renderer.render_frame(&mut ctx);
    assert_eq!(ctx.spatial.recompute_count(), 6);
}

#[test]
fn should_animate_models_with_behaviors() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = cube(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(0.0)]).unwrap();
    let bobbing = ctx
        .add_model(Model::new(mesh, material, instance).with_behavior(Behavior::Bob {
            amplitude: 1.0,
            frequency: 2.0,
        }))
        .unwrap();
    let counted = ctx
        .add_model(
            Model::new(mesh, material, instance).with_behavior(Behavior::Custom(Box::new(
                |transform, _time, _step| {
                    *transform = Matrix4::from_translation(Vector3::new(0.0, 0.0, 1.0)) * *transform;
                },
            ))),
        )
        .unwrap();

    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    renderer.render_frame(&mut ctx);

    let lifted = ctx.model(bobbing).unwrap().transform.w.y;
    let expected = (2.0f32 * 0.2).sin();
    assert!((lifted - expected).abs() < 1e-4, "{lifted} != {expected}");
    assert_eq!(ctx.model(counted).unwrap().transform.w.z, 2.0);
    assert!((ctx.time - 0.2).abs() < 1e-6);
}

#[test]
fn should_animate_spatial_nodes_through_behaviors() {
    let mut ctx = context();
    let material = tinted_material(&mut ctx, "tinted");
    let mesh = triangle(&mut ctx);
    let instance = ctx.create_instance(material, vec![UniformValue::Float(0.0)]).unwrap();
    let root = ctx.spatial.add_root(Matrix4::from_scale(1.0));
    let child = ctx
        .spatial
        .add_child(root, Matrix4::from_translation(Vector3::new(0.0, 0.0, 3.0)));
    ctx.add_model(Model::new(mesh, material, instance).with_spatial(child))
        .unwrap();
    ctx.add_model(
        Model::new(mesh, material, instance)
            .with_spatial(root)
            .with_behavior(Behavior::Custom(Box::new(|transform, _time, _step| {
                *transform = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)) * *transform;
            }))),
    )
    .unwrap();

    Renderer::new().render_frame(&mut ctx);

    let writes = ctx.device.uniform_writes("transformMatrix");
    assert!(writes.contains(&UniformValue::Mat4(Matrix4::from_translation(Vector3::new(
        1.0, 0.0, 3.0
    )))));
}

#[test]
fn should_reverse_traversal_on_alternate_frames() {
    let mut ctx = context();
    ctx.config.alternate_traversal = true;
    let a = tinted_material(&mut ctx, "a");
    let b = tinted_material(&mut ctx, "b");
    let mesh = triangle(&mut ctx);
    let a_instance = ctx.create_instance(a, vec![UniformValue::Float(0.0)]).unwrap();
    let b_instance = ctx.create_instance(b, vec![UniformValue::Float(0.0)]).unwrap();
    ctx.add_model(Model::new(mesh, b, b_instance)).unwrap();
    ctx.add_model(Model::new(mesh, a, a_instance)).unwrap();
    let (pa, pb) = (program_of(&ctx, a), program_of(&ctx, b));

    let mut renderer = Renderer::new();
    renderer.render_frame(&mut ctx);
    assert_eq!(draw_programs(&ctx.device.take_commands()), vec![pa, pb]);

    let stats = renderer.render_frame(&mut ctx);
    assert_eq!(draw_programs(&ctx.device.take_commands()), vec![pb, pa]);
    // b is still bound from the end of the previous frame
    assert_eq!(stats.material_swaps, 1);
}

#[test]
fn should_count_frames_with_increasing_stamps() {
    let mut ctx = context();
    let mut renderer = Renderer::new();
    assert!(renderer.frame().is_none());

    renderer.render_frame(&mut ctx);
    let first = renderer.frame().unwrap();
    renderer.render_frame(&mut ctx);
    let second = renderer.frame().unwrap();

    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);
    assert_eq!(ctx.device.count(|c| matches!(c, Command::Clear(_))), 2);
}
