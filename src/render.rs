//! The frame loop.
//!
//! [`Renderer`] walks the batched models of a [`RenderContext`] in draw order
//! and only touches device state when the model in hand needs something other
//! than what is already bound. What is bound survives from one frame to the
//! next, the way the device keeps it.
//!
//! Per model, in this order:
//!
//! 1. a different material binds its program;
//! 2. a material that was just bound, or is drawn for the first time this
//!    frame, receives the scene uniforms;
//! 3. a different instance, or one with pending changes, uploads its
//!    uniforms and textures;
//! 4. a different mesh binds its vertex array;
//! 5. the transform and normal matrix are sent and the draw is issued.

use cgmath::EuclideanSpace;

use crate::{
    context::RenderContext,
    data_structures::{
        frame::FrameStamp,
        material::{MaterialId, MaterialInstanceId, SceneUniforms},
        mesh::MeshId,
        model::ModelId,
    },
    gpu::GpuDevice,
};

/// State changes issued during one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub material_swaps: usize,
    pub instance_swaps: usize,
    pub mesh_swaps: usize,
    pub texture_swaps: usize,
    pub scene_flushes: usize,
    pub draw_calls: usize,
}

#[derive(Debug, Default)]
pub struct Renderer {
    current_material: Option<MaterialId>,
    current_instance: Option<MaterialInstanceId>,
    current_mesh: Option<MeshId>,
    frame: Option<FrameStamp>,
    stats: FrameStats,
    backwards: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp of the last rendered frame.
    pub fn frame(&self) -> Option<FrameStamp> {
        self.frame
    }

    /// Counters of the last rendered frame.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Advance the scene by one time step and draw every model in batch order.
    ///
    /// Panics when a model refers to a resource that is not registered.
    pub fn render_frame<D: GpuDevice>(&mut self, ctx: &mut RenderContext<D>) -> FrameStats {
        self.begin_frame(ctx);
        let count = ctx.models.len();
        let backwards = ctx.config.alternate_traversal && self.backwards;
        self.backwards = !self.backwards;
        for i in 0..count {
            let position = if backwards { count - 1 - i } else { i };
            self.draw_at(ctx, position);
        }
        self.end_frame(ctx)
    }

    /// Start a frame: new stamp, cleared targets, scene time, camera and
    /// model behaviors.
    pub fn begin_frame<D: GpuDevice>(&mut self, ctx: &mut RenderContext<D>) -> FrameStamp {
        let frame = self.frame.map_or(FrameStamp::FIRST, FrameStamp::next);
        self.frame = Some(frame);
        self.stats = FrameStats::default();

        ctx.device.clear(ctx.config.clear_color);
        let step = ctx.config.time_step;
        ctx.time += step;
        ctx.camera.update(&mut ctx.viewport, step);

        let time = ctx.time;
        for model in ctx.models.iter_mut() {
            let Some(behavior) = model.behavior.as_mut() else {
                continue;
            };
            match model.spatial {
                Some(node) => {
                    let mut local = ctx.spatial.local(node);
                    behavior.apply(&mut local, time, step);
                    ctx.spatial.set_local(node, local);
                }
                None => behavior.apply(&mut model.transform, time, step),
            }
        }
        frame
    }

    /// Draw a single model inside the current frame.
    pub fn draw_model<D: GpuDevice>(&mut self, ctx: &mut RenderContext<D>, id: ModelId) {
        let Some(position) = ctx.models.position(id) else {
            panic!("model {id:?} is not registered");
        };
        self.draw_at(ctx, position);
    }

    fn draw_at<D: GpuDevice>(&mut self, ctx: &mut RenderContext<D>, position: usize) {
        let Some(frame) = self.frame else {
            panic!("draw outside of a frame");
        };
        let RenderContext {
            device,
            camera,
            lights,
            spatial,
            time,
            textures,
            texture_units,
            meshes,
            materials,
            instances,
            models,
            ..
        } = ctx;
        let model = &models.native_sequence()[position];
        let key = model.key();
        let Some(material) = materials.get_mut(key.material) else {
            panic!("model at {position} refers to an unknown material");
        };

        let mut bound = false;
        if self.current_material != Some(key.material) {
            material.bind(device);
            self.current_material = Some(key.material);
            self.stats.material_swaps += 1;
            bound = true;
        }
        let first_use = material.mark_used(frame);
        if bound || first_use {
            let scene = SceneUniforms {
                projection: camera.projection(),
                view: camera.view(),
                view_position: camera.position().to_vec(),
                time: *time,
                lights,
            };
            material.flush_scene(device, &scene);
            self.stats.scene_flushes += 1;
        }

        let Some(instance) = instances.get_mut(key.instance) else {
            panic!("model at {position} refers to an unknown material instance");
        };
        assert!(
            instance.material() == key.material,
            "model at {position} draws {} with an instance of another material",
            material.name()
        );
        if self.current_instance != Some(key.instance)
            || instance.is_dirty()
            || material.textures_dirty()
        {
            self.stats.texture_swaps +=
                material.use_instance(device, key.instance, instance, texture_units, textures);
            self.current_instance = Some(key.instance);
            self.stats.instance_swaps += 1;
        }

        let Some(mesh) = meshes.get(key.mesh) else {
            panic!("model at {position} refers to an unknown mesh");
        };
        if self.current_mesh != Some(key.mesh) {
            device.bind_vertex_array(mesh.vertex_array);
            self.current_mesh = Some(key.mesh);
            self.stats.mesh_swaps += 1;
        }

        let transform = match model.spatial {
            Some(node) => spatial.combined(node, frame),
            None => model.transform,
        };
        material.set_transform(device, transform);
        device.draw_arrays(mesh.vertex_count);
        self.stats.draw_calls += 1;
    }

    /// Finish the frame: light changes are settled, counters are logged.
    pub fn end_frame<D: GpuDevice>(&mut self, ctx: &mut RenderContext<D>) -> FrameStats {
        ctx.lights.clear_dirty();
        let stats = self.stats;
        if ctx.config.log_frame_stats
            && let Some(frame) = self.frame
        {
            log::debug!(
                "frame {}: {} material swaps, {} instance swaps, {} mesh swaps, {} texture swaps, {} scene flushes, {} draws",
                frame.get(),
                stats.material_swaps,
                stats.instance_swaps,
                stats.mesh_swaps,
                stats.texture_swaps,
                stats.scene_flushes,
                stats.draw_calls
            );
        }
        stats
    }
}
