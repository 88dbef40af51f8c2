//! Everything a frame needs, in one place.
//!
//! A [`RenderContext`] owns the device, every resource registry, the scene
//! globals (camera, lights, time) and the viewport input state. Applications
//! fill it at startup; the [`crate::render::Renderer`] then walks it once per
//! frame. Several contexts can live side by side, each with its own device.

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use slotmap::SlotMap;

use crate::{
    camera::Camera,
    data_structures::{
        batch::BatchedVec,
        light::LightSet,
        material::{
            Material, MaterialDescriptor, MaterialId, MaterialInstance, MaterialInstanceId,
        },
        mesh::{Mesh, MeshData, MeshId},
        model::{Model, ModelId},
        spatial::SpatialTree,
        texture::{Texture, TextureData, TextureId, TextureUnits},
    },
    gpu::{GpuDevice, ProgramSource, UniformValue},
    resources,
};

/// Window and input state the scene reacts to.
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Cursor position in physical pixels.
    pub cursor: (f32, f32),
    /// Scroll accumulated since the camera last looked.
    pub scroll: f32,
    pub should_close: bool,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cursor: (width as f32 / 2.0, height as f32 / 2.0),
            scroll: 0.0,
            should_close: false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Cursor position as a fraction of the surface size.
    pub fn cursor_fraction(&self) -> (f32, f32) {
        let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
        (self.cursor.0 / w, self.cursor.1 / h)
    }

    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub window_title: String,
    pub clear_color: [f32; 4],
    /// Scene time added per frame.
    pub time_step: f32,
    /// Directory holding `materials/` and texture files.
    pub asset_root: PathBuf,
    /// Walk the batches back to front on every other frame so the state left
    /// bound by one frame is what the next one starts with.
    pub alternate_traversal: bool,
    /// Log the per-frame swap counters at debug level.
    pub log_frame_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_title: "marabunta".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            time_step: 0.1,
            asset_root: resources::asset_root(),
            alternate_traversal: false,
            log_frame_stats: true,
        }
    }
}

pub struct RenderContext<D: GpuDevice> {
    pub device: D,
    pub config: Config,
    pub viewport: Viewport,
    pub camera: Camera,
    pub lights: LightSet,
    pub spatial: SpatialTree,
    /// Scene time, advanced by `config.time_step` every frame.
    pub time: f32,
    pub(crate) textures: SlotMap<TextureId, Texture>,
    pub(crate) texture_units: TextureUnits,
    pub(crate) meshes: SlotMap<MeshId, Mesh>,
    pub(crate) materials: SlotMap<MaterialId, Material>,
    pub(crate) instances: SlotMap<MaterialInstanceId, MaterialInstance>,
    pub(crate) models: BatchedVec<Model>,
}

impl<D: GpuDevice> RenderContext<D> {
    pub fn new(device: D, config: Config, viewport: Viewport) -> Self {
        Self {
            device,
            config,
            viewport,
            camera: Camera::default(),
            lights: LightSet::new(),
            spatial: SpatialTree::new(),
            time: 0.0,
            textures: SlotMap::with_key(),
            texture_units: TextureUnits::default(),
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            instances: SlotMap::with_key(),
            models: BatchedVec::new(),
        }
    }

    pub fn load_texture(&mut self, data: TextureData) -> anyhow::Result<TextureId> {
        let handle = self.device.create_texture(&data)?;
        log::info!("loaded {}x{} texture", data.width, data.height);
        Ok(self.textures.insert(Texture { handle, data }))
    }

    /// Decode and upload `name` from the asset root.
    ///
    /// Failures are logged and yield `None`; the scene renders without it.
    pub fn load_texture_file(&mut self, name: &str) -> Option<TextureId> {
        let loaded = resources::texture::load_texture(&self.config.asset_root, name)
            .and_then(|data| self.load_texture(data));
        match loaded {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("skipping texture {name}: {err:#}");
                None
            }
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn load_mesh(&mut self, data: MeshData) -> anyhow::Result<MeshId> {
        let vertex_array = self
            .device
            .create_vertex_array(&data.vertices, &data.layout)?;
        let vertex_count = data.vertex_count() as u32;
        Ok(self.meshes.insert(Mesh {
            vertex_array,
            layout: data.layout,
            vertex_count,
        }))
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn load_material(
        &mut self,
        source: &ProgramSource,
        descriptor: &MaterialDescriptor,
    ) -> anyhow::Result<MaterialId> {
        let material = Material::new(&mut self.device, source, descriptor)?;
        log::info!(
            "loaded material {} ({} missing uniforms)",
            material.name(),
            material.missing_uniforms()
        );
        Ok(self.materials.insert(material))
    }

    /// Load `materials/<name>_vertex.wgsl` and `_fragment.wgsl` from the asset
    /// root, where `name` is the descriptor's name.
    pub fn load_material_from_assets(
        &mut self,
        descriptor: &MaterialDescriptor,
    ) -> anyhow::Result<MaterialId> {
        let source = resources::load_program_source(&self.config.asset_root, &descriptor.name)?;
        self.load_material(&source, descriptor)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    /// An instance of `material` holding `values` for its custom uniforms.
    pub fn create_instance(
        &mut self,
        material: MaterialId,
        values: Vec<UniformValue>,
    ) -> anyhow::Result<MaterialInstanceId> {
        let owner = self
            .materials
            .get(material)
            .context("instance of an unknown material")?;
        let instance = MaterialInstance::new(material, owner, values)?;
        Ok(self.instances.insert(instance))
    }

    pub fn instance(&self, id: MaterialInstanceId) -> Option<&MaterialInstance> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: MaterialInstanceId) -> Option<&mut MaterialInstance> {
        self.instances.get_mut(id)
    }

    pub fn add_model(&mut self, model: Model) -> anyhow::Result<ModelId> {
        if !self.meshes.contains_key(model.mesh()) {
            bail!("model refers to an unknown mesh");
        }
        if !self.materials.contains_key(model.material()) {
            bail!("model refers to an unknown material");
        }
        let Some(instance) = self.instances.get(model.instance()) else {
            bail!("model refers to an unknown material instance");
        };
        if instance.material() != model.material() {
            bail!("model instance belongs to a different material");
        }
        if let Some(spatial) = model.spatial
            && spatial.index() >= self.spatial.len()
        {
            bail!("model refers to an unknown spatial node");
        }
        Ok(self.models.insert(model))
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(id)
    }

    /// Models in draw order.
    pub fn models(&self) -> &[Model] {
        self.models.native_sequence()
    }
}
