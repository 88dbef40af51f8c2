//! Materials and material instances.
//!
//! A [`Material`] is a compiled program plus the table of uniform locations it
//! exposes. The first [`SceneUniform::COUNT`] entries are the scene uniforms
//! every material receives (camera, time, lights, per-draw transform); the
//! rest are the custom uniforms the material declared, in declaration order.
//!
//! A [`MaterialInstance`] holds values for exactly those custom uniforms plus
//! texture assignments. Binding an instance only uploads slots whose GPU copy
//! was last written by a different instance, or whose value changed since it
//! was last sent.

use anyhow::{Context, bail};
use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix, Vector3};
use slotmap::SlotMap;

use crate::{
    data_structures::{
        frame::FrameStamp,
        light::LightSet,
        texture::{MAX_TEXTURE_UNITS, Texture, TextureId, TextureUnits},
    },
    gpu::{GpuDevice, ProgramHandle, ProgramSource, UniformKind, UniformLocation, UniformValue},
};

slotmap::new_key_type! {
    pub struct MaterialId;
    pub struct MaterialInstanceId;
}

/// Uniforms owned by the scene rather than by a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneUniform {
    Projection,
    View,
    Transform,
    NormalMatrix,
    Time,
    LightColor,
    LightPosition,
    LightCount,
    ViewPosition,
}

impl SceneUniform {
    pub const COUNT: usize = 9;

    pub const ALL: [SceneUniform; SceneUniform::COUNT] = [
        SceneUniform::Projection,
        SceneUniform::View,
        SceneUniform::Transform,
        SceneUniform::NormalMatrix,
        SceneUniform::Time,
        SceneUniform::LightColor,
        SceneUniform::LightPosition,
        SceneUniform::LightCount,
        SceneUniform::ViewPosition,
    ];

    /// Name the uniform has in shader source.
    pub fn name(self) -> &'static str {
        match self {
            SceneUniform::Projection => "projectionMatrix",
            SceneUniform::View => "viewMatrix",
            SceneUniform::Transform => "transformMatrix",
            SceneUniform::NormalMatrix => "normalMatrix",
            SceneUniform::Time => "time",
            SceneUniform::LightColor => "lightColor",
            SceneUniform::LightPosition => "lightPosition",
            SceneUniform::LightCount => "lightCount",
            SceneUniform::ViewPosition => "viewPosition",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Values broadcast to every material once per bind within a frame.
#[derive(Clone, Copy, Debug)]
pub struct SceneUniforms<'a> {
    pub projection: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub view_position: Vector3<f32>,
    pub time: f32,
    pub lights: &'a LightSet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

/// What a material needs besides its program source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialDescriptor {
    pub name: String,
    pub uniforms: Vec<UniformDecl>,
    /// Sampler `i` reads texture unit `i`.
    pub samplers: Vec<String>,
}

impl MaterialDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn uniform(mut self, name: impl Into<String>, kind: UniformKind) -> Self {
        self.uniforms.push(UniformDecl {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn sampler(mut self, name: impl Into<String>) -> Self {
        self.samplers.push(name.into());
        self
    }
}

#[derive(Debug)]
pub struct Material {
    name: String,
    program: ProgramHandle,
    /// Scene uniforms first, then the custom ones.
    locations: Vec<UniformLocation>,
    kinds: Vec<UniformKind>,
    samplers: Vec<UniformLocation>,
    textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
    /// Set when a default texture changed since the last instance bind.
    textures_dirty: bool,
    /// Instance whose value each custom slot currently holds on the GPU.
    slot_owners: Vec<Option<MaterialInstanceId>>,
    last_used: Option<FrameStamp>,
    light_revision: Option<u64>,
    missing_uniforms: usize,
}

impl Material {
    /// Compile `source` and resolve every slot `descriptor` names.
    ///
    /// Names the program does not expose resolve to
    /// [`UniformLocation::INVALID`]; they are counted and logged, writes to
    /// them are dropped.
    pub fn new<D: GpuDevice>(
        device: &mut D,
        source: &ProgramSource,
        descriptor: &MaterialDescriptor,
    ) -> anyhow::Result<Self> {
        if descriptor.samplers.len() > MAX_TEXTURE_UNITS {
            bail!(
                "material {} declares {} samplers, only {} texture units exist",
                descriptor.name,
                descriptor.samplers.len(),
                MAX_TEXTURE_UNITS
            );
        }
        let program = device
            .compile_program(source)
            .with_context(|| format!("compiling material {}", descriptor.name))?;

        let mut missing_uniforms = 0;
        let mut locations = Vec::with_capacity(SceneUniform::COUNT + descriptor.uniforms.len());
        for scene in SceneUniform::ALL {
            let location = device.uniform_location(program, scene.name());
            if !location.is_valid() {
                log::debug!("material {} does not use {}", descriptor.name, scene.name());
                missing_uniforms += 1;
            }
            locations.push(location);
        }
        for decl in &descriptor.uniforms {
            let location = device.uniform_location(program, &decl.name);
            if !location.is_valid() {
                log::warn!("uniform {} not found in material {}", decl.name, descriptor.name);
                missing_uniforms += 1;
            }
            locations.push(location);
        }

        device.use_program(program);
        let mut samplers = Vec::with_capacity(descriptor.samplers.len());
        for (unit, name) in descriptor.samplers.iter().enumerate() {
            let location = device.uniform_location(program, name);
            if location.is_valid() {
                device.set_uniform(location, &UniformValue::Int(unit as i32));
            } else {
                log::warn!("sampler {} not found in material {}", name, descriptor.name);
                missing_uniforms += 1;
            }
            samplers.push(location);
        }

        Ok(Self {
            name: descriptor.name.clone(),
            program,
            locations,
            kinds: descriptor.uniforms.iter().map(|d| d.kind).collect(),
            samplers,
            textures: [None; MAX_TEXTURE_UNITS],
            textures_dirty: false,
            slot_owners: vec![None; descriptor.uniforms.len()],
            last_used: None,
            light_revision: None,
            missing_uniforms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn scene_location(&self, uniform: SceneUniform) -> UniformLocation {
        self.locations[uniform.index()]
    }

    /// Location of custom uniform `slot`.
    pub fn custom_location(&self, slot: usize) -> UniformLocation {
        self.locations[SceneUniform::COUNT + slot]
    }

    /// Kinds of the custom uniforms, in declaration order.
    pub fn custom_kinds(&self) -> &[UniformKind] {
        &self.kinds
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    /// How many declared names the program did not expose.
    pub fn missing_uniforms(&self) -> usize {
        self.missing_uniforms
    }

    /// Texture used on `unit` by instances that do not assign one.
    pub fn set_default_texture(&mut self, unit: usize, texture: Option<TextureId>) {
        assert!(
            unit < self.samplers.len(),
            "material {} has no sampler for unit {unit}",
            self.name
        );
        self.textures[unit] = texture;
        self.textures_dirty = true;
    }

    /// Whether a default texture changed since an instance was last bound.
    pub fn textures_dirty(&self) -> bool {
        self.textures_dirty
    }

    pub fn bind<D: GpuDevice>(&self, device: &mut D) {
        device.use_program(self.program);
    }

    /// Record that the material is drawn in `frame`.
    ///
    /// Returns `true` the first time per frame.
    pub fn mark_used(&mut self, frame: FrameStamp) -> bool {
        if self.last_used == Some(frame) {
            return false;
        }
        self.last_used = Some(frame);
        true
    }

    /// Send camera, time and (when they changed since this material last saw
    /// them) light uniforms. The material must be bound.
    pub fn flush_scene<D: GpuDevice>(&mut self, device: &mut D, scene: &SceneUniforms<'_>) {
        self.set_scene(device, SceneUniform::Projection, UniformValue::Mat4(scene.projection));
        self.set_scene(device, SceneUniform::View, UniformValue::Mat4(scene.view));
        self.set_scene(device, SceneUniform::Time, UniformValue::Float(scene.time));
        self.set_scene(device, SceneUniform::ViewPosition, UniformValue::Vec3(scene.view_position));

        let revision = scene.lights.revision();
        if self.light_revision != Some(revision) {
            let positions = self.scene_location(SceneUniform::LightPosition);
            if positions.is_valid() {
                device.set_uniform_vec3_array(positions, &scene.lights.positions());
            }
            let colors = self.scene_location(SceneUniform::LightColor);
            if colors.is_valid() {
                device.set_uniform_vec3_array(colors, &scene.lights.colors());
            }
            let count = UniformValue::Int(scene.lights.len() as i32);
            self.set_scene(device, SceneUniform::LightCount, count);
            self.light_revision = Some(revision);
        }
    }

    /// Send the per-draw model and normal matrices.
    pub fn set_transform<D: GpuDevice>(&self, device: &mut D, transform: Matrix4<f32>) {
        self.set_scene(device, SceneUniform::Transform, UniformValue::Mat4(transform));
        if self.scene_location(SceneUniform::NormalMatrix).is_valid() {
            let normal = normal_matrix(transform);
            self.set_scene(device, SceneUniform::NormalMatrix, UniformValue::Mat3(normal));
        }
    }

    fn set_scene<D: GpuDevice>(&self, device: &mut D, uniform: SceneUniform, value: UniformValue) {
        let location = self.scene_location(uniform);
        if location.is_valid() {
            device.set_uniform(location, &value);
        }
    }

    /// Make `instance` the source of this material's custom uniforms and textures.
    ///
    /// A slot is uploaded when another instance wrote it last or when the
    /// instance changed it since. Units without a texture are emptied.
    /// Returns the number of texture binds and unbinds issued.
    pub fn use_instance<D: GpuDevice>(
        &mut self,
        device: &mut D,
        id: MaterialInstanceId,
        instance: &mut MaterialInstance,
        units: &mut TextureUnits,
        textures: &SlotMap<TextureId, Texture>,
    ) -> usize {
        for (slot, uniform) in instance.uniforms.iter_mut().enumerate() {
            let owner = &mut self.slot_owners[slot];
            if *owner == Some(id) && !uniform.forward {
                continue;
            }
            let location = self.locations[SceneUniform::COUNT + slot];
            if location.is_valid() {
                device.set_uniform(location, &uniform.value);
            }
            *owner = Some(id);
            uniform.forward = false;
        }

        let mut binds = 0;
        for unit in 0..self.samplers.len() {
            let changed = match instance.textures[unit].or(self.textures[unit]) {
                Some(texture) => units.use_texture(device, textures, texture, unit),
                None => units.clear_unit(device, unit),
            };
            if changed {
                binds += 1;
            }
        }
        instance.textures_dirty = false;
        self.textures_dirty = false;
        binds
    }
}

/// Inverse transpose of the upper 3x3, identity for singular transforms.
pub fn normal_matrix(transform: Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );
    upper
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(Matrix3::identity)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniform {
    value: UniformValue,
    /// Set when `value` still has to reach the GPU.
    forward: bool,
}

impl Uniform {
    pub fn value(&self) -> &UniformValue {
        &self.value
    }

    pub fn is_pending(&self) -> bool {
        self.forward
    }
}

#[derive(Clone, Debug)]
pub struct MaterialInstance {
    material: MaterialId,
    uniforms: Vec<Uniform>,
    textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
    textures_dirty: bool,
}

impl MaterialInstance {
    /// Values must match the material's custom uniforms in number and kind.
    pub fn new(
        material_id: MaterialId,
        material: &Material,
        values: Vec<UniformValue>,
    ) -> anyhow::Result<Self> {
        let kinds = material.custom_kinds();
        if values.len() != kinds.len() {
            bail!(
                "material {} declares {} uniforms, instance provides {}",
                material.name(),
                kinds.len(),
                values.len()
            );
        }
        for (slot, (value, kind)) in values.iter().zip(kinds).enumerate() {
            if value.kind() != *kind {
                bail!(
                    "uniform {} of material {} is {:?}, instance provides {:?}",
                    slot,
                    material.name(),
                    kind,
                    value.kind()
                );
            }
        }
        Ok(Self {
            material: material_id,
            uniforms: values
                .into_iter()
                .map(|value| Uniform {
                    value,
                    forward: true,
                })
                .collect(),
            textures: [None; MAX_TEXTURE_UNITS],
            textures_dirty: true,
        })
    }

    /// An instance with every custom uniform at its zero value.
    pub fn with_defaults(material_id: MaterialId, material: &Material) -> Self {
        let values: Vec<UniformValue> = material
            .custom_kinds()
            .iter()
            .map(|kind| UniformValue::zero(*kind))
            .collect();
        Self {
            material: material_id,
            uniforms: values
                .into_iter()
                .map(|value| Uniform {
                    value,
                    forward: true,
                })
                .collect(),
            textures: [None; MAX_TEXTURE_UNITS],
            textures_dirty: true,
        }
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }

    pub fn uniform(&self, slot: usize) -> &Uniform {
        &self.uniforms[slot]
    }

    pub fn get(&self, slot: usize) -> &UniformValue {
        &self.uniforms[slot].value
    }

    /// Change a value; it is sent on the next draw that uses this instance.
    pub fn set(&mut self, slot: usize, value: UniformValue) {
        let uniform = &mut self.uniforms[slot];
        assert_eq!(
            uniform.value.kind(),
            value.kind(),
            "uniform {slot} changes kind"
        );
        uniform.value = value;
        uniform.forward = true;
    }

    pub fn texture(&self, unit: usize) -> Option<TextureId> {
        self.textures[unit]
    }

    pub fn set_texture(&mut self, unit: usize, texture: Option<TextureId>) {
        self.textures[unit] = texture;
        self.textures_dirty = true;
    }

    /// Whether anything changed since the instance was last bound.
    pub fn is_dirty(&self) -> bool {
        self.textures_dirty || self.uniforms.iter().any(|u| u.forward)
    }
}
