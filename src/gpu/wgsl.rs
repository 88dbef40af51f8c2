//! Uniform reflection for WGSL programs.
//!
//! Programs declare their loose uniforms in one struct bound as
//! `@group(0) @binding(0) var<uniform>` and their textures as
//! `@group(1) @binding(n) var name: texture_2d<f32>;` where texture unit
//! `n - 1` feeds binding `n` (binding 0 is the shared sampler).
//!
//! Every stage is parsed and validated with naga. [`UniformBlock::reflect`]
//! turns the uniform struct into a flat list of named slots carrying the byte
//! offsets naga laid out, which is what gives the immediate-mode
//! `uniform_location` lookup something to resolve against.

use anyhow::{Context, anyhow, bail};
use naga::{
    AddressSpace, ArraySize, ImageClass, ImageDimension, Module, ResourceBinding, Scalar,
    ScalarKind, ShaderStage, TypeInner, VectorSize,
    valid::{Capabilities, ValidationFlags, Validator},
};

use crate::gpu::{ProgramSource, UniformValue};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

const UNIFORM_BINDING: ResourceBinding = ResourceBinding {
    group: 0,
    binding: 0,
};
const TEXTURE_GROUP: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderType {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ShaderType {
    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match (scalar.kind, scalar.width) {
            (ScalarKind::Float, 4) => Some(ShaderType::F32),
            (ScalarKind::Sint, 4) => Some(ShaderType::I32),
            (ScalarKind::Uint, 4) => Some(ShaderType::U32),
            _ => None,
        }
    }

    fn from_inner(inner: &TypeInner) -> Option<Self> {
        let is_f32 = |scalar: &Scalar| scalar.kind == ScalarKind::Float && scalar.width == 4;
        match inner {
            TypeInner::Scalar(scalar) => Self::from_scalar(*scalar),
            TypeInner::Vector { size, scalar } if is_f32(scalar) => Some(match size {
                VectorSize::Bi => ShaderType::Vec2,
                VectorSize::Tri => ShaderType::Vec3,
                VectorSize::Quad => ShaderType::Vec4,
            }),
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } if is_f32(scalar) && columns == rows => Some(match columns {
                VectorSize::Bi => ShaderType::Mat2,
                VectorSize::Tri => ShaderType::Mat3,
                VectorSize::Quad => ShaderType::Mat4,
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlotKind {
    Uniform {
        ty: ShaderType,
        array_len: Option<u32>,
    },
    Texture {
        unit: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub name: String,
    pub kind: SlotKind,
    /// Byte offset inside the uniform block; zero for textures.
    pub offset: u32,
}

/// Flattened view of a program's loose uniforms and texture slots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformBlock {
    pub slots: Vec<Slot>,
    /// Size of the uniform struct in bytes, rounded up to 16.
    pub size: u32,
}

fn round_up(align: u32, value: u32) -> u32 {
    value.div_ceil(align) * align
}

fn parse(source: &str) -> anyhow::Result<Module> {
    naga::front::wgsl::parse_str(source).map_err(|err| anyhow!(err.emit_to_string(source)))
}

fn validate(module: &Module, source: &str) -> anyhow::Result<()> {
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(module)
        .map_err(|err| anyhow!(err.emit_to_string(source)))?;
    Ok(())
}

fn has_entry_point(module: &Module, stage: ShaderStage, name: &str) -> bool {
    module
        .entry_points
        .iter()
        .any(|entry| entry.stage == stage && entry.name == name)
}

/// Slots and struct size declared by one stage.
fn reflect_module(module: &Module) -> anyhow::Result<(Vec<Slot>, u32)> {
    let mut slots = Vec::new();
    let mut size = 0;
    for (_, global) in module.global_variables.iter() {
        let name = global.name.as_deref().unwrap_or("<unnamed>");
        let inner = &module.types[global.ty].inner;
        match (global.space, inner) {
            (AddressSpace::Uniform, _) if global.binding != Some(UNIFORM_BINDING) => {
                bail!("uniform `{name}` must be bound at @group(0) @binding(0)");
            }
            (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                size = *span;
                for member in members {
                    let Some(member_name) = member.name.clone() else {
                        continue;
                    };
                    let member_inner = &module.types[member.ty].inner;
                    let (ty, array_len) = match member_inner {
                        TypeInner::Array { base, size: length, .. } => {
                            let ArraySize::Constant(len) = length else {
                                bail!("array `{member_name}` needs a constant length in a uniform block");
                            };
                            let element = ShaderType::from_inner(&module.types[*base].inner)
                                .with_context(|| format!("unsupported array element type in `{member_name}`"))?;
                            (element, Some(len.get()))
                        }
                        other => {
                            let ty = ShaderType::from_inner(other)
                                .with_context(|| format!("unsupported uniform type of `{member_name}`"))?;
                            (ty, None)
                        }
                    };
                    slots.push(Slot {
                        name: member_name,
                        kind: SlotKind::Uniform { ty, array_len },
                        offset: member.offset,
                    });
                }
            }
            (AddressSpace::Uniform, _) => bail!("uniform `{name}` is not a struct"),
            (_, TypeInner::Image { dim, arrayed, class }) => {
                let Some(binding) = &global.binding else {
                    bail!("texture `{name}` has no binding");
                };
                if binding.group != TEXTURE_GROUP {
                    bail!("texture `{name}` must live in @group(1), not @group({})", binding.group);
                }
                if binding.binding == 0 {
                    bail!("binding 0 of group 1 is reserved for the sampler");
                }
                if *dim != ImageDimension::D2 || *arrayed || !matches!(class, ImageClass::Sampled { .. }) {
                    bail!("texture `{name}` must be a texture_2d");
                }
                slots.push(Slot {
                    name: name.to_string(),
                    kind: SlotKind::Texture {
                        unit: binding.binding as usize - 1,
                    },
                    offset: 0,
                });
            }
            _ => (),
        }
    }
    Ok((slots, size))
}

impl UniformBlock {
    /// Parse, reflect and validate every source of a program.
    ///
    /// Slots are merged across sources by name; two sources that declare the
    /// same name with a different type or offset are an error.
    pub fn reflect(sources: &[&str]) -> anyhow::Result<Self> {
        let modules = sources
            .iter()
            .map(|source| parse(source))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::from_modules(modules.iter().zip(sources.iter().copied()))
    }

    /// Reflect a vertex + fragment pair and check their entry points.
    pub fn reflect_program(source: &ProgramSource) -> anyhow::Result<Self> {
        let vertex = parse(&source.vertex).with_context(|| format!("vertex stage of {}", source.name))?;
        if !has_entry_point(&vertex, ShaderStage::Vertex, VERTEX_ENTRY) {
            bail!("vertex stage of {} has no @vertex {VERTEX_ENTRY}", source.name);
        }
        let fragment =
            parse(&source.fragment).with_context(|| format!("fragment stage of {}", source.name))?;
        if !has_entry_point(&fragment, ShaderStage::Fragment, FRAGMENT_ENTRY) {
            bail!("fragment stage of {} has no @fragment {FRAGMENT_ENTRY}", source.name);
        }
        Self::from_modules([(&vertex, source.vertex.as_str()), (&fragment, source.fragment.as_str())])
            .with_context(|| format!("reflecting uniforms of {}", source.name))
    }

    fn from_modules<'a>(modules: impl IntoIterator<Item = (&'a Module, &'a str)>) -> anyhow::Result<Self> {
        let mut block = UniformBlock::default();
        for (module, source) in modules {
            let (slots, size) = reflect_module(module)?;
            validate(module, source)?;
            for slot in slots {
                block.merge(slot)?;
            }
            block.size = block.size.max(size);
        }
        block.size = round_up(16, block.size).max(16);
        Ok(block)
    }

    fn merge(&mut self, slot: Slot) -> anyhow::Result<()> {
        match self.slots.iter().find(|s| s.name == slot.name) {
            Some(existing) if *existing == slot => Ok(()),
            Some(existing) => bail!(
                "stages disagree on `{}`: {:?} at {} against {:?} at {}",
                slot.name,
                existing.kind,
                existing.offset,
                slot.kind,
                slot.offset
            ),
            None => {
                self.slots.push(slot);
                Ok(())
            }
        }
    }

    pub fn location(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    /// Texture units sampled by the program.
    pub fn texture_units(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(|slot| match slot.kind {
            SlotKind::Texture { unit } => Some(unit),
            _ => None,
        })
    }

    /// Encode `value` into `staging` at the slot's offset.
    ///
    /// Integer writes to a texture slot are sampler-unit assignments, which
    /// are fixed by the binding number; they are accepted when consistent.
    pub fn write(&self, staging: &mut [u8], index: usize, value: &UniformValue) -> anyhow::Result<()> {
        let slot = self
            .slots
            .get(index)
            .with_context(|| format!("uniform slot {index} out of range"))?;
        let (ty, array_len) = match &slot.kind {
            SlotKind::Texture { unit } => {
                return match value {
                    UniformValue::Int(u) if *u as usize == *unit => Ok(()),
                    _ => bail!("texture `{}` is fixed to unit {unit}", slot.name),
                };
            }
            SlotKind::Uniform { ty, array_len } => (*ty, *array_len),
        };
        if array_len.is_some() {
            bail!("`{}` is an array; write it with a vec3 array", slot.name);
        }
        let at = slot.offset as usize;
        match (value, ty) {
            (UniformValue::Float(v), ShaderType::F32) => put(staging, at, bytemuck::bytes_of(v)),
            (UniformValue::Int(v), ShaderType::I32) => put(staging, at, bytemuck::bytes_of(v)),
            (UniformValue::Int(v), ShaderType::U32) => put(staging, at, bytemuck::bytes_of(&(*v as u32))),
            (UniformValue::Bool(v), ShaderType::U32 | ShaderType::I32) => {
                put(staging, at, bytemuck::bytes_of(&(*v as u32)))
            }
            (UniformValue::Vec2(v), ShaderType::Vec2) => {
                let v: [f32; 2] = (*v).into();
                put(staging, at, bytemuck::cast_slice(&v))
            }
            (UniformValue::Vec3(v), ShaderType::Vec3) => {
                let v: [f32; 3] = (*v).into();
                put(staging, at, bytemuck::cast_slice(&v))
            }
            (UniformValue::Vec4(v), ShaderType::Vec4) => {
                let v: [f32; 4] = (*v).into();
                put(staging, at, bytemuck::cast_slice(&v))
            }
            (UniformValue::Mat2(m), ShaderType::Mat2) => {
                let m: [[f32; 2]; 2] = (*m).into();
                put(staging, at, bytemuck::cast_slice(&m))
            }
            (UniformValue::Mat3(m), ShaderType::Mat3) => {
                let m: [[f32; 3]; 3] = (*m).into();
                // every column of a mat3x3 is padded to 16 bytes
                for (col, column) in m.iter().enumerate() {
                    put(staging, at + col * 16, bytemuck::cast_slice(column))?;
                }
                Ok(())
            }
            (UniformValue::Mat4(m), ShaderType::Mat4) => {
                let m: [[f32; 4]; 4] = (*m).into();
                put(staging, at, bytemuck::cast_slice(&m))
            }
            (value, ty) => bail!("cannot write {:?} into `{}` of type {ty:?}", value.kind(), slot.name),
        }
    }

    pub fn write_vec3_array(&self, staging: &mut [u8], index: usize, values: &[[f32; 3]]) -> anyhow::Result<()> {
        let slot = self
            .slots
            .get(index)
            .with_context(|| format!("uniform slot {index} out of range"))?;
        let SlotKind::Uniform {
            ty: ShaderType::Vec3 | ShaderType::Vec4,
            array_len: Some(len),
        } = slot.kind
        else {
            bail!("`{}` is not a vec3 array", slot.name);
        };
        for (i, value) in values.iter().take(len as usize).enumerate() {
            put(staging, slot.offset as usize + i * 16, bytemuck::cast_slice(value))?;
        }
        Ok(())
    }
}

fn put(staging: &mut [u8], at: usize, bytes: &[u8]) -> anyhow::Result<()> {
    let Some(target) = staging.get_mut(at..at + bytes.len()) else {
        bail!("uniform write at {at} overruns a {} byte block", staging.len());
    };
    target.copy_from_slice(bytes);
    Ok(())
}
