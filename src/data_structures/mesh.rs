//! Vertex streams and uploaded meshes.
//!
//! A [`MeshData`] is a flat `f32` stream interleaving the attributes listed in
//! its [`VertexLayout`]. Attributes are always read through
//! [`MeshData::read2`]/[`MeshData::read3`] instead of reinterpreting the
//! stream, and derived attributes are appended with [`MeshData::expand`]
//! before the data is uploaded, since they change the stride.

use anyhow::{Context, bail};
use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::gpu::VertexArrayHandle;

slotmap::new_key_type! {
    pub struct MeshId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Color,
    TexCoord,
    Normal,
    Tangent,
    Bitangent,
}

impl VertexAttribute {
    pub fn components(self) -> usize {
        match self {
            VertexAttribute::TexCoord => 2,
            _ => 3,
        }
    }

    /// `@location` the attribute is fed to in vertex shaders.
    pub fn shader_location(self) -> u32 {
        match self {
            VertexAttribute::Position => 0,
            VertexAttribute::Color => 1,
            VertexAttribute::TexCoord => 2,
            VertexAttribute::Normal => 3,
            VertexAttribute::Tangent => 4,
            VertexAttribute::Bitangent => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new(attributes: Vec<VertexAttribute>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Floats per vertex.
    pub fn stride(&self) -> usize {
        self.attributes.iter().map(|a| a.components()).sum()
    }

    pub fn stride_bytes(&self) -> usize {
        self.stride() * std::mem::size_of::<f32>()
    }

    /// Offset of `attribute` inside one vertex, in floats.
    pub fn offset_of(&self, attribute: VertexAttribute) -> Option<usize> {
        let mut offset = 0;
        for a in &self.attributes {
            if *a == attribute {
                return Some(offset);
            }
            offset += a.components();
        }
        None
    }

    pub fn contains(&self, attribute: VertexAttribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

/// CPU side vertex stream, drawn as a plain triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub layout: VertexLayout,
}

impl MeshData {
    pub fn new(vertices: Vec<f32>, layout: VertexLayout) -> anyhow::Result<Self> {
        let stride = layout.stride();
        if stride == 0 || vertices.len() % stride != 0 {
            bail!(
                "vertex stream of {} floats does not divide into vertices of {} floats",
                vertices.len(),
                stride
            );
        }
        Ok(Self { vertices, layout })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.layout.stride()
    }

    pub fn read2(&self, vertex: usize, attribute: VertexAttribute) -> Option<Vector2<f32>> {
        let at = vertex * self.layout.stride() + self.layout.offset_of(attribute)?;
        let c = self.vertices.get(at..at + 2)?;
        Some(Vector2::new(c[0], c[1]))
    }

    pub fn read3(&self, vertex: usize, attribute: VertexAttribute) -> Option<Vector3<f32>> {
        let at = vertex * self.layout.stride() + self.layout.offset_of(attribute)?;
        let c = self.vertices.get(at..at + 3)?;
        Some(Vector3::new(c[0], c[1], c[2]))
    }

    /// Append derived attributes (normals, tangents, bitangents) to every vertex.
    ///
    /// Values are computed per triangle and shared by its three corners.
    /// Tangents and bitangents need texture coordinates.
    pub fn expand(self, derived: &[VertexAttribute]) -> anyhow::Result<MeshData> {
        let derived: Vec<VertexAttribute> = derived
            .iter()
            .copied()
            .filter(|a| !self.layout.contains(*a))
            .collect();
        if derived.is_empty() {
            return Ok(self);
        }
        for attribute in &derived {
            match attribute {
                VertexAttribute::Normal => (),
                VertexAttribute::Tangent | VertexAttribute::Bitangent => {
                    if !self.layout.contains(VertexAttribute::TexCoord) {
                        bail!("{attribute:?} needs texture coordinates");
                    }
                }
                other => bail!("{other:?} cannot be derived"),
            }
        }
        if self.vertex_count() % 3 != 0 {
            bail!("{} vertices do not form a triangle list", self.vertex_count());
        }

        let mut extra: Vec<[Vector3<f32>; 3]> = Vec::with_capacity(self.vertex_count());
        for triangle in 0..self.vertex_count() / 3 {
            let [a, b, c] = [0, 1, 2].map(|i| triangle * 3 + i);
            let position = |v| self.read3(v, VertexAttribute::Position);
            let (p0, p1, p2) = (
                position(a).context("mesh has no positions")?,
                position(b).context("mesh has no positions")?,
                position(c).context("mesh has no positions")?,
            );
            let delta_pos1 = p1 - p0;
            let delta_pos2 = p2 - p0;

            let normal = delta_pos1.cross(delta_pos2);
            let normal = if normal.magnitude2() > f32::EPSILON {
                normal.normalize()
            } else {
                Vector3::zero()
            };

            let (mut tangent, mut bitangent) = (Vector3::zero(), Vector3::zero());
            if let (Some(uv0), Some(uv1), Some(uv2)) = (
                self.read2(a, VertexAttribute::TexCoord),
                self.read2(b, VertexAttribute::TexCoord),
                self.read2(c, VertexAttribute::TexCoord),
            ) {
                let delta_uv1 = uv1 - uv0;
                let delta_uv2 = uv2 - uv0;
                // delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
                // delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
                let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
                if det.abs() > f32::EPSILON {
                    let r = 1.0 / det;
                    tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
                    bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * r;
                }
            }
            for _ in 0..3 {
                extra.push([normal, tangent, bitangent]);
            }
        }

        let stride = self.layout.stride();
        let mut attributes = self.layout.attributes().to_vec();
        attributes.extend_from_slice(&derived);
        let layout = VertexLayout::new(attributes);
        let mut vertices = Vec::with_capacity(self.vertex_count() * layout.stride());
        for (vertex, [normal, tangent, bitangent]) in extra.into_iter().enumerate() {
            vertices.extend_from_slice(&self.vertices[vertex * stride..(vertex + 1) * stride]);
            for attribute in &derived {
                let value = match attribute {
                    VertexAttribute::Normal => normal,
                    VertexAttribute::Tangent => tangent,
                    _ => bitangent,
                };
                vertices.extend_from_slice(&[value.x, value.y, value.z]);
            }
        }
        MeshData::new(vertices, layout)
    }
}

/// A vertex stream living on the GPU.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertex_array: VertexArrayHandle,
    pub layout: VertexLayout,
    pub vertex_count: u32,
}
