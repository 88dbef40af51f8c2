use anyhow::bail;

use crate::data_structures::mesh::{MeshData, VertexAttribute, VertexLayout};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// One triangle with red, green and blue corners.
    Triangle,
    /// The same triangle with texture coordinates.
    Plane,
    /// Unit cube around the origin, 36 vertices.
    Cube,
}

#[rustfmt::skip]
const TRIANGLE: [f32; 18] = [
    -1.0, -1.0, 0.0,  1.0, 0.0, 0.0,
     1.0, -1.0, 0.0,  0.0, 1.0, 0.0,
     0.0,  1.0, 0.0,  0.0, 0.0, 1.0,
];

#[rustfmt::skip]
const PLANE: [f32; 24] = [
    -1.0, -1.0, 0.0,  1.0, 0.0, 0.0,  0.0, 0.0,
     1.0, -1.0, 0.0,  0.0, 1.0, 0.0,  1.0, 0.0,
     0.0,  1.0, 0.0,  0.0, 0.0, 1.0,  0.5, 0.5,
];

#[rustfmt::skip]
const CUBE: [f32; 288] = [
    // -z
    -1.0,  1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 1.0,
    -1.0, -1.0, -1.0,  1.0, 0.0, 0.0,  0.0, 0.0,
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  1.0, 1.0,
     1.0, -1.0, -1.0,  0.0, 1.0, 0.0,  1.0, 0.0,
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  1.0, 1.0,
    -1.0, -1.0, -1.0,  1.0, 0.0, 0.0,  0.0, 0.0,
    // +z
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  0.0, 1.0,
    -1.0,  1.0,  1.0,  0.0, 1.0, 0.0,  0.0, 0.0,
     1.0,  1.0,  1.0,  0.0, 0.0, 1.0,  1.0, 1.0,
     1.0,  1.0,  1.0,  0.0, 0.0, 1.0,  1.0, 0.0,
     1.0, -1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 1.0,
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  0.0, 0.0,
    // +y
    -1.0,  1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 1.0,
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  0.0, 0.0,
    -1.0,  1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 1.0,
    -1.0,  1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 0.0,
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  1.0, 1.0,
     1.0,  1.0,  1.0,  0.0, 0.0, 1.0,  0.0, 0.0,
    // -y
     1.0, -1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 1.0,
    -1.0, -1.0, -1.0,  1.0, 0.0, 0.0,  0.0, 0.0,
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  1.0, 1.0,
     1.0, -1.0, -1.0,  0.0, 1.0, 0.0,  1.0, 0.0,
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  1.0, 1.0,
     1.0, -1.0,  1.0,  0.0, 1.0, 0.0,  0.0, 0.0,
    // +x
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  0.0, 1.0,
     1.0, -1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 0.0,
     1.0, -1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 1.0,
     1.0, -1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 0.0,
     1.0,  1.0,  1.0,  0.0, 0.0, 1.0,  1.0, 1.0,
     1.0,  1.0, -1.0,  0.0, 0.0, 1.0,  0.0, 0.0,
    // -x
    -1.0, -1.0, -1.0,  1.0, 0.0, 0.0,  0.0, 1.0,
    -1.0,  1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 0.0,
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  1.0, 1.0,
    -1.0,  1.0,  1.0,  0.0, 1.0, 0.0,  1.0, 0.0,
    -1.0, -1.0,  1.0,  1.0, 0.0, 0.0,  1.0, 1.0,
    -1.0,  1.0, -1.0,  0.0, 1.0, 0.0,  0.0, 0.0,
];

/// Vertex stream of a built-in shape, with or without texture coordinates.
///
/// The plain triangle carries no texture coordinates; use [`Primitive::Plane`]
/// for a textured one.
pub fn primitive(kind: Primitive, uv: bool) -> anyhow::Result<MeshData> {
    let (table, has_uv): (&[f32], bool) = match kind {
        Primitive::Triangle => (&TRIANGLE, false),
        Primitive::Plane => (&PLANE, true),
        Primitive::Cube => (&CUBE, true),
    };
    if uv && !has_uv {
        bail!("{kind:?} has no texture coordinates");
    }
    let mut attributes = vec![VertexAttribute::Position, VertexAttribute::Color];
    let vertices = if has_uv && !uv {
        table
            .chunks_exact(8)
            .flat_map(|vertex| vertex[..6].iter().copied())
            .collect()
    } else {
        if uv {
            attributes.push(VertexAttribute::TexCoord);
        }
        table.to_vec()
    };
    MeshData::new(vertices, VertexLayout::new(attributes))
}
