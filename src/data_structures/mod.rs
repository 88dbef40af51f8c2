//! Engine data structures.
//!
//! - `batch` keeps models sorted into draw batches behind stable ids
//! - `frame` has the frame stamp used by every per-frame cache
//! - `light` holds the scene lights
//! - `material` has materials and their per-object instances
//! - `mesh` describes vertex streams before and after upload
//! - `model` ties mesh, material instance and transform together
//! - `spatial` computes hierarchical world transforms
//! - `texture` holds pixel data and the texture unit cache

pub mod batch;
pub mod frame;
pub mod light;
pub mod material;
pub mod mesh;
pub mod model;
pub mod spatial;
pub mod texture;
