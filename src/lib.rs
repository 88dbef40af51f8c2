//! marabunta
//!
//! A small batching renderer. Models are kept sorted by material, material
//! instance and mesh so that a single walk over them binds every program,
//! uniform set and vertex array as few times as possible. Uniform values are
//! only re-sent when they changed or when another instance overwrote them, and
//! hierarchical transforms are computed at most once per frame.
//!
//! High-level modules
//! - `camera`: orbit, fixed-angle, orthographic and free-fly cameras
//! - `context`: the render context holding device, registries and scene globals
//! - `data_structures`: batches, materials, meshes, models, spatial nodes, textures
//! - `flow`: window, input handling and the frame loop
//! - `gpu`: the device trait plus the recording and wgpu implementations
//! - `pipelines`: wgpu pipeline construction for material programs
//! - `resources`: loading shader sources and textures, built-in meshes
//! - `render`: the per-frame state machine
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod gpu;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
