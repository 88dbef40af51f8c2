use cgmath::{Deg, Matrix4, Rad, SquareMatrix, Vector3};

use crate::data_structures::{
    batch::{BatchId, Batched},
    material::{MaterialId, MaterialInstanceId},
    mesh::MeshId,
    spatial::SpatialId,
};

/// Handle of a model inside the batched registry.
pub type ModelId = BatchId;

/// Draw order: material first, then instance, then mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchKey {
    pub material: MaterialId,
    pub instance: MaterialInstanceId,
    pub mesh: MeshId,
}

/// Per-frame animation attached to a model.
pub enum Behavior {
    /// Rotate around `axis` at `speed` per unit of scene time.
    Spin { axis: Vector3<f32>, speed: Rad<f32> },
    /// Move up and down around the starting point.
    Bob { amplitude: f32, frequency: f32 },
    /// Arbitrary update of the transform: `(transform, time, step)`.
    Custom(Box<dyn FnMut(&mut Matrix4<f32>, f32, f32)>),
}

impl Behavior {
    pub fn spin(axis: Vector3<f32>, degrees_per_time: f32) -> Self {
        Behavior::Spin {
            axis,
            speed: Deg(degrees_per_time).into(),
        }
    }

    /// Advance `transform` by one step of length `step` ending at `time`.
    pub fn apply(&mut self, transform: &mut Matrix4<f32>, time: f32, step: f32) {
        use cgmath::InnerSpace;

        match self {
            Behavior::Spin { axis, speed } => {
                if axis.magnitude2() > f32::EPSILON {
                    *transform = *transform * Matrix4::from_axis_angle(axis.normalize(), *speed * step);
                }
            }
            Behavior::Bob {
                amplitude,
                frequency,
            } => {
                let before = (*frequency * (time - step)).sin() * *amplitude;
                let after = (*frequency * time).sin() * *amplitude;
                *transform = Matrix4::from_translation(Vector3::new(0.0, after - before, 0.0)) * *transform;
            }
            Behavior::Custom(update) => update(transform, time, step),
        }
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Spin { axis, speed } => f
                .debug_struct("Spin")
                .field("axis", axis)
                .field("speed", speed)
                .finish(),
            Behavior::Bob {
                amplitude,
                frequency,
            } => f
                .debug_struct("Bob")
                .field("amplitude", amplitude)
                .field("frequency", frequency)
                .finish(),
            Behavior::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// One drawable: which mesh to draw, with which material instance, where.
///
/// The batch key is fixed at construction since changing it would break the
/// order of the registry the model lives in.
#[derive(Debug)]
pub struct Model {
    key: BatchKey,
    /// World transform, used when the model has no spatial node.
    pub transform: Matrix4<f32>,
    /// Node whose combined matrix replaces `transform`.
    pub spatial: Option<SpatialId>,
    pub behavior: Option<Behavior>,
}

impl Model {
    pub fn new(mesh: MeshId, material: MaterialId, instance: MaterialInstanceId) -> Self {
        Self {
            key: BatchKey {
                material,
                instance,
                mesh,
            },
            transform: Matrix4::identity(),
            spatial: None,
            behavior: None,
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_spatial(mut self, spatial: SpatialId) -> Self {
        self.spatial = Some(spatial);
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn key(&self) -> BatchKey {
        self.key
    }

    pub fn mesh(&self) -> MeshId {
        self.key.mesh
    }

    pub fn material(&self) -> MaterialId {
        self.key.material
    }

    pub fn instance(&self) -> MaterialInstanceId {
        self.key.instance
    }
}

impl Batched for Model {
    type Key = BatchKey;

    fn batch_key(&self) -> BatchKey {
        self.key
    }
}
