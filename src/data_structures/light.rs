use anyhow::bail;
use cgmath::Vector3;

/// Capacity of the scene light list; shaders size their arrays to match.
pub const MAX_LIGHTS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vector3<f32>,
    pub color: Vector3<f32>,
}

impl Light {
    pub fn new(position: Vector3<f32>, color: Vector3<f32>) -> Self {
        Self { position, color }
    }
}

/// Scene-wide lights with change tracking.
///
/// Every change bumps a revision so materials can tell whether their copy of
/// the light uniforms is current. The dirty flag covers the current frame only
/// and is cleared by the renderer once the frame is done.
#[derive(Debug, Default)]
pub struct LightSet {
    lights: Vec<Light>,
    dirty: bool,
    revision: u64,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, light: Light) -> anyhow::Result<usize> {
        if self.lights.len() >= MAX_LIGHTS {
            bail!("the scene already holds the maximum of {MAX_LIGHTS} lights");
        }
        self.lights.push(light);
        self.touch();
        Ok(self.lights.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn set_position(&mut self, index: usize, position: Vector3<f32>) {
        self.lights[index].position = position;
        self.touch();
    }

    pub fn set_color(&mut self, index: usize, color: Vector3<f32>) {
        self.lights[index].color = color;
        self.touch();
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.lights.iter().map(|l| l.position.into()).collect()
    }

    pub fn colors(&self) -> Vec<[f32; 3]> {
        self.lights.iter().map(|l| l.color.into()).collect()
    }
}
