//! The scene camera.
//!
//! One camera is active per context. Its matrices are rebuilt every frame from
//! the [`Viewport`] (cursor position, scroll, surface size) so the renderer
//! only ever reads [`Camera::view`], [`Camera::projection`] and
//! [`Camera::position`].

use std::f32::consts::PI;

use cgmath::{
    Deg, EuclideanSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, Vector4, ortho, perspective,
};

use crate::context::Viewport;

/// cgmath builds OpenGL clip space (z in -1..1), wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Cursor travel across the whole surface turns the orbit by this much.
const ORBIT_RANGE: f32 = PI * 3.0;
/// Fraction of the zoom velocity lost per unit of time.
const ZOOM_DAMPING: f32 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraMode {
    /// Third person around `focus`, angles follow the cursor.
    Orbit,
    /// Third person around `focus` at fixed angles.
    ManualAngle { yaw: Rad<f32>, pitch: Rad<f32> },
    /// Parallel projection around `focus`; `half_height` is the visible half
    /// extent at zoom 1.
    Orthographic {
        yaw: Rad<f32>,
        pitch: Rad<f32>,
        half_height: f32,
    },
    /// First person at `eye`, looking where the cursor points.
    FreeFly { eye: Point3<f32> },
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub mode: CameraMode,
    pub focus: Point3<f32>,
    /// Distance between the eye and `focus` in the third person modes.
    pub distance: f32,
    pub fov: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
    zoom: f32,
    zoom_speed: f32,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    position: Point3<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraMode::Orbit)
    }
}

impl Camera {
    pub fn new(mode: CameraMode) -> Self {
        Self {
            mode,
            focus: Point3::origin(),
            distance: 5.0,
            fov: Deg(80.0),
            znear: 0.1,
            zfar: 500.0,
            zoom: 1.0,
            zoom_speed: 0.0,
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            position: Point3::origin(),
        }
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.projection
    }

    /// World position of the eye.
    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Rebuild view and projection for a frame lasting `step`.
    ///
    /// Consumes the scroll accumulated in `viewport`: scrolling pushes the
    /// zoom velocity, which then decays.
    pub fn update(&mut self, viewport: &mut Viewport, step: f32) {
        self.zoom_speed += viewport.take_scroll() * step;
        self.zoom = (self.zoom - self.zoom_speed * step).clamp(0.05, 2.0);
        self.zoom_speed -= self.zoom_speed * step * ZOOM_DAMPING;

        let aspect = viewport.aspect();
        let (cursor_x, cursor_y) = viewport.cursor_fraction();
        let cursor_yaw = Rad((cursor_x - 0.5) * ORBIT_RANGE);
        let cursor_pitch = Rad((cursor_y - 0.5) * ORBIT_RANGE);

        let fov = Deg((self.fov.0 * self.zoom).clamp(1.0, 179.0));
        let perspective_projection = perspective(fov, aspect, self.znear, self.zfar);

        let (view, projection) = match self.mode {
            CameraMode::Orbit => (self.third_person(cursor_yaw, cursor_pitch), perspective_projection),
            CameraMode::ManualAngle { yaw, pitch } => (self.third_person(yaw, pitch), perspective_projection),
            CameraMode::Orthographic {
                yaw,
                pitch,
                half_height,
            } => {
                let h = half_height * self.zoom;
                let w = h * aspect;
                (
                    self.third_person(yaw, pitch),
                    ortho(-w, w, -h, h, self.znear, self.zfar),
                )
            }
            CameraMode::FreeFly { eye } => {
                let (sin_yaw, cos_yaw) = cursor_yaw.0.sin_cos();
                let (sin_pitch, cos_pitch) = (-cursor_pitch.0 / 3.0).sin_cos();
                let direction = Vector3::new(cos_pitch * sin_yaw, sin_pitch, -cos_pitch * cos_yaw);
                (
                    Matrix4::look_to_rh(eye, direction, Vector3::unit_y()),
                    perspective_projection,
                )
            }
        };
        self.view = view;
        self.projection = OPENGL_TO_WGPU_MATRIX * projection;
        self.position = view
            .invert()
            .map(|inverse| Point3::from_homogeneous(inverse * Vector4::unit_w()))
            .unwrap_or(self.position);
    }

    fn third_person(&self, yaw: Rad<f32>, pitch: Rad<f32>) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::new(0.0, 0.0, -self.distance))
            * Matrix4::from_angle_x(pitch)
            * Matrix4::from_angle_y(yaw)
            * Matrix4::from_translation(-self.focus.to_vec())
    }
}
