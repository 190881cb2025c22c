//! Camera and view management.

use bytemuck::{Pod, Zeroable};
use ember_core::{Aabb, Frustum};
use glam::{Mat4, Vec3};

/// Camera for rendering.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_3,
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 500.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            position,
            direction: (target - position).try_normalize().unwrap_or(Vec3::NEG_Z),
            aspect,
            ..Self::default()
        }
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        if let Some(direction) = (target - self.position).try_normalize() {
            self.direction = direction;
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// Right-handed perspective with a [0, 1] depth range, Y flipped for
    /// Vulkan's downward framebuffer axis.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Extract frustum planes from the current camera state.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(self.view_projection_matrix())
    }
}

/// Per-frame scene uniform block (set 0, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub inverse_view_projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    /// xyz = camera position
    pub camera_position: [f32; 4],
    /// xyz = direction towards the sun, w = intensity
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    /// width, height, 1 / width, 1 / height
    pub screen: [f32; 4],
    /// IBL intensity, prefiltered max mip, AO enabled, unused
    pub ibl: [f32; 4],
}

impl SceneUniforms {
    pub fn from_camera(camera: &Camera, width: u32, height: u32) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        let view_projection = projection * view;
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
            inverse_view_projection: view_projection.inverse().to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            sun_direction: [0.0, 1.0, 0.0, 1.0],
            sun_color: [1.0; 4],
            screen: [w, h, 1.0 / w, 1.0 / h],
            ibl: [1.0, 0.0, 1.0, 0.0],
        }
    }
}

/// Movement intent for one frame, each axis in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveInput {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    pub sprint: bool,
}

/// First-person camera controller.
///
/// Yaw 0 looks down -Z, positive yaw turns towards +X. Horizontal movement
/// stays on the XZ plane regardless of pitch.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Units per second.
    pub speed: f32,
    pub sprint_multiplier: f32,
    /// Radians per pixel of mouse motion.
    pub sensitivity: f32,
}

/// Keeps the view away from the poles, where yaw degenerates.
const MAX_PITCH: f32 = 1.553_343; // 89 degrees

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 5.0),
            yaw: 0.0,
            pitch: 0.0,
            speed: 3.0,
            sprint_multiplier: 4.0,
            sensitivity: 0.002,
        }
    }
}

impl FlyCamera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-MAX_PITCH, MAX_PITCH),
            ..Self::default()
        }
    }

    /// Start at `position` looking towards `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
        Self::new(position, dir.x.atan2(-dir.z), dir.y.clamp(-1.0, 1.0).asin())
    }

    /// Place the camera so `bounds` fills the view, and scale movement
    /// speed to the scene size.
    pub fn framing(bounds: &Aabb, fov: f32) -> Self {
        if bounds.is_empty() {
            return Self::default();
        }
        let center = bounds.center();
        let radius = bounds.half_extents().length().max(0.01);
        let distance = radius / (fov * 0.5).sin() * 1.1;
        let offset = Vec3::new(0.0, 0.35, 1.0).normalize() * distance;
        let mut camera = Self::looking_at(center + offset, center);
        camera.speed = (radius * 0.75).max(0.5);
        camera
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
    }

    /// Horizontal right vector.
    pub fn right(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin())
    }

    /// Apply mouse motion in pixels. Positive `dy` (mouse down) looks down.
    pub fn look(&mut self, dx: f32, dy: f32) {
        self.yaw = (self.yaw + dx * self.sensitivity).rem_euclid(std::f32::consts::TAU);
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Move for `dt` seconds.
    pub fn update(&mut self, input: MoveInput, dt: f32) {
        let flat_forward = Vec3::new(self.yaw.sin(), 0.0, -self.yaw.cos());
        let wish = flat_forward * input.forward + self.right() * input.right + Vec3::Y * input.up;
        let Some(direction) = wish.try_normalize() else {
            return;
        };
        let speed = if input.sprint {
            self.speed * self.sprint_multiplier
        } else {
            self.speed
        };
        self.position += direction * speed * dt;
    }

    /// Write position and orientation into `camera`.
    pub fn apply(&self, camera: &mut Camera) {
        camera.position = self.position;
        camera.direction = self.forward();
        camera.up = Vec3::Y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::default();
        let above = camera.position + camera.direction * 5.0 + Vec3::Y;
        let clip = camera.view_projection_matrix() * above.extend(1.0);
        assert!(clip.y / clip.w < 0.0);
        let ndc_z = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&ndc_z));
    }

    #[test]
    fn frustum_contains_what_the_camera_faces() {
        let camera = Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z, 1.0);
        let frustum = camera.frustum();
        let ahead = Aabb::new(Vec3::new(-0.5, -0.5, -6.0), Vec3::new(0.5, 0.5, -5.0));
        let behind = Aabb::new(Vec3::new(-0.5, -0.5, 5.0), Vec3::new(0.5, 0.5, 6.0));
        assert!(frustum.test_aabb(&ahead));
        assert!(!frustum.test_aabb(&behind));
    }

    #[test]
    fn fly_camera_yaw_zero_looks_down_negative_z() {
        let fly = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        let forward = fly.forward();
        assert_relative_eq!(forward.z, -1.0);
        assert_relative_eq!(fly.right().x, 1.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut fly = FlyCamera::default();
        fly.look(0.0, -1.0e6);
        assert_relative_eq!(fly.pitch, MAX_PITCH);
        fly.look(0.0, 1.0e6);
        assert_relative_eq!(fly.pitch, -MAX_PITCH);
    }

    #[test]
    fn movement_stays_horizontal_while_pitched() {
        let mut fly = FlyCamera::new(Vec3::ZERO, 0.0, 1.0);
        fly.update(
            MoveInput {
                forward: 1.0,
                ..MoveInput::default()
            },
            1.0,
        );
        assert_relative_eq!(fly.position.y, 0.0);
        assert_relative_eq!(fly.position.z, -fly.speed, epsilon = 1e-5);
    }

    #[test]
    fn sprint_multiplies_speed() {
        let mut fly = FlyCamera::default();
        let start = fly.position;
        fly.update(
            MoveInput {
                right: 1.0,
                sprint: true,
                ..MoveInput::default()
            },
            0.5,
        );
        let moved = (fly.position - start).length();
        assert_relative_eq!(moved, fly.speed * fly.sprint_multiplier * 0.5, epsilon = 1e-5);
    }

    #[test]
    fn looking_at_round_trips_direction() {
        let target = Vec3::new(3.0, -2.0, 1.0);
        let fly = FlyCamera::looking_at(Vec3::ZERO, target);
        let forward = fly.forward();
        let expected = target.normalize();
        assert_relative_eq!(forward.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(forward.y, expected.y, epsilon = 1e-5);
        assert_relative_eq!(forward.z, expected.z, epsilon = 1e-5);
    }

    #[test]
    fn framing_keeps_bounds_in_view() {
        let bounds = Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0));
        let fly = FlyCamera::framing(&bounds, std::f32::consts::FRAC_PI_3);
        let mut camera = Camera {
            aspect: 1.0,
            far: 1000.0,
            ..Camera::default()
        };
        fly.apply(&mut camera);
        assert!(camera.frustum().test_aabb(&bounds));
        assert!(!bounds.contains_point(camera.position));
    }

    #[test]
    fn uniforms_carry_screen_size() {
        let uniforms = SceneUniforms::from_camera(&Camera::default(), 1920, 1080);
        assert_relative_eq!(uniforms.screen[0], 1920.0);
        assert_relative_eq!(uniforms.screen[3], 1.0 / 1080.0);
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }
}
