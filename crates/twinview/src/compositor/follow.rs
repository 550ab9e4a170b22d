//! Third-person follow camera for player 2's rig. Mirrors what the host does
//! for player 1, since the host's own follow logic only ever tracks the
//! active local player.

use crate::host::{CharacterPose, PhysicsQuery};
use crate::math::{direction_from_yaw_pitch, smoothing_factor, Vec2, Vec3};

use super::camera::CameraTransform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowSettings {
    pub distance: f32,
    pub min_distance: f32,
    pub probe_radius: f32,
    /// Kept between the camera and whatever the probe hit.
    pub collision_margin: f32,
    /// Minimum height above a water surface.
    pub water_clearance: f32,
    pub pivot_sharpness: f32,
    pub up_sharpness: f32,
    /// Radians per second at full look deflection.
    pub look_speed: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            distance: 4.5,
            min_distance: 0.6,
            probe_radius: 0.25,
            collision_margin: 0.15,
            water_clearance: 0.3,
            pivot_sharpness: 12.0,
            up_sharpness: 4.0,
            look_speed: 2.5,
            min_pitch: -1.2,
            max_pitch: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowCamera {
    yaw: f32,
    pitch: f32,
    pivot: Vec3,
    up: Vec3,
    initialized: bool,
}

impl Default for FollowCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: -0.25,
            pivot: Vec3::ZERO,
            up: Vec3::UP,
            initialized: false,
        }
    }
}

impl FollowCamera {
    /// Next frame's snap rather than a glide from the old position.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn update<P: PhysicsQuery + ?Sized>(
        &mut self,
        settings: &FollowSettings,
        pose: &CharacterPose,
        look: Vec2,
        dt_seconds: f32,
        physics: &P,
    ) -> CameraTransform {
        if !self.initialized {
            self.yaw = pose.yaw_radians;
            self.pivot = pose.eye_point;
            self.up = Vec3::UP;
            self.initialized = true;
        }

        if look.is_finite() {
            self.yaw += look.x * settings.look_speed * dt_seconds;
            self.pitch = (self.pitch + look.y * settings.look_speed * dt_seconds)
                .clamp(settings.min_pitch, settings.max_pitch);
        }

        let up_target = if pose.on_moving_platform {
            pose.platform_up.normalize_or(Vec3::UP)
        } else {
            Vec3::UP
        };
        self.up = self
            .up
            .lerp(up_target, smoothing_factor(settings.up_sharpness, dt_seconds))
            .normalize_or(Vec3::UP);

        if pose.eye_point.is_finite() {
            self.pivot = self
                .pivot
                .lerp(pose.eye_point, smoothing_factor(settings.pivot_sharpness, dt_seconds));
        }

        let view = direction_from_yaw_pitch(self.yaw, self.pitch);
        let back = -view;
        let distance = match physics.sphere_cast(
            self.pivot,
            back,
            settings.probe_radius,
            settings.distance,
        ) {
            Some(hit) => (hit - settings.collision_margin).max(settings.min_distance),
            None => settings.distance,
        };

        let mut position = self.pivot + back * distance.min(settings.distance);
        if let Some(surface) = physics.water_height(position) {
            position.y = position.y.max(surface + settings.water_clearance);
        }

        CameraTransform {
            position,
            forward: (self.pivot - position).normalize_or(view),
            up: self.up,
        }
    }
}
