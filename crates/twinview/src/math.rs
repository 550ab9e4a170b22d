use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };
    pub const FORWARD: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3 {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Unit vector in the same direction, or `fallback` when the length is
    /// zero or the vector is not finite.
    pub fn normalize_or(self, fallback: Vec3) -> Vec3 {
        let length = self.length();
        if !length.is_finite() || length <= f32::EPSILON {
            return fallback;
        }
        self.scale(1.0 / length)
    }

    pub fn lerp(self, target: Vec3, t: f32) -> Vec3 {
        self + (target - self).scale(t)
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Vec3 {
        self.scale(-1.0)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        self.scale(rhs)
    }
}

/// Orthonormal camera basis. `forward` points into the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

impl Basis {
    pub fn look_rotation(forward: Vec3, up_hint: Vec3) -> Self {
        let forward = forward.normalize_or(Vec3::FORWARD);
        let mut right = up_hint.cross(forward);
        if right.length_squared() <= 1.0e-8 {
            // Looking straight along the hint; any perpendicular works.
            right = Vec3::FORWARD.cross(forward);
            if right.length_squared() <= 1.0e-8 {
                right = Vec3::new(1.0, 0.0, 0.0);
            }
        }
        let right = right.normalize_or(Vec3::new(1.0, 0.0, 0.0));
        let up = forward.cross(right).normalize_or(Vec3::UP);
        Self { right, up, forward }
    }

    /// Camera-space coordinates of a world-space offset.
    pub fn to_local(&self, offset: Vec3) -> Vec3 {
        Vec3 {
            x: offset.dot(self.right),
            y: offset.dot(self.up),
            z: offset.dot(self.forward),
        }
    }
}

/// Direction for a yaw around +Y (0 = +Z) and a pitch (positive looks up).
pub fn direction_from_yaw_pitch(yaw_radians: f32, pitch_radians: f32) -> Vec3 {
    let (sin_yaw, cos_yaw) = yaw_radians.sin_cos();
    let (sin_pitch, cos_pitch) = pitch_radians.sin_cos();
    Vec3 {
        x: sin_yaw * cos_pitch,
        y: sin_pitch,
        z: cos_yaw * cos_pitch,
    }
}

/// Frame-rate independent blend factor for exponential smoothing.
pub fn smoothing_factor(sharpness: f32, dt_seconds: f32) -> f32 {
    if !sharpness.is_finite() || !dt_seconds.is_finite() || dt_seconds <= 0.0 {
        return 0.0;
    }
    (1.0 - (-sharpness * dt_seconds).exp()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.0001
    }

    #[test]
    fn normalize_falls_back_for_zero_and_nan() {
        assert_eq!(Vec3::ZERO.normalize_or(Vec3::UP), Vec3::UP);
        assert_eq!(
            Vec3::new(f32::NAN, 0.0, 0.0).normalize_or(Vec3::FORWARD),
            Vec3::FORWARD
        );
        let unit = Vec3::new(3.0, 0.0, 4.0).normalize_or(Vec3::UP);
        assert!(approx_eq(unit.length(), 1.0));
    }

    #[test]
    fn yaw_zero_faces_positive_z() {
        let dir = direction_from_yaw_pitch(0.0, 0.0);
        assert!(approx_eq(dir.z, 1.0));
        assert!(approx_eq(dir.x, 0.0));
    }

    #[test]
    fn look_rotation_is_orthonormal_even_when_forward_matches_hint() {
        let basis = Basis::look_rotation(Vec3::UP, Vec3::UP);
        assert!(approx_eq(basis.forward.dot(basis.right), 0.0));
        assert!(approx_eq(basis.forward.dot(basis.up), 0.0));
        assert!(approx_eq(basis.right.length(), 1.0));
    }

    #[test]
    fn smoothing_factor_is_bounded() {
        assert_eq!(smoothing_factor(10.0, 0.0), 0.0);
        assert!(smoothing_factor(10.0, 100.0) <= 1.0);
        let mid = smoothing_factor(10.0, 0.016);
        assert!(mid > 0.0 && mid < 1.0);
    }
}
