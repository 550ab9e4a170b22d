use crate::math::Vec2;

/// Radial deadzone: sticks below `threshold` read as centred, the rest of
/// the range is rescaled so output still reaches full deflection.
pub fn apply_radial_deadzone(value: Vec2, threshold: f32) -> Vec2 {
    if !value.is_finite() {
        return Vec2::ZERO;
    }
    let magnitude = value.length();
    let threshold = threshold.clamp(0.0, 0.99);
    if magnitude < threshold || magnitude <= f32::EPSILON {
        return Vec2::ZERO;
    }
    let scaled = ((magnitude - threshold) / (1.0 - threshold)).clamp(0.0, 1.0);
    value.scale(scaled / magnitude)
}

pub fn apply_trigger_deadzone(value: f32, threshold: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let threshold = threshold.clamp(0.0, 0.99);
    if value < threshold {
        0.0
    } else {
        ((value - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
    }
}
