use std::f32::consts::{PI, TAU};

/// Wraps an angle into (-pi, pi].
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Clamps `value` into `[-limit, limit]`.
pub fn clamp_symmetric(value: f32, limit: f32) -> f32 {
    value.clamp(-limit, limit)
}
