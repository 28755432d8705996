use nalgebra::Vector3;

/// Rotates a north/east vector into the body frame given the vehicle yaw.
pub fn ned_to_body(north: f32, east: f32, yaw: f32) -> (f32, f32) {
    let (sin, cos) = yaw.sin_cos();
    (cos * north + sin * east, -sin * north + cos * east)
}

/// Rotates a body-frame forward/right vector into north/east.
pub fn body_to_ned(forward: f32, right: f32, yaw: f32) -> (f32, f32) {
    let (sin, cos) = yaw.sin_cos();
    (cos * forward - sin * right, sin * forward + cos * right)
}

/// Scales `vector` down so its norm does not exceed `limit`, keeping its
/// direction. Returns the input unchanged when already within the limit.
pub fn clamp_norm(vector: Vector3<f32>, limit: f32) -> Vector3<f32> {
    let norm = vector.norm();
    if norm > limit && norm > 0.0 {
        vector * (limit / norm)
    } else {
        vector
    }
}
