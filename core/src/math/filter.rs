/// Exponentially-weighted smoothing with a time constant, tolerant of
/// irregular sample spacing.
#[derive(Debug, Clone, Copy)]
pub struct ExpSmoother {
    time_constant: f64,
}

impl ExpSmoother {
    pub fn new(time_constant: f64) -> Self {
        Self { time_constant }
    }

    /// Blend weight given to a new sample arriving `dt` seconds after the
    /// previous one. A zero time constant disables smoothing.
    pub fn alpha(&self, dt: f64) -> f32 {
        if self.time_constant <= 0.0 {
            return 1.0;
        }
        if dt <= 0.0 {
            return 0.0;
        }
        (1.0 - (-dt / self.time_constant).exp()) as f32
    }

    pub fn blend(&self, previous: f32, sample: f32, dt: f64) -> f32 {
        previous + self.alpha(dt) * (sample - previous)
    }
}
