mod pid;

pub use pid::*;

use core::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Feed-forward term, applied to the target independent of error.
    pub kf: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            kf: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PidConfig {
    pub gains: PidGains,
    /// Absolute error band that counts as being at the setpoint.
    pub tolerance: f32,
    /// How long the error must stay inside the band before the axis
    /// reports on-target.
    pub settling_time: Duration,
    pub output_min: f32,
    pub output_max: f32,
    pub inverted: bool,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            tolerance: 2.0,
            settling_time: Duration::from_millis(200),
            output_min: -1.0,
            output_max: 1.0,
            inverted: false,
        }
    }
}
