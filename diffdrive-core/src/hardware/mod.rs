mod clock;
mod reversed;

pub use clock::*;
pub use reversed::*;

/// Encoder handling of a drive motor. Switching into
/// [`RunMode::StopAndResetEncoder`] halts the motor and zeroes its count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    StopAndResetEncoder,
    RunWithoutEncoder,
}

/// Which side of the chassis a motor or sensor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

pub trait DriveMotor {
    /// Applies power in `[-1, 1]`; positive moves the wheel forward.
    fn set_power(&mut self, power: f32);

    fn set_run_mode(&mut self, mode: RunMode);

    fn encoder_position(&self) -> i32;
}

pub trait HeadingSensor {
    fn start_calibration(&mut self);

    fn is_calibrating(&self) -> bool;

    /// Signed heading in degrees. Keeps accumulating past ±360.
    fn integrated_heading(&self) -> f32;
}

pub trait LightSensor {
    /// Reflected light level in sensor units.
    fn light_level(&mut self) -> f32;
}
