use super::{DriveMotor, RunMode};

/// Adapter for a motor mounted mirrored to its pair.
///
/// Wrapping the mirrored side makes positive power and positive encoder
/// counts mean forward travel on both sides of the chassis.
#[derive(Debug)]
pub struct Reversed<M> {
    inner: M,
}

impl<M: DriveMotor> Reversed<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: DriveMotor> DriveMotor for Reversed<M> {
    fn set_power(&mut self, power: f32) {
        self.inner.set_power(-power);
    }

    fn set_run_mode(&mut self, mode: RunMode) {
        self.inner.set_run_mode(mode);
    }

    fn encoder_position(&self) -> i32 {
        -self.inner.encoder_position()
    }
}
