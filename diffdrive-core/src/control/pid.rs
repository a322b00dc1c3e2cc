use core::time::Duration;

use super::PidConfig;

#[derive(Debug)]
pub struct PidController {
    config: PidConfig,
    target: f32,
    integral: f32,
    previous_error: f32,
    last_update: Option<Duration>,
    in_tolerance_since: Option<Duration>,
    settled: bool,
    last_output: f32,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            target: 0.0,
            integral: 0.0,
            previous_error: 0.0,
            last_update: None,
            in_tolerance_since: None,
            settled: false,
            last_output: 0.0,
        }
    }

    /// Sets the setpoint. `clear_state` wipes the integral and derivative
    /// history for a clean start; passing `false` carries the accumulated
    /// state into the next move. The settling window always restarts.
    pub fn set_target(&mut self, target: f32, clear_state: bool) {
        self.target = target;
        if clear_state {
            self.integral = 0.0;
            self.previous_error = 0.0;
            self.last_update = None;
        }
        self.in_tolerance_since = None;
        self.settled = false;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Feeds one measurement sample and returns the output power.
    ///
    /// `now` must come from a monotonic clock; a zero or regressed time
    /// delta skips the integral and derivative contributions for that
    /// sample. The settling window is refreshed as a side effect, so
    /// [`is_on_target`](Self::is_on_target) reflects this sample afterwards.
    pub fn update(&mut self, measurement: f32, now: Duration) -> f32 {
        let gains = self.config.gains;
        let error = self.target - measurement;

        let dt = match self.last_update {
            Some(previous) => now.saturating_sub(previous).as_secs_f32(),
            None => 0.0,
        };

        let derivative = if dt > 0.0 {
            self.integral += error * dt;
            if gains.ki != 0.0 {
                let a = self.config.output_min / gains.ki;
                let b = self.config.output_max / gains.ki;
                self.integral = self.integral.clamp(a.min(b), a.max(b));
            }
            (error - self.previous_error) / dt
        } else {
            0.0
        };

        let mut output = gains.kp * error
            + gains.ki * self.integral
            + gains.kd * derivative
            + gains.kf * self.target;
        if self.config.inverted {
            output = -output;
        }
        let output = output.clamp(self.config.output_min, self.config.output_max);

        if error.abs() <= self.config.tolerance {
            let since = *self.in_tolerance_since.get_or_insert(now);
            self.settled = now.saturating_sub(since) >= self.config.settling_time;
        } else {
            self.in_tolerance_since = None;
            self.settled = false;
        }

        self.previous_error = error;
        self.last_update = Some(now);
        self.last_output = output;

        output
    }

    /// Whether the error has stayed inside the tolerance band for the full
    /// settling time, as of the last [`update`](Self::update).
    pub fn is_on_target(&self) -> bool {
        self.settled
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.last_update = None;
        self.in_tolerance_since = None;
        self.settled = false;
        self.last_output = 0.0;
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PidConfig) {
        self.config = config;
    }
}
