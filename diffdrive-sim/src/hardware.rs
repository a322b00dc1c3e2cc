use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use diffdrive_core::{
    Clock, DriveConfig, DriveMotor, HeadingSensor, LightSensor, Reversed, RunMode, Side,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

const FLOOR_LIGHT_LEVEL: f32 = 10.0;
const LINE_LIGHT_LEVEL: f32 = 1.0;
const NOISE_SEED: u64 = 0x5EED;

/// Plant constants for the simulated chassis.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Simulated time that passes per clock sample. One control-loop
    /// iteration sees exactly one plant step.
    pub tick: Duration,
    /// Wheel speed at full power, in encoder counts per second.
    pub counts_per_sec: f64,
    /// Yaw rate at full differential power, in degrees per second.
    pub turn_rate: f64,
    /// First-order lag of wheel speed reaching commanded power, seconds.
    pub motor_lag: f64,
    /// How long the simulated gyro takes to calibrate.
    pub calibration_time: Duration,
    /// Standard deviation of per-step encoder noise, in counts. Zero
    /// disables the noise source.
    pub encoder_noise: f64,
    /// Travel per encoder count; must match the drive configuration.
    pub distance_per_count: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            counts_per_sec: 2500.0,
            turn_rate: 180.0,
            motor_lag: 0.1,
            calibration_time: Duration::from_millis(100),
            encoder_noise: 0.0,
            distance_per_count: DriveConfig::default().distance_per_count as f64,
        }
    }
}

struct PlantState {
    config: SimConfig,
    now: Duration,
    left_power: f64,
    right_power: f64,
    left_speed: f64,
    right_speed: f64,
    left_counts: f64,
    right_counts: f64,
    heading: f64,
    traveled: f64,
    calibrating_until: Option<Duration>,
    noise: Option<(Normal<f64>, StdRng)>,
}

impl PlantState {
    /// Integrates one plant step at the configured tick.
    fn advance(&mut self) {
        let dt = self.config.tick.as_secs_f64();
        let alpha = (dt / self.config.motor_lag).min(1.0);
        let left_target = self.left_power.clamp(-1.0, 1.0);
        // Positive raw power drives the mirrored right wheel backwards.
        let right_target = (-self.right_power).clamp(-1.0, 1.0);
        self.left_speed += (left_target - self.left_speed) * alpha;
        self.right_speed += (right_target - self.right_speed) * alpha;

        let left_delta = self.left_speed * self.config.counts_per_sec * dt;
        let right_delta = self.right_speed * self.config.counts_per_sec * dt;
        self.left_counts += left_delta;
        self.right_counts -= right_delta;
        if let Some((normal, rng)) = &mut self.noise {
            self.left_counts += normal.sample(rng);
            self.right_counts += normal.sample(rng);
        }
        self.traveled += (left_delta + right_delta) * 0.5 * self.config.distance_per_count;
        self.heading += (self.left_speed - self.right_speed) * 0.5 * self.config.turn_rate * dt;
        self.now += self.config.tick;
    }
}

/// Shared simulated chassis. Hands out motor, gyro, clock and light-sensor
/// handles that all act on the same plant; simulated time advances one
/// tick per clock sample.
#[derive(Clone)]
pub struct SimChassis {
    state: Arc<Mutex<PlantState>>,
}

impl SimChassis {
    pub fn new(config: SimConfig) -> Self {
        let noise = (config.encoder_noise > 0.0).then(|| {
            let normal =
                Normal::new(0.0, config.encoder_noise).expect("invalid encoder noise deviation");
            (normal, StdRng::seed_from_u64(NOISE_SEED))
        });
        Self {
            state: Arc::new(Mutex::new(PlantState {
                config,
                now: Duration::ZERO,
                left_power: 0.0,
                right_power: 0.0,
                left_speed: 0.0,
                right_speed: 0.0,
                left_counts: 0.0,
                right_counts: 0.0,
                heading: 0.0,
                traveled: 0.0,
                calibrating_until: None,
                noise,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlantState> {
        self.state.lock().expect("plant state poisoned")
    }

    pub fn left_motor(&self) -> SimMotor {
        SimMotor {
            chassis: self.clone(),
            side: Side::Left,
        }
    }

    /// The right motor is mounted mirrored, so it comes pre-wrapped the
    /// way the real chassis wires it.
    pub fn right_motor(&self) -> Reversed<SimMotor> {
        Reversed::new(SimMotor {
            chassis: self.clone(),
            side: Side::Right,
        })
    }

    pub fn gyro(&self) -> SimGyro {
        SimGyro {
            chassis: self.clone(),
        }
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            chassis: self.clone(),
        }
    }

    /// Floor sensor that reads dark once the chassis has traveled
    /// `line_at` length units from its starting position.
    pub fn line_sensor(&self, line_at: f64) -> SimLineSensor {
        SimLineSensor {
            chassis: self.clone(),
            line_at,
        }
    }

    /// Total forward travel in length units, unaffected by encoder resets.
    pub fn distance(&self) -> f64 {
        self.lock().traveled
    }

    /// Accumulated heading in degrees.
    pub fn heading(&self) -> f64 {
        self.lock().heading
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().now
    }
}

pub struct SimMotor {
    chassis: SimChassis,
    side: Side,
}

impl DriveMotor for SimMotor {
    fn set_power(&mut self, power: f32) {
        let mut state = self.chassis.lock();
        match self.side {
            Side::Left => state.left_power = power as f64,
            Side::Right => state.right_power = power as f64,
        }
    }

    fn set_run_mode(&mut self, mode: RunMode) {
        if mode == RunMode::StopAndResetEncoder {
            let mut state = self.chassis.lock();
            match self.side {
                Side::Left => {
                    state.left_counts = 0.0;
                    state.left_power = 0.0;
                    state.left_speed = 0.0;
                }
                Side::Right => {
                    state.right_counts = 0.0;
                    state.right_power = 0.0;
                    state.right_speed = 0.0;
                }
            }
        }
    }

    fn encoder_position(&self) -> i32 {
        let state = self.chassis.lock();
        match self.side {
            Side::Left => state.left_counts as i32,
            Side::Right => state.right_counts as i32,
        }
    }
}

pub struct SimGyro {
    chassis: SimChassis,
}

impl HeadingSensor for SimGyro {
    fn start_calibration(&mut self) {
        let mut state = self.chassis.lock();
        let done_at = state.now + state.config.calibration_time;
        state.calibrating_until = Some(done_at);
    }

    fn is_calibrating(&self) -> bool {
        let state = self.chassis.lock();
        state
            .calibrating_until
            .is_some_and(|done_at| state.now < done_at)
    }

    fn integrated_heading(&self) -> f32 {
        self.chassis.lock().heading as f32
    }
}

pub struct SimClock {
    chassis: SimChassis,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        let mut state = self.chassis.lock();
        state.advance();
        state.now
    }
}

pub struct SimLineSensor {
    chassis: SimChassis,
    line_at: f64,
}

impl LightSensor for SimLineSensor {
    fn light_level(&mut self) -> f32 {
        if self.chassis.lock().traveled >= self.line_at {
            LINE_LIGHT_LEVEL
        } else {
            FLOOR_LIGHT_LEVEL
        }
    }
}
