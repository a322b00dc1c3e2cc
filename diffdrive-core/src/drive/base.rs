use embassy_futures::yield_now;
use embassy_time::Timer;

use crate::control::PidController;
use crate::error::{Error, Result};
use crate::hardware::{Clock, DriveMotor, HeadingSensor, RunMode};
use crate::telemetry::{NullTelemetry, PidSample, Telemetry};
use crate::trigger::AbortTrigger;

use super::{Axis, DriveConfig, MotionStatus, OpMode, scale_input};

const CALIBRATION_POLL_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveCommand {
    Straight,
    Spin,
}

/// Closed-loop controller for a two-wheel differential chassis.
///
/// Owns one PID controller per axis and the motor and heading-sensor
/// handles. Motion commands are cooperative polling loops: each iteration
/// samples both axes, writes both wheels and yields, so a host scheduler
/// can interleave housekeeping. At most one command is active at a time.
pub struct DriveBase<L, R, G, C, T = NullTelemetry> {
    left: L,
    right: R,
    gyro: G,
    clock: C,
    telemetry: T,
    config: DriveConfig,
    drive_pid: PidController,
    turn_pid: PidController,
    command: Option<ActiveCommand>,
    deadline: Option<core::time::Duration>,
}

impl<L, R, G, C> DriveBase<L, R, G, C>
where
    L: DriveMotor,
    R: DriveMotor,
    G: HeadingSensor,
    C: Clock,
{
    pub async fn new(
        left: L,
        right: R,
        gyro: G,
        clock: C,
        config: DriveConfig,
        op_mode: OpMode,
    ) -> Result<Self> {
        Self::with_telemetry(left, right, gyro, clock, config, NullTelemetry, op_mode).await
    }
}

impl<L, R, G, C, T> DriveBase<L, R, G, C, T>
where
    L: DriveMotor,
    R: DriveMotor,
    G: HeadingSensor,
    C: Clock,
    T: Telemetry,
{
    pub async fn with_telemetry(
        left: L,
        right: R,
        gyro: G,
        clock: C,
        config: DriveConfig,
        telemetry: T,
        op_mode: OpMode,
    ) -> Result<Self> {
        let mut base = Self {
            left,
            right,
            gyro,
            clock,
            telemetry,
            drive_pid: PidController::new(config.drive_pid),
            turn_pid: PidController::new(config.turn_pid),
            config,
            command: None,
            deadline: None,
        };
        base.reset_motors();
        if op_mode == OpMode::Autonomous {
            base.calibrate_gyro().await?;
        }
        Ok(base)
    }

    async fn calibrate_gyro(&mut self) -> Result<()> {
        log::info!("gyro: calibrating");
        self.gyro.start_calibration();
        let deadline = self.clock.now() + self.config.calibration_timeout;
        while self.gyro.is_calibrating() {
            if self.clock.now() > deadline {
                log::error!(
                    "gyro: calibration did not finish within {:?}",
                    self.config.calibration_timeout
                );
                return Err(Error::CalibrationFailed);
            }
            Timer::after_millis(CALIBRATION_POLL_MS).await;
        }
        log::info!("gyro: calibration done");
        Ok(())
    }

    /// Drives straight for `distance` length units while holding the
    /// current heading, blocking cooperatively until both axes settle,
    /// the abort trigger fires or the motion timeout passes. The wheels
    /// are stopped and the encoders zeroed on every exit path.
    pub async fn drive(
        &mut self,
        distance: f32,
        abort: Option<&mut dyn AbortTrigger>,
    ) -> Result<MotionStatus> {
        self.begin_drive(distance)?;
        self.run_motion(abort).await
    }

    /// Rotates in place by `degrees` (positive is the heading sensor's
    /// positive direction). Same loop and cleanup contract as
    /// [`drive`](Self::drive).
    pub async fn spin(
        &mut self,
        degrees: f32,
        abort: Option<&mut dyn AbortTrigger>,
    ) -> Result<MotionStatus> {
        self.begin_spin(degrees)?;
        self.run_motion(abort).await
    }

    /// Arms a straight drive without running it. Pair with
    /// [`tick`](Self::tick) and [`finish_motion`](Self::finish_motion)
    /// when driving the loop from an external scheduler.
    pub fn begin_drive(&mut self, distance: f32) -> Result<()> {
        if self.command.is_some() {
            return Err(Error::InvalidState);
        }
        self.drive_pid.set_target(distance, true);
        self.turn_pid.set_target(0.0, true);
        self.deadline = Some(self.clock.now() + self.config.motion_timeout);
        self.command = Some(ActiveCommand::Straight);
        log::debug!("drive: target {:.2}", distance);
        Ok(())
    }

    pub fn begin_spin(&mut self, degrees: f32) -> Result<()> {
        if self.command.is_some() {
            return Err(Error::InvalidState);
        }
        self.turn_pid.set_target(degrees, true);
        self.deadline = Some(self.clock.now() + self.config.motion_timeout);
        self.command = Some(ActiveCommand::Spin);
        log::debug!("spin: target {:.2} deg", degrees);
        Ok(())
    }

    /// Runs exactly one iteration of the active motion loop: sample the
    /// axis controllers, write both wheels, then evaluate the abort
    /// trigger and the deadline. Both wheel writes use the same pair of
    /// controller samples.
    pub fn tick(&mut self, abort: Option<&mut (dyn AbortTrigger + '_)>) -> MotionStatus {
        let Some(command) = self.command else {
            return MotionStatus::Idle;
        };
        let now = self.clock.now();

        let (left_power, right_power, on_target) = match command {
            ActiveCommand::Straight => {
                let drive_input = self.feedback(Axis::Drive);
                let turn_input = self.feedback(Axis::Turn);
                let drive_power = self.drive_pid.update(drive_input, now);
                let turn_power = self.turn_pid.update(turn_input, now);
                self.sample(Axis::Drive, drive_input, drive_power);
                self.sample(Axis::Turn, turn_input, turn_power);
                (
                    drive_power + turn_power,
                    drive_power - turn_power,
                    self.drive_pid.is_on_target() && self.turn_pid.is_on_target(),
                )
            }
            ActiveCommand::Spin => {
                let turn_input = self.feedback(Axis::Turn);
                let turn_power = self.turn_pid.update(turn_input, now);
                self.sample(Axis::Turn, turn_input, turn_power);
                (turn_power, -turn_power, self.turn_pid.is_on_target())
            }
        };
        self.left.set_power(left_power.clamp(-1.0, 1.0));
        self.right.set_power(right_power.clamp(-1.0, 1.0));

        if let Some(trigger) = abort {
            if trigger.should_abort() {
                log::info!("motion aborted by trigger");
                return MotionStatus::Aborted;
            }
        }
        if let Some(deadline) = self.deadline {
            if now > deadline {
                log::warn!(
                    "motion exceeded {:?}, stopping",
                    self.config.motion_timeout
                );
                return MotionStatus::TimedOut;
            }
        }
        if on_target {
            MotionStatus::OnTarget
        } else {
            MotionStatus::Moving
        }
    }

    /// Stops the wheels, zeroes the encoders and clears both controllers.
    /// Runs once after every motion command, whatever ended it.
    pub fn finish_motion(&mut self) {
        self.left.set_power(0.0);
        self.right.set_power(0.0);
        self.reset_motors();
        self.drive_pid.reset();
        self.turn_pid.reset();
        self.command = None;
        self.deadline = None;
    }

    async fn run_motion(
        &mut self,
        mut abort: Option<&mut dyn AbortTrigger>,
    ) -> Result<MotionStatus> {
        let outcome = loop {
            match self.tick(abort.as_deref_mut()) {
                MotionStatus::Moving => yield_now().await,
                status => break status,
            }
        };
        self.finish_motion();
        Ok(outcome)
    }

    /// Direct manual control: clamp each stick to `[-1, 1]`, shape it on
    /// the drive curve and write the wheels. Single-shot, never blocks.
    pub fn tank_drive(&mut self, left: f32, right: f32) {
        let left = scale_input(left.clamp(-1.0, 1.0));
        let right = scale_input(right.clamp(-1.0, 1.0));
        self.left.set_power(left);
        self.right.set_power(right);
    }

    /// Zeroes both encoder counts via the stop-and-reset-then-run
    /// transition.
    pub fn reset_motors(&mut self) {
        self.left.set_run_mode(RunMode::StopAndResetEncoder);
        self.right.set_run_mode(RunMode::StopAndResetEncoder);
        self.left.set_run_mode(RunMode::RunWithoutEncoder);
        self.right.set_run_mode(RunMode::RunWithoutEncoder);
    }

    /// Current feedback value for one axis: mean encoder travel for
    /// [`Axis::Drive`], integrated gyro heading for [`Axis::Turn`].
    pub fn feedback(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Drive => {
                let counts = self.left.encoder_position() + self.right.encoder_position();
                counts as f32 * self.config.distance_per_count / 2.0
            }
            Axis::Turn => self.gyro.integrated_heading(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.command.is_some()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    fn sample(&mut self, axis: Axis, measurement: f32, output: f32) {
        let target = match axis {
            Axis::Drive => self.drive_pid.target(),
            Axis::Turn => self.turn_pid.target(),
        };
        self.telemetry.pid_sample(&PidSample {
            axis,
            target,
            measurement,
            error: target - measurement,
            output,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::trigger::FnTrigger;

    const EPS: f32 = 1e-6;

    #[derive(Default)]
    struct MotorState {
        powers: Vec<f32>,
        modes: Vec<RunMode>,
        position: i32,
    }

    #[derive(Clone, Default)]
    struct MockMotor {
        state: Rc<RefCell<MotorState>>,
    }

    impl MockMotor {
        fn set_position(&self, counts: i32) {
            self.state.borrow_mut().position = counts;
        }

        fn powers(&self) -> Vec<f32> {
            self.state.borrow().powers.clone()
        }

        fn modes(&self) -> Vec<RunMode> {
            self.state.borrow().modes.clone()
        }

        fn last_power(&self) -> f32 {
            *self.state.borrow().powers.last().expect("no power written")
        }
    }

    impl DriveMotor for MockMotor {
        fn set_power(&mut self, power: f32) {
            self.state.borrow_mut().powers.push(power);
        }

        fn set_run_mode(&mut self, mode: RunMode) {
            let mut state = self.state.borrow_mut();
            if mode == RunMode::StopAndResetEncoder {
                state.position = 0;
            }
            state.modes.push(mode);
        }

        fn encoder_position(&self) -> i32 {
            self.state.borrow().position
        }
    }

    #[derive(Clone)]
    struct MockGyro {
        heading: Rc<Cell<f32>>,
        calibration_polls: u32,
        remaining: Rc<Cell<u32>>,
        stuck: bool,
    }

    impl MockGyro {
        fn new() -> Self {
            Self::with_calibration_polls(0)
        }

        fn with_calibration_polls(polls: u32) -> Self {
            Self {
                heading: Rc::new(Cell::new(0.0)),
                calibration_polls: polls,
                remaining: Rc::new(Cell::new(0)),
                stuck: false,
            }
        }

        fn stuck() -> Self {
            Self {
                stuck: true,
                ..Self::new()
            }
        }
    }

    impl HeadingSensor for MockGyro {
        fn start_calibration(&mut self) {
            self.remaining.set(self.calibration_polls);
        }

        fn is_calibrating(&self) -> bool {
            if self.stuck {
                return true;
            }
            let left = self.remaining.get();
            if left == 0 {
                false
            } else {
                self.remaining.set(left - 1);
                true
            }
        }

        fn integrated_heading(&self) -> f32 {
            self.heading.get()
        }
    }

    #[derive(Clone)]
    struct MockClock {
        now_ms: Rc<Cell<u64>>,
        step_ms: u64,
    }

    impl MockClock {
        fn stepping(step_ms: u64) -> Self {
            Self {
                now_ms: Rc::new(Cell::new(0)),
                step_ms,
            }
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> core::time::Duration {
            let now = self.now_ms.get();
            self.now_ms.set(now + self.step_ms);
            core::time::Duration::from_millis(now)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTelemetry {
        samples: Rc<RefCell<Vec<PidSample>>>,
    }

    impl Telemetry for RecordingTelemetry {
        fn pid_sample(&mut self, sample: &PidSample) {
            self.samples.borrow_mut().push(*sample);
        }
    }

    struct Rig {
        left: MockMotor,
        right: MockMotor,
        gyro: MockGyro,
        base: DriveBase<MockMotor, MockMotor, MockGyro, MockClock>,
    }

    async fn rig_with_config(config: DriveConfig) -> Rig {
        let left = MockMotor::default();
        let right = MockMotor::default();
        let gyro = MockGyro::new();
        let base = DriveBase::new(
            left.clone(),
            right.clone(),
            gyro.clone(),
            MockClock::stepping(20),
            config,
            OpMode::TeleOp,
        )
        .await
        .expect("construction failed");
        Rig {
            left,
            right,
            gyro,
            base,
        }
    }

    async fn rig() -> Rig {
        rig_with_config(DriveConfig::default()).await
    }

    fn instant_settle_config() -> DriveConfig {
        let mut config = DriveConfig::default();
        config.drive_pid.settling_time = Duration::ZERO;
        config.turn_pid.settling_time = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_construction_resets_both_encoders() {
        let rig = rig().await;
        assert_eq!(
            rig.left.modes(),
            vec![RunMode::StopAndResetEncoder, RunMode::RunWithoutEncoder]
        );
        assert_eq!(
            rig.right.modes(),
            vec![RunMode::StopAndResetEncoder, RunMode::RunWithoutEncoder]
        );
        assert!(!rig.base.is_busy());
    }

    #[tokio::test]
    async fn test_autonomous_construction_waits_for_calibration() {
        let gyro = MockGyro::with_calibration_polls(3);
        let base = DriveBase::new(
            MockMotor::default(),
            MockMotor::default(),
            gyro.clone(),
            MockClock::stepping(20),
            DriveConfig::default(),
            OpMode::Autonomous,
        )
        .await;
        assert!(base.is_ok());
        assert!(!gyro.is_calibrating());
    }

    #[tokio::test]
    async fn test_calibration_timeout_fails_construction() {
        let mut config = DriveConfig::default();
        config.calibration_timeout = Duration::from_millis(100);
        let result = DriveBase::new(
            MockMotor::default(),
            MockMotor::default(),
            MockGyro::stuck(),
            MockClock::stepping(40),
            config,
            OpMode::Autonomous,
        )
        .await;
        assert_eq!(result.err(), Some(Error::CalibrationFailed));
    }

    #[tokio::test]
    async fn test_wheel_powers_combine_drive_and_turn() {
        let mut rig = rig().await;
        rig.gyro.heading.set(5.0);

        rig.base.begin_drive(10.0).expect("arm failed");
        assert_eq!(rig.base.tick(None), MotionStatus::Moving);

        // First sample is pure P: drive 0.03*10, turn 0.014*(0-5).
        let drive_power = 0.3;
        let turn_power = -0.07;
        let left = rig.left.last_power();
        let right = rig.right.last_power();
        assert!((left - (drive_power + turn_power)).abs() < EPS);
        assert!((right - (drive_power - turn_power)).abs() < EPS);
        assert!((left - right - 2.0 * turn_power).abs() < EPS);
        assert!((left + right - 2.0 * drive_power).abs() < EPS);
    }

    #[tokio::test]
    async fn test_spin_counter_rotates_wheels() {
        let mut rig = rig().await;
        rig.base.begin_spin(90.0).expect("arm failed");
        assert_eq!(rig.base.tick(None), MotionStatus::Moving);

        // 0.014*90 saturates the controller's output range.
        assert!((rig.left.last_power() - 1.0).abs() < EPS);
        assert!((rig.right.last_power() + 1.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_only_one_command_at_a_time() {
        let mut rig = rig().await;
        rig.base.begin_drive(10.0).expect("arm failed");
        assert_eq!(rig.base.begin_spin(45.0), Err(Error::InvalidState));
        assert_eq!(rig.base.begin_drive(5.0), Err(Error::InvalidState));

        rig.base.finish_motion();
        assert!(rig.base.begin_spin(45.0).is_ok());
    }

    #[tokio::test]
    async fn test_tick_without_command_is_idle() {
        let mut rig = rig().await;
        assert_eq!(rig.base.tick(None), MotionStatus::Idle);
        assert!(rig.left.powers().is_empty());
    }

    #[tokio::test]
    async fn test_abort_wins_over_on_target() {
        let mut rig = rig_with_config(instant_settle_config()).await;
        // Zero targets put both axes in tolerance on the first sample.
        rig.base.begin_drive(0.0).expect("arm failed");
        let mut trigger = FnTrigger(|| true);
        assert_eq!(rig.base.tick(Some(&mut trigger)), MotionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_on_target_without_abort() {
        let mut rig = rig_with_config(instant_settle_config()).await;
        rig.base.begin_drive(0.0).expect("arm failed");
        assert_eq!(rig.base.tick(None), MotionStatus::OnTarget);
    }

    #[tokio::test]
    async fn test_drive_settles_once_both_axes_hold() {
        let mut rig = rig().await;
        // Already at the target; the loop still has to ride out the
        // 200ms settling window at 20ms per iteration.
        let status = rig.base.drive(0.0, None).await.expect("drive failed");
        assert_eq!(status, MotionStatus::OnTarget);
        assert!(!rig.base.is_busy());
        assert_eq!(rig.left.last_power(), 0.0);
    }

    #[tokio::test]
    async fn test_abort_stops_command_that_iteration() {
        let mut rig = rig().await;
        let calls = Rc::new(Cell::new(0u32));
        let counter = calls.clone();
        let mut trigger = FnTrigger(move || {
            let n = counter.get() + 1;
            counter.set(n);
            n >= 3
        });

        let status = rig
            .base
            .drive(10.0, Some(&mut trigger))
            .await
            .expect("drive failed");

        assert_eq!(status, MotionStatus::Aborted);
        assert_eq!(calls.get(), 3);

        // Three iterations applied power, then cleanup wrote the stop.
        let powers = rig.left.powers();
        assert_eq!(powers.len(), 4);
        assert_eq!(*powers.last().unwrap(), 0.0);

        // Encoders zeroed exactly once after the command (the first
        // stop-and-reset pair is from construction).
        assert_eq!(
            rig.left.modes(),
            vec![
                RunMode::StopAndResetEncoder,
                RunMode::RunWithoutEncoder,
                RunMode::StopAndResetEncoder,
                RunMode::RunWithoutEncoder,
            ]
        );
        assert!(!rig.base.is_busy());
    }

    #[tokio::test]
    async fn test_stalled_motion_times_out() {
        let mut config = DriveConfig::default();
        config.motion_timeout = Duration::from_millis(40);
        let mut rig = rig_with_config(config).await;

        // Encoders never move, so the drive axis can never settle.
        let status = rig.base.drive(10.0, None).await.expect("drive failed");
        assert_eq!(status, MotionStatus::TimedOut);
        assert_eq!(rig.left.last_power(), 0.0);
        assert!(!rig.base.is_busy());
    }

    #[tokio::test]
    async fn test_drive_feedback_averages_encoders() {
        let rig = rig().await;
        rig.left.set_position(1000);
        rig.right.set_position(2000);

        let expected = 1500.0 * rig.base.config().distance_per_count;
        assert!((rig.base.feedback(Axis::Drive) - expected).abs() < 1e-4);

        rig.gyro.heading.set(42.5);
        assert_eq!(rig.base.feedback(Axis::Turn), 42.5);
    }

    #[tokio::test]
    async fn test_tank_drive_clamps_and_scales() {
        let mut rig = rig().await;
        rig.base.tank_drive(0.5, -0.5);
        assert_eq!(rig.left.last_power(), 0.43);
        assert_eq!(rig.right.last_power(), -0.43);

        rig.base.tank_drive(2.0, -3.0);
        assert_eq!(rig.left.last_power(), 0.90);
        assert_eq!(rig.right.last_power(), -0.90);
    }

    #[tokio::test]
    async fn test_telemetry_sees_each_axis_sample() {
        let telemetry = RecordingTelemetry::default();
        let samples = telemetry.samples.clone();
        let mut base = DriveBase::with_telemetry(
            MockMotor::default(),
            MockMotor::default(),
            MockGyro::new(),
            MockClock::stepping(20),
            DriveConfig::default(),
            telemetry,
            OpMode::TeleOp,
        )
        .await
        .expect("construction failed");

        base.begin_drive(10.0).expect("arm failed");
        base.tick(None);
        {
            let samples = samples.borrow();
            assert_eq!(samples.len(), 2);
            assert_eq!(samples[0].axis, Axis::Drive);
            assert_eq!(samples[1].axis, Axis::Turn);
            assert!((samples[0].error - 10.0).abs() < EPS);
        }

        base.finish_motion();
        samples.borrow_mut().clear();

        base.begin_spin(45.0).expect("arm failed");
        base.tick(None);
        let samples = samples.borrow();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].axis, Axis::Turn);
    }
}
