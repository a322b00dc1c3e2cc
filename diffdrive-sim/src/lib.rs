use std::error::Error;
use std::time::Duration;

use diffdrive_core::{
    DriveBase, DriveConfig, LineTrigger, LogTelemetry, MotionStatus, OpMode, Side,
};

use crate::hardware::{SimChassis, SimConfig};
use crate::settings::{RouteStep, Settings};

pub mod hardware;
pub mod settings;

/// Runs the configured route against a freshly spawned simulated chassis
/// and returns the status each step ended with.
pub async fn run(settings: &Settings) -> Result<Vec<MotionStatus>, Box<dyn Error>> {
    let chassis = SimChassis::new(SimConfig {
        tick: Duration::from_millis(settings.chassis.tick_ms),
        counts_per_sec: settings.chassis.counts_per_sec,
        turn_rate: settings.chassis.turn_rate,
        motor_lag: settings.chassis.motor_lag,
        calibration_time: Duration::from_millis(settings.chassis.calibration_ms),
        encoder_noise: settings.chassis.encoder_noise,
        ..SimConfig::default()
    });

    let mut base = DriveBase::with_telemetry(
        chassis.left_motor(),
        chassis.right_motor(),
        chassis.gyro(),
        chassis.clock(),
        DriveConfig::default(),
        LogTelemetry,
        OpMode::Autonomous,
    )
    .await?;

    let mut statuses = Vec::with_capacity(settings.route.steps.len());
    for (index, step) in settings.route.steps.iter().enumerate() {
        let status = match step {
            RouteStep::Drive { distance } => base.drive(*distance, None).await?,
            RouteStep::Spin { degrees } => base.spin(*degrees, None).await?,
            RouteStep::DriveToLine { distance, line_at } => {
                let mut trigger = LineTrigger::new(Side::Left, chassis.line_sensor(*line_at));
                base.drive(*distance, Some(&mut trigger)).await?
            }
        };
        if status == MotionStatus::TimedOut {
            tracing::warn!("step {index} timed out before settling");
        }
        tracing::info!(
            "step {index}: {step:?} -> {status:?} (traveled {:.1}, heading {:.1})",
            chassis.distance(),
            chassis.heading()
        );
        statuses.push(status);
    }

    Ok(statuses)
}
