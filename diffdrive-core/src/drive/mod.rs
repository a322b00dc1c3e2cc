mod base;
mod scaler;

pub use base::*;
pub use scaler::*;

use core::time::Duration;

use crate::control::{PidConfig, PidGains};

/// Feedback axis of the chassis: translation along the floor or rotation
/// about the vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Drive,
    Turn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// Calibrates the heading sensor during construction.
    Autonomous,
    TeleOp,
}

/// Where a motion command stands. [`DriveBase::tick`] reports `Moving`
/// while there is work left; the remaining variants name why the loop
/// ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    /// No command is armed.
    Idle,
    Moving,
    OnTarget,
    Aborted,
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct DriveConfig {
    pub drive_pid: PidConfig,
    pub turn_pid: PidConfig,
    /// Travel per encoder count, measured on the assembled chassis.
    pub distance_per_count: f32,
    /// Safety cap on a single motion command.
    pub motion_timeout: Duration,
    pub calibration_timeout: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            drive_pid: PidConfig {
                gains: PidGains {
                    kp: 0.03,
                    ki: 0.0,
                    kd: 0.001,
                    kf: 0.0,
                },
                ..PidConfig::default()
            },
            turn_pid: PidConfig {
                gains: PidGains {
                    kp: 0.014,
                    ki: 0.0,
                    kd: 0.02,
                    kf: 0.0,
                },
                ..PidConfig::default()
            },
            distance_per_count: 144.5 / 12556.5,
            motion_timeout: Duration::from_secs(30),
            calibration_timeout: Duration::from_secs(60),
        }
    }
}
