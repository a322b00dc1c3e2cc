use std::error::Error;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chassis {
    pub tick_ms: u64,
    pub counts_per_sec: f64,
    pub turn_rate: f64,
    pub motor_lag: f64,
    pub calibration_ms: u64,
    pub encoder_noise: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteStep {
    Drive { distance: f32 },
    Spin { degrees: f32 },
    DriveToLine { distance: f32, line_at: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub steps: Vec<RouteStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub chassis: Chassis,
    pub route: Route,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        let settings: Settings = toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/configs/default.toml"
        )))?;

        Ok(settings)
    }
}
