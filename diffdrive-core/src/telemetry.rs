use crate::drive::Axis;

/// One controller sample from a motion-loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct PidSample {
    pub axis: Axis,
    pub target: f32,
    pub measurement: f32,
    pub error: f32,
    pub output: f32,
}

/// Sink for per-iteration controller samples.
///
/// The drive base publishes into whatever sink it was built with; the
/// default method drops everything, so callers without a display pay
/// nothing for the hook.
pub trait Telemetry {
    fn pid_sample(&mut self, _sample: &PidSample) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {}

/// Routes samples to the log facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn pid_sample(&mut self, sample: &PidSample) {
        log::debug!(
            "{:?} pid: target={:.2} input={:.2} error={:.2} output={:.2}",
            sample.axis,
            sample.target,
            sample.measurement,
            sample.error,
            sample.output
        );
    }
}
