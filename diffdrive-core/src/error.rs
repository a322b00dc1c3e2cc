use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HardwareUnavailable,
    CalibrationFailed,
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::HardwareUnavailable => write!(f, "Hardware handle not available"),
            Error::CalibrationFailed => write!(f, "Heading sensor calibration did not complete"),
            Error::InvalidState => write!(f, "Invalid state"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
