use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncoderError {
    #[error("sensor initialisation failed: {0}")]
    SensorInit(String),
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("sensor hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor driver")]
    MissingSensor,
    #[error("missing encoder outputs")]
    MissingOutputs,
    #[error("missing calibration")]
    MissingCalibration,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
