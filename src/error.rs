use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Tracking inconsistency: {0}")]
    TrackingInconsistency(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Malformed measurement row: {0}")]
    Csv(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
}
