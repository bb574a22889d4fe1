//! Error taxonomy for the controller.
//!
//! Each class maps to a recovery policy: configuration problems abort
//! startup and never surface at runtime, sensor problems degrade a single
//! field for one cycle, actuator problems are fatal and force the safe
//! shutdown posture, sink problems are logged and the cycle proceeds.

use std::path::PathBuf;
use thiserror::Error;

/// Bad calibration, schedule, or wiring values. Raised at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    /// One message per violation, every violation reported at once.
    #[error("invalid configuration:\n  - {details}")]
    Invalid { details: String },
}

/// Transient sensor read failure. The affected field degrades for the
/// current cycle; the loop keeps running.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("{sensor}: read failed: {reason}")]
    ReadFailed { sensor: &'static str, reason: String },

    /// A frame arrived but failed its checksum or plausibility bounds.
    #[cfg(feature = "gpio")]
    #[error("{sensor}: returned implausible data: {reason}")]
    InvalidData { sensor: &'static str, reason: String },
}

/// Relay command failure. Once a command fails the true relay state is
/// unknowable (there is no feedback sensing), so this is fatal and forces
/// the emergency shutdown posture.
#[derive(Debug, Error)]
#[error("{output}: command failed: {reason}")]
pub struct ActuatorError {
    pub output: &'static str,
    pub reason: String,
}

/// Local telemetry log failure. Non-fatal; the cycle proceeds.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to open telemetry log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append to telemetry log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Cloud uplink failure. Non-fatal; the cycle proceeds.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector rejected update: http {status}")]
    Status { status: u16 },
}
