use crate::core::SensorId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for localization operations
pub type LocalizationOutcome<T> = Result<T, LocalizationError>;

/// Errors raised by the localization core
///
/// Solver non-convergence is not an error; it is reported through
/// [`SolverDiagnostics`](crate::core::SolverDiagnostics) instead.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LocalizationError {
    /// Reading set does not match the configured sensor set exactly
    #[error("sensor set mismatch (missing: {missing:?}, unexpected: {unexpected:?}, duplicated: {duplicated:?})")]
    MissingSensor {
        missing: Vec<SensorId>,
        unexpected: Vec<SensorId>,
        duplicated: Vec<SensorId>,
    },

    /// Empty or malformed waveform, or a malformed estimation request
    #[error("invalid signal{}: {reason}", sensor_suffix(.sensor))]
    InvalidSignal {
        sensor: Option<SensorId>,
        reason: String,
    },

    /// Sensor layout cannot calibrate an axis
    #[error("degenerate sensor geometry on {axis:?} axis (displacement {displacement})")]
    DegenerateGeometry { axis: Axis, displacement: f64 },

    /// Malformed configuration value
    #[error("invalid configuration '{parameter}' = {value}: {reason}")]
    Configuration {
        parameter: String,
        value: String,
        reason: String,
    },
}

fn sensor_suffix(sensor: &Option<SensorId>) -> String {
    sensor.map(|id| format!(" from {id}")).unwrap_or_default()
}

/// Planar axis of the local frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Critical, // Localizer cannot be constructed
    High,     // This request cannot produce a fix
}

impl LocalizationError {
    pub(crate) fn invalid_signal(reason: impl Into<String>) -> Self {
        LocalizationError::InvalidSignal {
            sensor: None,
            reason: reason.into(),
        }
    }

    /// Attach the sensor a signal error originated from
    pub(crate) fn for_sensor(self, id: SensorId) -> Self {
        match self {
            LocalizationError::InvalidSignal { reason, .. } => LocalizationError::InvalidSignal {
                sensor: Some(id),
                reason,
            },
            other => other,
        }
    }

    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            LocalizationError::MissingSensor { .. } => "missing_sensor",
            LocalizationError::InvalidSignal { .. } => "invalid_signal",
            LocalizationError::DegenerateGeometry { .. } => "degenerate_geometry",
            LocalizationError::Configuration { .. } => "configuration",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LocalizationError::DegenerateGeometry { .. } | LocalizationError::Configuration { .. } => {
                ErrorSeverity::Critical
            }
            LocalizationError::MissingSensor { .. } | LocalizationError::InvalidSignal { .. } => {
                ErrorSeverity::High
            }
        }
    }

    /// Whether the error is the caller's input rather than the deployment setup
    pub fn is_request_error(&self) -> bool {
        self.severity() == ErrorSeverity::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = LocalizationError::MissingSensor {
            missing: vec![SensorId(3)],
            unexpected: vec![],
            duplicated: vec![],
        };
        assert_eq!(err.code(), "missing_sensor");
        assert!(err.is_request_error());

        let err = LocalizationError::DegenerateGeometry {
            axis: Axis::Y,
            displacement: 0.0,
        };
        assert_eq!(err.code(), "degenerate_geometry");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_invalid_signal_display_names_sensor() {
        let err = LocalizationError::invalid_signal("empty buffer").for_sensor(SensorId(2));
        assert_eq!(err.to_string(), "invalid signal from mic2: empty buffer");

        let err = LocalizationError::invalid_signal("empty buffer");
        assert_eq!(err.to_string(), "invalid signal: empty buffer");
    }

    #[test]
    fn test_error_serialization() {
        let err = LocalizationError::MissingSensor {
            missing: vec![SensorId(1)],
            unexpected: vec![SensorId(9)],
            duplicated: vec![],
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: LocalizationError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
