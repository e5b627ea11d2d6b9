//! Input validation and error reporting

pub mod error;
pub mod readings;

pub use error::{Axis, ErrorSeverity, LocalizationError, LocalizationOutcome};
pub use readings::{normalize_delays, validate_delays, validate_sensor_set};
