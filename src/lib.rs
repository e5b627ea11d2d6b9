//! Acoustic Gunshot Localization
//!
//! Estimates the geographic origin of an impulsive sound from the arrival-time
//! differences at three or more fixed microphones: GCC-PHAT delay estimation,
//! damped Newton multilateration and an equirectangular projection onto the
//! surveyed microphone coordinates.

pub mod core;
pub mod algorithms;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use core::{
    DelayReading, GeoCoordinate, LocalPoint, LocalSensorLayout, LocalizationResult,
    RawChannelReading, ReadingSource, SensorId, SensorReadings, SensorSurvey, SolverDiagnostics,
    SPEED_OF_SOUND_AIR,
};
pub use algorithms::{
    estimate_delay, solve_position, to_geo, to_local_meters, DelayEstimator, MultilaterationSolver,
};
pub use validation::{LocalizationError, LocalizationOutcome};
pub use utils::{ConfigError, LocalizerConfig};
pub use api::{JsonFormatter, Localizer, TextFormatter};
