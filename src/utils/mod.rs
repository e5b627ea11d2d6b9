//! Configuration utilities

pub mod config;

pub use config::{
    ConfidenceConfig, ConfigError, DelayEstimatorConfig, LocalizerConfig, SensorConfig,
    SolverConfig, ValidationResult,
};
