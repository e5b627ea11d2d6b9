use crate::algorithms::geo_projection::validate_coordinate;
use crate::core::{
    GeoCoordinate, LocalPoint, LocalSensorLayout, SensorId, SensorSurvey, DEFAULT_FALLBACK_STEP,
    DEFAULT_MAX_ITERATIONS, DEFAULT_RESIDUAL_TOLERANCE, MIN_SENSORS, SPEED_OF_SOUND_AIR,
};
use crate::validation::error::LocalizationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Largest accepted correlation interpolation factor
pub const MAX_INTERPOLATION: usize = 64;

/// Deployment and algorithm configuration for a [`Localizer`](crate::api::Localizer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizerConfig {
    /// Speed of sound (m/s), also used as the range scale in layout units
    pub speed_of_sound_ms: f64,
    /// Sensor whose survey position anchors the projection and the range differences
    pub reference_sensor: SensorId,
    /// Every microphone in the deployment
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub delay_estimation: DelayEstimatorConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

/// Individual microphone configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: SensorId,
    /// Surveyed geographic placement
    pub survey: GeoCoordinate,
    /// Position in the solver's local frame
    pub layout: LocalPoint,
}

/// GCC-PHAT search parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayEstimatorConfig {
    /// Largest admissible |delay| (seconds); `None` searches every lag
    pub max_delay_s: Option<f64>,
    /// Correlation grid refinement factor
    pub interpolation: usize,
}

/// Multilateration iteration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Absolute residual tolerance in layout units
    pub tolerance: f64,
    pub fallback_step: f64,
    pub max_step_halvings: usize,
}

/// How confidence is assigned to a fix
///
/// The base value depends on where the delays came from; weak phase
/// correlation and each degradation reported by the solver multiply it down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Base confidence for delays measured by phase correlation
    pub raw_audio: f64,
    /// Base confidence for delays supplied by the caller
    pub known_delays: f64,
    /// Factor applied when the residual tolerance was not met
    pub non_converged_factor: f64,
    /// Factor applied when any gradient fallback step was taken
    pub fallback_factor: f64,
    /// Whitened correlation peak below which a measured delay counts as unreliable
    pub min_correlation_peak: f64,
    /// Factor applied when the weakest channel pair falls below `min_correlation_peak`
    pub weak_correlation_factor: f64,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("I/O error: {message}")]
    Io { message: String },
    #[error("Serialization error: {message}")]
    Serialization { message: String },
    #[error("Sensor {0} is configured more than once")]
    DuplicateSensor(SensorId),
    #[error("Reference sensor {0} is not configured")]
    UnknownReference(SensorId),
    #[error("{count} sensors configured, at least {required} required")]
    TooFewSensors { count: usize, required: usize },
}

impl From<ConfigError> for LocalizationError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::InvalidParameter {
                parameter,
                value,
                reason,
            } => LocalizationError::Configuration {
                parameter,
                value,
                reason,
            },
            ConfigError::DuplicateSensor(id) => LocalizationError::Configuration {
                parameter: "sensors".to_string(),
                value: id.to_string(),
                reason: "duplicate sensor id".to_string(),
            },
            ConfigError::UnknownReference(id) => LocalizationError::Configuration {
                parameter: "reference_sensor".to_string(),
                value: id.to_string(),
                reason: "reference sensor is not configured".to_string(),
            },
            ConfigError::TooFewSensors { count, required } => LocalizationError::Configuration {
                parameter: "sensors".to_string(),
                value: count.to_string(),
                reason: format!("at least {required} sensors required"),
            },
            other => LocalizationError::Configuration {
                parameter: "config".to_string(),
                value: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error, if any, as a `Result`
    pub fn into_result(self) -> Result<(), ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for DelayEstimatorConfig {
    fn default() -> Self {
        Self {
            max_delay_s: None,
            interpolation: 1,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_RESIDUAL_TOLERANCE,
            fallback_step: DEFAULT_FALLBACK_STEP,
            max_step_halvings: 4,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            raw_audio: 0.95,
            known_delays: 0.85,
            non_converged_factor: 0.5,
            fallback_factor: 0.8,
            min_correlation_peak: 0.2,
            weak_correlation_factor: 0.5,
        }
    }
}

impl Default for LocalizerConfig {
    /// Three-microphone Boston deployment: survey positions of the fielded
    /// microphones, solved on a 1.5 x 0.75 unit local layout
    fn default() -> Self {
        Self {
            speed_of_sound_ms: SPEED_OF_SOUND_AIR,
            reference_sensor: SensorId(1),
            sensors: vec![
                SensorConfig {
                    id: SensorId(1),
                    survey: GeoCoordinate::new(42.348665779588, -71.08372488708355),
                    layout: LocalPoint::new(0.0, 0.0),
                },
                SensorConfig {
                    id: SensorId(2),
                    survey: GeoCoordinate::new(42.34866577958835, -71.07566610610223),
                    layout: LocalPoint::new(1.5, 0.0),
                },
                SensorConfig {
                    id: SensorId(3),
                    survey: GeoCoordinate::new(42.35165470337558, -71.07969549659289),
                    layout: LocalPoint::new(0.75, 0.75),
                },
            ],
            delay_estimation: DelayEstimatorConfig::default(),
            solver: SolverConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

impl LocalizerConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        Self::from_json_str(&content).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::Serialization {
                message: format!("Failed to parse config file '{}': {}", path_str, message),
            },
            other => other,
        })
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: LocalizerConfig = serde_json::from_str(json).map_err(|e| ConfigError::Serialization {
            message: e.to_string(),
        })?;
        config.validate().into_result()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = self.to_json_string()?;

        fs::write(&path, content).map_err(|e| ConfigError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Check every parameter, collecting all errors rather than stopping at the first
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.speed_of_sound_ms.is_finite() || self.speed_of_sound_ms <= 0.0 {
            result.errors.push(invalid(
                "speed_of_sound_ms",
                self.speed_of_sound_ms,
                "Speed of sound must be positive and finite",
            ));
        } else if !(300.0..=400.0).contains(&self.speed_of_sound_ms) {
            result.warnings.push(format!(
                "Speed of sound {} m/s is outside the usual range for air",
                self.speed_of_sound_ms
            ));
        }

        if self.sensors.len() < MIN_SENSORS {
            result.errors.push(ConfigError::TooFewSensors {
                count: self.sensors.len(),
                required: MIN_SENSORS,
            });
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.id) {
                result.errors.push(ConfigError::DuplicateSensor(sensor.id));
            }
            if let Err(reason) = validate_coordinate(&sensor.survey) {
                result.errors.push(invalid(
                    &format!("sensors[{}].survey", sensor.id),
                    format!("({}, {})", sensor.survey.latitude, sensor.survey.longitude),
                    reason,
                ));
            }
            if !sensor.layout.x.is_finite() || !sensor.layout.y.is_finite() {
                result.errors.push(invalid(
                    &format!("sensors[{}].layout", sensor.id),
                    format!("({}, {})", sensor.layout.x, sensor.layout.y),
                    "Layout position must be finite",
                ));
            }
        }

        if !seen.contains(&self.reference_sensor) {
            result.errors.push(ConfigError::UnknownReference(self.reference_sensor));
        }

        let estimation = &self.delay_estimation;
        if estimation.interpolation == 0 || estimation.interpolation > MAX_INTERPOLATION {
            result.errors.push(invalid(
                "delay_estimation.interpolation",
                estimation.interpolation,
                &format!("Interpolation must be between 1 and {}", MAX_INTERPOLATION),
            ));
        }
        if let Some(max_delay) = estimation.max_delay_s {
            if !max_delay.is_finite() || max_delay <= 0.0 {
                result.errors.push(invalid(
                    "delay_estimation.max_delay_s",
                    max_delay,
                    "Maximum delay must be positive and finite",
                ));
            }
        }

        let solver = &self.solver;
        if solver.max_iterations == 0 {
            result.errors.push(invalid(
                "solver.max_iterations",
                solver.max_iterations,
                "At least one iteration is required",
            ));
        }
        if !solver.tolerance.is_finite() || solver.tolerance <= 0.0 {
            result.errors.push(invalid(
                "solver.tolerance",
                solver.tolerance,
                "Tolerance must be positive and finite",
            ));
        }
        if !solver.fallback_step.is_finite() || solver.fallback_step <= 0.0 {
            result.errors.push(invalid(
                "solver.fallback_step",
                solver.fallback_step,
                "Fallback step must be positive and finite",
            ));
        }

        let confidence = &self.confidence;
        for (name, value) in [
            ("confidence.raw_audio", confidence.raw_audio),
            ("confidence.known_delays", confidence.known_delays),
            ("confidence.non_converged_factor", confidence.non_converged_factor),
            ("confidence.fallback_factor", confidence.fallback_factor),
            ("confidence.min_correlation_peak", confidence.min_correlation_peak),
            ("confidence.weak_correlation_factor", confidence.weak_correlation_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                result.errors.push(invalid(name, value, "Must be within [0, 1]"));
            }
        }
        if confidence.known_delays > confidence.raw_audio {
            result
                .warnings
                .push("Known delays are trusted more than measured audio".to_string());
        }

        result
    }

    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.sensors.iter().map(|s| s.id).collect()
    }

    pub fn survey(&self) -> SensorSurvey {
        self.sensors.iter().map(|s| (s.id, s.survey)).collect()
    }

    pub fn layout(&self) -> LocalSensorLayout {
        self.sensors.iter().map(|s| (s.id, s.layout)).collect()
    }

    pub fn with_speed_of_sound(mut self, speed_of_sound_ms: f64) -> Self {
        self.speed_of_sound_ms = speed_of_sound_ms;
        self
    }

    pub fn with_reference_sensor(mut self, id: SensorId) -> Self {
        self.reference_sensor = id;
        self
    }

    /// Add a sensor, replacing any existing entry with the same id
    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        match self.sensors.iter_mut().find(|s| s.id == sensor.id) {
            Some(existing) => *existing = sensor,
            None => self.sensors.push(sensor),
        }
        self
    }

    pub fn with_max_delay(mut self, max_delay_s: f64) -> Self {
        self.delay_estimation.max_delay_s = Some(max_delay_s);
        self
    }

    pub fn with_interpolation(mut self, interpolation: usize) -> Self {
        self.delay_estimation.interpolation = interpolation;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidenceConfig) -> Self {
        self.confidence = confidence;
        self
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
