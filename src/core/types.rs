//! Core data types for the localization system

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a fixed microphone in the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u16);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mic{}", self.0)
    }
}

impl From<u16> for SensorId {
    fn from(id: u16) -> Self {
        SensorId(id)
    }
}

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Position in the local planar frame of the sensor layout
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &LocalPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub(crate) fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub(crate) fn from_vector(v: Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }
}

/// Surveyed geographic placement of every microphone
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSurvey(pub BTreeMap<SensorId, GeoCoordinate>);

impl SensorSurvey {
    pub fn get(&self, id: SensorId) -> Option<&GeoCoordinate> {
        self.0.get(&id)
    }

    pub fn ids(&self) -> Vec<SensorId> {
        self.0.keys().copied().collect()
    }
}

impl FromIterator<(SensorId, GeoCoordinate)> for SensorSurvey {
    fn from_iter<I: IntoIterator<Item = (SensorId, GeoCoordinate)>>(iter: I) -> Self {
        SensorSurvey(iter.into_iter().collect())
    }
}

/// Microphone positions in the solver's local frame
///
/// Units are arbitrary but must be proportional to the survey geometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalSensorLayout(pub BTreeMap<SensorId, LocalPoint>);

impl LocalSensorLayout {
    pub fn get(&self, id: SensorId) -> Option<&LocalPoint> {
        self.0.get(&id)
    }

    pub fn ids(&self) -> Vec<SensorId> {
        self.0.keys().copied().collect()
    }
}

impl FromIterator<(SensorId, LocalPoint)> for LocalSensorLayout {
    fn from_iter<I: IntoIterator<Item = (SensorId, LocalPoint)>>(iter: I) -> Self {
        LocalSensorLayout(iter.into_iter().collect())
    }
}

/// One microphone's captured waveform
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannelReading {
    pub sensor_id: SensorId,
    /// Amplitude samples in capture order
    pub samples: Vec<f64>,
    /// Sample rate (Hz)
    pub sample_rate_hz: u32,
}

impl RawChannelReading {
    pub fn new(sensor_id: SensorId, samples: Vec<f64>, sample_rate_hz: u32) -> Self {
        Self {
            sensor_id,
            samples,
            sample_rate_hz,
        }
    }
}

/// Arrival-time offset of one microphone relative to the others (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayReading {
    pub sensor_id: SensorId,
    pub time_delay_s: f64,
}

impl DelayReading {
    pub fn new(sensor_id: SensorId, time_delay_s: f64) -> Self {
        Self {
            sensor_id,
            time_delay_s,
        }
    }
}

/// Input accepted by the localizer: one reading per configured microphone
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReadings {
    /// Synchronized waveforms, delays are estimated by phase correlation
    Raw(Vec<RawChannelReading>),
    /// Delays already measured upstream
    Delays(Vec<DelayReading>),
}

impl SensorReadings {
    /// Sensor ids in input order, duplicates included
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        match self {
            SensorReadings::Raw(channels) => channels.iter().map(|c| c.sensor_id).collect(),
            SensorReadings::Delays(delays) => delays.iter().map(|d| d.sensor_id).collect(),
        }
    }

    pub fn source(&self) -> ReadingSource {
        match self {
            SensorReadings::Raw(_) => ReadingSource::RawAudio,
            SensorReadings::Delays(_) => ReadingSource::KnownDelays,
        }
    }
}

/// Where the delays behind a fix came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    RawAudio,
    KnownDelays,
}

/// Termination status of the multilateration iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverDiagnostics {
    /// All residuals fell within tolerance
    pub converged: bool,
    /// Newton iterations performed
    pub iterations: usize,
    /// Euclidean norm of the residual vector at the returned estimate
    pub final_residual: f64,
    /// Iterations that took the gradient fallback instead of a Newton step
    pub fallback_steps: usize,
}

/// Estimated origin of an acoustic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix time (seconds) the fix was produced
    pub timestamp_s: f64,
    /// Coarse quality indicator in [0, 1], not a calibrated probability
    pub confidence: f64,
    pub source: ReadingSource,
    /// Solver output in layout units, before scaling
    pub local_position: LocalPoint,
    /// Normalized delays the fix was computed from
    pub delays: Vec<DelayReading>,
    /// Weakest whitened correlation peak over the measured channel pairs,
    /// `None` when the delays were supplied
    #[serde(default)]
    pub correlation_peak: Option<f64>,
    pub solver: SolverDiagnostics,
}
