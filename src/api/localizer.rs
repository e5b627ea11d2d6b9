//! Gunshot localization pipeline
//!
//! Turns one reading per microphone into a geographic fix: delays are either
//! measured by GCC-PHAT against the reference channel or taken as given, then
//! converted to range differences, solved in the local layout frame and
//! projected through the surveyed reference position.

use crate::algorithms::gcc_phat::{check_signal, DelayEstimator};
use crate::algorithms::geo_projection::{derive_scale_factors, to_geo, ScaleFactors};
use crate::algorithms::multilateration::{MultilaterationSolver, SolverOutcome};
use crate::core::{
    DelayReading, LocalPoint, LocalSensorLayout, LocalizationResult, RawChannelReading,
    ReadingSource, SensorId, SensorReadings, SensorSurvey, SolverDiagnostics,
};
use crate::utils::config::{ConfidenceConfig, LocalizerConfig};
use crate::validation::error::{LocalizationError, LocalizationOutcome};
use crate::validation::readings::{normalize_delays, validate_delays, validate_sensor_set};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn, Dispatch};

/// Localizes acoustic events for one fixed microphone deployment
///
/// Holds only immutable state derived at construction, so a single instance
/// can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Localizer {
    survey: SensorSurvey,
    layout: LocalSensorLayout,
    reference: SensorId,
    scale: ScaleFactors,
    speed_of_sound_ms: f64,
    estimator: DelayEstimator,
    solver: MultilaterationSolver,
    confidence: ConfidenceConfig,
    dispatch: Option<Dispatch>,
}

impl Localizer {
    /// Build a localizer, validating the configuration and calibrating the projection
    pub fn new(config: LocalizerConfig) -> LocalizationOutcome<Self> {
        config.validate().into_result()?;

        let survey = config.survey();
        let layout = config.layout();
        let scale = derive_scale_factors(&survey, &layout, config.reference_sensor)?;

        let mut estimator =
            DelayEstimator::new().with_interpolation(config.delay_estimation.interpolation);
        if let Some(max_delay) = config.delay_estimation.max_delay_s {
            estimator = estimator.with_max_delay(max_delay);
        }

        let solver = MultilaterationSolver {
            max_iterations: config.solver.max_iterations,
            tolerance: config.solver.tolerance,
            fallback_step: config.solver.fallback_step,
            max_step_halvings: config.solver.max_step_halvings,
        };

        Ok(Self {
            survey,
            layout,
            reference: config.reference_sensor,
            scale,
            speed_of_sound_ms: config.speed_of_sound_ms,
            estimator,
            solver,
            confidence: config.confidence,
            dispatch: None,
        })
    }

    /// Route this localizer's diagnostics to `dispatch` instead of the global subscriber
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Surveyed coordinate of every configured microphone
    pub fn sensor_positions(&self) -> &SensorSurvey {
        &self.survey
    }

    pub fn layout(&self) -> &LocalSensorLayout {
        &self.layout
    }

    pub fn reference_sensor(&self) -> SensorId {
        self.reference
    }

    pub fn scale_factors(&self) -> ScaleFactors {
        self.scale
    }

    /// Estimate the origin of the event captured by `readings`
    pub fn localize(&self, readings: SensorReadings) -> LocalizationOutcome<LocalizationResult> {
        match &self.dispatch {
            Some(dispatch) => {
                tracing::dispatcher::with_default(dispatch, || self.localize_inner(readings))
            }
            None => self.localize_inner(readings),
        }
    }

    fn localize_inner(&self, readings: SensorReadings) -> LocalizationOutcome<LocalizationResult> {
        let source = readings.source();
        if let Err(err) = validate_sensor_set(&self.layout.ids(), &readings.sensor_ids()) {
            warn!(error = %err, ?source, "rejected sensor readings");
            return Err(err);
        }
        debug!(sensors = self.layout.0.len(), ?source, "sensor readings validated");

        let (delays, correlation_peak) = match readings {
            SensorReadings::Raw(channels) => {
                let (delays, weakest_peak) = self.derive_delays(&channels)?;
                if weakest_peak < self.confidence.min_correlation_peak {
                    warn!(peak = weakest_peak, "weak phase correlation between channels");
                }
                (delays, Some(weakest_peak))
            }
            SensorReadings::Delays(delays) => {
                validate_delays(&delays)?;
                (normalize_delays(&delays), None)
            }
        };

        let outcome = self.solve_local(&delays)?;
        let (latitude, longitude) = self.project(&outcome.position)?;
        let confidence = self.confidence_for(source, &outcome.diagnostics, correlation_peak);

        if !outcome.diagnostics.converged {
            warn!(
                iterations = outcome.diagnostics.iterations,
                residual = outcome.diagnostics.final_residual,
                "multilateration did not converge"
            );
        }
        info!(
            latitude,
            longitude,
            confidence,
            iterations = outcome.diagnostics.iterations,
            converged = outcome.diagnostics.converged,
            "event localized"
        );

        Ok(LocalizationResult {
            latitude,
            longitude,
            timestamp_s: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64(),
            confidence,
            source,
            local_position: outcome.position,
            delays,
            correlation_peak,
            solver: outcome.diagnostics,
        })
    }

    /// Measure every channel's lag behind the reference channel
    ///
    /// Returns the normalized delays and the weakest correlation peak. The
    /// channel set must already match the configured sensors.
    fn derive_delays(
        &self,
        channels: &[RawChannelReading],
    ) -> LocalizationOutcome<(Vec<DelayReading>, f64)> {
        let reference = channels
            .iter()
            .find(|c| c.sensor_id == self.reference)
            .ok_or_else(|| LocalizationError::MissingSensor {
                missing: vec![self.reference],
                unexpected: vec![],
                duplicated: vec![],
            })?;
        check_signal(&reference.samples, "reference").map_err(|e| e.for_sensor(self.reference))?;

        let mut delays = Vec::with_capacity(channels.len());
        let mut weakest_peak = f64::INFINITY;
        for channel in channels {
            let delay_s = if channel.sensor_id == self.reference {
                0.0
            } else {
                let estimate = self
                    .estimator
                    .estimate(
                        &channel.samples,
                        channel.sample_rate_hz,
                        &reference.samples,
                        reference.sample_rate_hz,
                    )
                    .map_err(|e| e.for_sensor(channel.sensor_id))?;
                debug!(
                    sensor = %channel.sensor_id,
                    delay_s = estimate.delay_s,
                    lag = estimate.lag,
                    peak = estimate.peak,
                    "channel delay estimated"
                );
                weakest_peak = weakest_peak.min(estimate.peak);
                estimate.delay_s
            };
            delays.push(DelayReading::new(channel.sensor_id, delay_s));
        }

        Ok((normalize_delays(&delays), weakest_peak))
    }

    /// Solve for the source in layout units from normalized delays
    fn solve_local(&self, delays: &[DelayReading]) -> LocalizationOutcome<SolverOutcome> {
        let reference_delay = delays
            .iter()
            .find(|d| d.sensor_id == self.reference)
            .map(|d| d.time_delay_s)
            .ok_or_else(|| LocalizationError::MissingSensor {
                missing: vec![self.reference],
                unexpected: vec![],
                duplicated: vec![],
            })?;
        let reference_point = self.layout_point(self.reference)?;

        let mut others = Vec::with_capacity(delays.len().saturating_sub(1));
        for delay in delays.iter().filter(|d| d.sensor_id != self.reference) {
            let range_difference = (delay.time_delay_s - reference_delay) * self.speed_of_sound_ms;
            others.push((self.layout_point(delay.sensor_id)?, range_difference));
        }

        debug!(
            reference = %self.reference,
            range_differences = ?others.iter().map(|(_, r)| *r).collect::<Vec<_>>(),
            "starting multilateration"
        );
        Ok(self.solver.solve(reference_point, &others))
    }

    /// Convert a layout position to latitude/longitude through the reference survey point
    fn project(&self, position: &LocalPoint) -> LocalizationOutcome<(f64, f64)> {
        let origin = self.layout_point(self.reference)?;
        let anchor = self
            .survey
            .get(self.reference)
            .copied()
            .ok_or_else(|| LocalizationError::MissingSensor {
                missing: vec![self.reference],
                unexpected: vec![],
                duplicated: vec![],
            })?;

        let (x_m, y_m) = self.scale.to_meters(position, &origin);
        Ok(to_geo(anchor.latitude, anchor.longitude, x_m, y_m))
    }

    fn confidence_for(
        &self,
        source: ReadingSource,
        diagnostics: &SolverDiagnostics,
        correlation_peak: Option<f64>,
    ) -> f64 {
        let mut confidence = match source {
            ReadingSource::RawAudio => self.confidence.raw_audio,
            ReadingSource::KnownDelays => self.confidence.known_delays,
        };
        if correlation_peak.is_some_and(|peak| peak < self.confidence.min_correlation_peak) {
            confidence *= self.confidence.weak_correlation_factor;
        }
        if !diagnostics.converged {
            confidence *= self.confidence.non_converged_factor;
        }
        if diagnostics.fallback_steps > 0 {
            confidence *= self.confidence.fallback_factor;
        }
        confidence.clamp(0.0, 1.0)
    }

    fn layout_point(&self, id: SensorId) -> LocalizationOutcome<LocalPoint> {
        self.layout
            .get(id)
            .copied()
            .ok_or_else(|| LocalizationError::MissingSensor {
                missing: vec![id],
                unexpected: vec![],
                duplicated: vec![],
            })
    }
}
