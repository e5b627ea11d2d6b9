//! Reading-set validation and delay normalization
//!
//! Every request must carry exactly one reading per configured microphone.
//! Anything else is rejected with the full mismatch so the caller can report
//! which microphones are at fault.

use crate::core::{DelayReading, SensorId};
use crate::validation::error::{LocalizationError, LocalizationOutcome};
use std::collections::BTreeSet;

/// Check that `provided` names every id in `expected` exactly once and nothing else
pub fn validate_sensor_set(expected: &[SensorId], provided: &[SensorId]) -> LocalizationOutcome<()> {
    let expected_set: BTreeSet<SensorId> = expected.iter().copied().collect();

    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for id in provided {
        if !seen.insert(*id) {
            duplicated.insert(*id);
        }
    }

    let missing: Vec<SensorId> = expected_set.difference(&seen).copied().collect();
    let unexpected: Vec<SensorId> = seen.difference(&expected_set).copied().collect();

    if missing.is_empty() && unexpected.is_empty() && duplicated.is_empty() {
        return Ok(());
    }

    Err(LocalizationError::MissingSensor {
        missing,
        unexpected,
        duplicated: duplicated.into_iter().collect(),
    })
}

/// Reject delays that are NaN or infinite
pub fn validate_delays(delays: &[DelayReading]) -> LocalizationOutcome<()> {
    for reading in delays {
        if !reading.time_delay_s.is_finite() {
            return Err(LocalizationError::invalid_signal(format!(
                "time delay {} is not finite",
                reading.time_delay_s
            ))
            .for_sensor(reading.sensor_id));
        }
    }
    Ok(())
}

/// Shift delays so the earliest arrival reads exactly zero
///
/// Pairwise differences are preserved; an empty input yields an empty output.
pub fn normalize_delays(delays: &[DelayReading]) -> Vec<DelayReading> {
    let min_delay = delays
        .iter()
        .map(|d| d.time_delay_s)
        .fold(f64::INFINITY, f64::min);

    delays
        .iter()
        .map(|d| DelayReading::new(d.sensor_id, d.time_delay_s - min_delay))
        .collect()
}
