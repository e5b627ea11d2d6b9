//! Time-delay estimation with GCC-PHAT
//!
//! Generalized cross-correlation with the phase transform: the cross-power
//! spectrum of the two channels is normalized to unit magnitude in every bin
//! before the inverse transform, so microphones with different gain or noise
//! floors still produce a sharp correlation peak at the true lag.
//!
//! ```text
//!  ref ──► FFT ─┐
//!               ├─► CMP·conj(REF) ─► /|·| ─► zero-pad ─► IFFT ─► argmax|cc| ─► -lag/(interp·fs)
//!  cmp ──► FFT ─┘
//! ```
//!
//! Sub-sample resolution comes from zero-padding the whitened spectrum by the
//! interpolation factor before the inverse transform. There is no iterative
//! refinement beyond that grid.

use crate::validation::error::{LocalizationError, LocalizationOutcome};
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Bins weaker than this fraction of the strongest bin are dropped before whitening
const PHAT_FLOOR: f64 = 1e-12;

/// Result of one pairwise delay estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayEstimate {
    /// How much the reference signal lags the comparison signal (seconds)
    pub delay_s: f64,
    /// Peak lag on the interpolated grid (comparison relative to reference)
    pub lag: i64,
    /// Height of the whitened correlation peak, 1.0 for a perfect match
    pub peak: f64,
}

/// GCC-PHAT delay estimator
///
/// Holds only the search parameters; every call plans its own transforms and
/// owns its buffers, so one estimator can serve concurrent callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayEstimator {
    /// Largest admissible |delay| in seconds, `None` searches every lag
    max_delay_s: Option<f64>,
    /// Correlation grid refinement factor (>= 1)
    interpolation: usize,
}

impl Default for DelayEstimator {
    fn default() -> Self {
        Self {
            max_delay_s: None,
            interpolation: 1,
        }
    }
}

impl DelayEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the lag search to |delay| <= `max_delay_s`
    pub fn with_max_delay(mut self, max_delay_s: f64) -> Self {
        self.max_delay_s = Some(max_delay_s);
        self
    }

    /// Refine the correlation grid to 1/(interpolation * fs)
    pub fn with_interpolation(mut self, interpolation: usize) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn max_delay_s(&self) -> Option<f64> {
        self.max_delay_s
    }

    pub fn interpolation(&self) -> usize {
        self.interpolation
    }

    /// Estimate how much `reference` lags `comparison`, in seconds
    ///
    /// A comparison signal that is a copy of the reference delayed by `d`
    /// seconds yields `-d`.
    pub fn estimate_delay(
        &self,
        reference: &[f64],
        reference_rate_hz: u32,
        comparison: &[f64],
        comparison_rate_hz: u32,
    ) -> LocalizationOutcome<f64> {
        self.estimate(reference, reference_rate_hz, comparison, comparison_rate_hz)
            .map(|estimate| estimate.delay_s)
    }

    /// Full estimate including the correlation peak
    pub fn estimate(
        &self,
        reference: &[f64],
        reference_rate_hz: u32,
        comparison: &[f64],
        comparison_rate_hz: u32,
    ) -> LocalizationOutcome<DelayEstimate> {
        check_signal(reference, "reference")?;
        check_signal(comparison, "comparison")?;
        if reference_rate_hz == 0 {
            return Err(LocalizationError::invalid_signal("sample rate must be positive"));
        }
        if reference_rate_hz != comparison_rate_hz {
            return Err(LocalizationError::invalid_signal(format!(
                "sample rates differ: {} Hz vs {} Hz",
                reference_rate_hz, comparison_rate_hz
            )));
        }
        if self.interpolation == 0 {
            return Err(LocalizationError::invalid_signal("interpolation factor must be at least 1"));
        }
        if let Some(max_delay) = self.max_delay_s {
            if !max_delay.is_finite() || max_delay <= 0.0 {
                return Err(LocalizationError::invalid_signal(format!(
                    "maximum delay {} s must be positive",
                    max_delay
                )));
            }
        }

        let fs = reference_rate_hz as f64;
        let cc = self.whitened_correlation(reference, comparison);
        let m = cc.len();

        let mut max_shift = m / 2;
        if let Some(max_delay) = self.max_delay_s {
            let limit = (self.interpolation as f64 * fs * max_delay).floor() as usize;
            max_shift = max_shift.min(limit);
        }

        let mut best_lag: i64 = 0;
        let mut best_value = f64::NEG_INFINITY;
        for lag in -(max_shift as i64)..=(max_shift as i64) {
            let value = cc[lag.rem_euclid(m as i64) as usize].abs();
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
        }

        Ok(DelayEstimate {
            delay_s: -(best_lag as f64) / (self.interpolation as f64 * fs),
            lag: best_lag,
            peak: best_value,
        })
    }

    /// Whitened cross-correlation on the interpolated lag grid
    ///
    /// Index `k` holds lag `k` for the first half and lag `k - len` for the
    /// second half, as an inverse DFT lays them out.
    pub fn correlate(&self, reference: &[f64], comparison: &[f64]) -> LocalizationOutcome<Vec<f64>> {
        check_signal(reference, "reference")?;
        check_signal(comparison, "comparison")?;
        if self.interpolation == 0 {
            return Err(LocalizationError::invalid_signal("interpolation factor must be at least 1"));
        }
        Ok(self.whitened_correlation(reference, comparison))
    }

    /// Correlation of inputs already checked by the caller
    fn whitened_correlation(&self, reference: &[f64], comparison: &[f64]) -> Vec<f64> {
        // Combined length keeps the circular correlation free of wraparound
        let n = reference.len() + comparison.len();
        let interpolation = self.interpolation.max(1);
        let m = n * interpolation;

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);

        let mut ref_spectrum = zero_padded(reference, n);
        let mut cmp_spectrum = zero_padded(comparison, n);
        forward.process(&mut ref_spectrum);
        forward.process(&mut cmp_spectrum);

        let cross: Vec<Complex64> = cmp_spectrum
            .iter()
            .zip(ref_spectrum.iter())
            .map(|(c, r)| *c * r.conj())
            .collect();

        let strongest = cross.iter().map(|c| c.norm()).fold(0.0, f64::max);
        let floor = strongest * PHAT_FLOOR;
        let whitened: Vec<Complex64> = cross
            .iter()
            .map(|c| {
                let magnitude = c.norm();
                if magnitude > floor && magnitude > 0.0 {
                    *c / magnitude
                } else {
                    Complex64::new(0.0, 0.0)
                }
            })
            .collect();

        // Zero-pad between positive and negative frequencies
        let mut spectrum = vec![Complex64::new(0.0, 0.0); m];
        let positive = (n - 1) / 2;
        spectrum[..=positive].copy_from_slice(&whitened[..=positive]);
        for k in 1..=positive {
            spectrum[m - k] = whitened[n - k];
        }
        if n % 2 == 0 {
            // Nyquist bin is shared by both halves of the padded spectrum
            let nyquist = whitened[n / 2] * 0.5;
            spectrum[n / 2] += nyquist;
            spectrum[m - n / 2] += nyquist;
        }

        let inverse = planner.plan_fft_inverse(m);
        inverse.process(&mut spectrum);

        let scale = 1.0 / n as f64;
        spectrum.iter().map(|c| c.re * scale).collect()
    }
}

/// One-shot delay estimate with explicit options
///
/// `max_delay_s` bounds the search window, `interpolation` defaults to 1.
pub fn estimate_delay(
    reference: &[f64],
    reference_rate_hz: u32,
    comparison: &[f64],
    comparison_rate_hz: u32,
    max_delay_s: Option<f64>,
    interpolation: Option<usize>,
) -> LocalizationOutcome<f64> {
    let mut estimator = DelayEstimator::new().with_interpolation(interpolation.unwrap_or(1));
    if let Some(max_delay) = max_delay_s {
        estimator = estimator.with_max_delay(max_delay);
    }
    estimator.estimate_delay(reference, reference_rate_hz, comparison, comparison_rate_hz)
}

pub(crate) fn check_signal(samples: &[f64], label: &str) -> LocalizationOutcome<()> {
    if samples.is_empty() {
        return Err(LocalizationError::invalid_signal(format!("{label} buffer is empty")));
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(LocalizationError::invalid_signal(format!(
            "{label} sample {index} is not finite"
        )));
    }
    if samples.iter().all(|&s| s == 0.0) {
        return Err(LocalizationError::invalid_signal(format!("{label} buffer is silent")));
    }
    Ok(())
}

fn zero_padded(samples: &[f64], len: usize) -> Vec<Complex64> {
    let mut buffer: Vec<Complex64> = samples.iter().map(|&s| Complex64::new(s, 0.0)).collect();
    buffer.resize(len, Complex64::new(0.0, 0.0));
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 1000;

    /// Deterministic broadband noise in [-1, 1)
    fn noise(seed: u64, len: usize) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    fn delayed(signal: &[f64], samples: usize) -> Vec<f64> {
        let mut out = vec![0.0; samples];
        out.extend_from_slice(&signal[..signal.len() - samples]);
        out
    }

    /// Sum of 30 incommensurate tones below 0.4 fs, evaluated at t - shift
    fn multitone(len: usize, shift: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 - shift;
                (1..=30)
                    .map(|k| {
                        let k = k as f64;
                        let freq = 0.013 * k + 0.007 * k.sin();
                        let phase = 1.3 * (k - 1.0) * (k - 1.0);
                        (2.0 * std::f64::consts::PI * freq * t + phase).cos()
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_zero_delay_detection() {
        let signal = noise(12345, 128);
        let delay = DelayEstimator::new()
            .estimate_delay(&signal, FS, &signal, FS)
            .unwrap();
        assert!(delay.abs() < 1.0 / FS as f64, "zero delay expected, got {delay}");
    }

    #[test]
    fn test_known_integer_delay() {
        let signal = noise(12345, 128);
        let shifted = delayed(&signal, 7);
        let estimator = DelayEstimator::new();

        let delay = estimator.estimate_delay(&signal, FS, &shifted, FS).unwrap();
        assert!((delay + 0.007).abs() < 1e-9, "expected -7 ms, got {delay}");

        // Swapping the arguments flips the sign
        let delay = estimator.estimate_delay(&shifted, FS, &signal, FS).unwrap();
        assert!((delay - 0.007).abs() < 1e-9, "expected +7 ms, got {delay}");
    }

    #[test]
    fn test_gain_mismatch_with_interpolation() {
        let signal = noise(12345, 128);
        let louder: Vec<f64> = delayed(&signal, 7).iter().map(|s| s * 2.5).collect();

        let estimate = DelayEstimator::new()
            .with_interpolation(4)
            .estimate(&signal, FS, &louder, FS)
            .unwrap();
        assert!((estimate.delay_s + 0.007).abs() <= 1.0 / (4.0 * FS as f64) + 1e-12);
        assert!(estimate.peak > 0.5, "peak {} too weak", estimate.peak);
    }

    #[test]
    fn test_fractional_delay_recovered() {
        let reference = multitone(128, 0.0);
        let comparison = multitone(128, 2.5);

        let delay = estimate_delay(&reference, FS, &comparison, FS, None, Some(2)).unwrap();
        let grid = 1.0 / (2.0 * FS as f64);
        assert!(
            (delay + 0.0025).abs() <= grid + 1e-12,
            "expected -2.5 ms within {grid}, got {delay}"
        );
    }

    #[test]
    fn test_unequal_lengths() {
        let source = noise(999, 160);
        let reference = source[..128].to_vec();
        let mut comparison = vec![0.0; 12];
        comparison.extend_from_slice(&source[..148]);

        let delay = estimate_delay(&reference, FS, &comparison, FS, None, None).unwrap();
        assert!((delay + 0.012).abs() < 1e-9, "expected -12 ms, got {delay}");
    }

    #[test]
    fn test_additive_noise() {
        let source = noise(999, 160);
        let interference = noise(42, 160);

        let mut reference = vec![0.0; 20];
        reference.extend_from_slice(&source[..108]);
        let mut comparison = vec![0.0; 25];
        comparison.extend_from_slice(&source[..103]);
        for (sample, n) in comparison.iter_mut().zip(interference.iter()) {
            *sample += 0.3 * n;
        }

        let delay = estimate_delay(&reference, FS, &comparison, FS, None, None).unwrap();
        assert!((delay + 0.005).abs() < 1e-9, "expected -5 ms, got {delay}");
    }

    #[test]
    fn test_search_window_bounds_result() {
        let signal = noise(12345, 128);
        let shifted = delayed(&signal, 7);

        let delay = estimate_delay(&signal, FS, &shifted, FS, Some(0.003), None).unwrap();
        assert!(delay.abs() <= 0.003 + 1e-12, "delay {delay} escaped the window");
    }

    #[test]
    fn test_correlation_length_scales_with_interpolation() {
        let signal = noise(7, 64);
        let cc = DelayEstimator::new()
            .with_interpolation(3)
            .correlate(&signal, &signal[..32])
            .unwrap();
        assert_eq!(cc.len(), 3 * (64 + 32));
    }

    #[test]
    fn test_correlate_rejects_malformed_input() {
        let signal = noise(7, 64);
        let mut broken = signal.clone();
        broken[10] = f64::NAN;
        let estimator = DelayEstimator::new();

        let err = estimator.correlate(&signal, &broken).unwrap_err();
        assert_eq!(err.code(), "invalid_signal");
        assert!(err.to_string().contains("comparison sample 10"));
        assert!(estimator.correlate(&[], &signal).is_err());
        assert!(DelayEstimator::new()
            .with_interpolation(0)
            .correlate(&signal, &signal)
            .is_err());
    }

    #[test]
    fn test_peak_separates_correlated_from_independent_noise() {
        let signal = noise(12345, 256);
        let estimator = DelayEstimator::new();

        let matched = estimator.estimate(&signal, FS, &delayed(&signal, 9), FS).unwrap();
        let independent = estimator.estimate(&signal, FS, &noise(777, 256), FS).unwrap();
        assert!(matched.peak > 0.9, "matched peak {}", matched.peak);
        assert!(independent.peak < 0.3, "independent peak {}", independent.peak);
    }

    #[test]
    fn test_deterministic() {
        let signal = noise(5, 100);
        let shifted = delayed(&signal, 3);
        let estimator = DelayEstimator::new().with_interpolation(2);
        let first = estimator.estimate(&signal, FS, &shifted, FS).unwrap();
        let second = estimator.estimate(&signal, FS, &shifted, FS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_signals() {
        let signal = noise(1, 32);
        let err = estimate_delay(&[], FS, &signal, FS, None, None).unwrap_err();
        assert_eq!(err.code(), "invalid_signal");
        let err = estimate_delay(&signal, FS, &[], FS, None, None).unwrap_err();
        assert_eq!(err.code(), "invalid_signal");
    }

    #[test]
    fn test_malformed_requests() {
        let signal = noise(1, 32);
        assert!(estimate_delay(&signal, FS, &signal, 2 * FS, None, None).is_err());
        assert!(estimate_delay(&signal, 0, &signal, 0, None, None).is_err());
        assert!(estimate_delay(&signal, FS, &signal, FS, None, Some(0)).is_err());
        assert!(estimate_delay(&signal, FS, &signal, FS, Some(-1.0), None).is_err());
        assert!(estimate_delay(&[0.0; 16], FS, &signal, FS, None, None).is_err());

        let mut broken = signal.clone();
        broken[4] = f64::NAN;
        assert!(estimate_delay(&signal, FS, &broken, FS, None, None).is_err());
    }
}
