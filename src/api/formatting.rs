//! Output formatting for localization results
//!
//! Human-readable text, JSON and CSV renderings of a [`LocalizationResult`].

use crate::core::LocalizationResult;

/// Human-readable text formatter
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    /// Include solver diagnostics and per-sensor delays
    pub include_diagnostics: bool,
    /// Single-line output
    pub compact: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnostics(mut self) -> Self {
        self.include_diagnostics = true;
        self
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn format_text(&self, result: &LocalizationResult) -> String {
        if self.compact {
            return format!(
                "Fix: {:.6}, {:.6} | Conf:{:.0}% | Iter:{}{}",
                result.latitude,
                result.longitude,
                result.confidence * 100.0,
                result.solver.iterations,
                if result.solver.converged { "" } else { " (not converged)" }
            );
        }

        let mut output = String::new();
        output.push_str("Event location:\n");
        output.push_str(&format!("  Latitude:   {:.6}°\n", result.latitude));
        output.push_str(&format!("  Longitude:  {:.6}°\n", result.longitude));
        output.push_str(&format!("  Confidence: {:.0}%\n", result.confidence * 100.0));
        output.push_str(&format!("  Source:     {:?}\n", result.source));
        output.push_str(&format!("  Timestamp:  {:.3} s\n", result.timestamp_s));

        if self.include_diagnostics {
            output.push_str("\nSolver:\n");
            output.push_str(&format!(
                "  Local:      ({:.4}, {:.4})\n",
                result.local_position.x, result.local_position.y
            ));
            output.push_str(&format!("  Converged:  {}\n", result.solver.converged));
            output.push_str(&format!("  Iterations: {}\n", result.solver.iterations));
            output.push_str(&format!("  Residual:   {:.3e}\n", result.solver.final_residual));
            output.push_str(&format!("  Fallbacks:  {}\n", result.solver.fallback_steps));
            if let Some(peak) = result.correlation_peak {
                output.push_str(&format!("  Peak:       {:.3}\n", peak));
            }

            output.push_str("\nDelays:\n");
            for delay in &result.delays {
                output.push_str(&format!(
                    "  {}: {:.3} ms\n",
                    delay.sensor_id,
                    delay.time_delay_s * 1000.0
                ));
            }
        }

        output
    }
}

/// JSON formatter for structured output
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, result: &LocalizationResult) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(result)
        } else {
            serde_json::to_string(result)
        }
    }
}

/// CSV formatter for event logs
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> String {
        "timestamp_s,latitude,longitude,confidence,local_x,local_y,converged,iterations,final_residual"
            .to_string()
    }

    pub fn format_csv(&self, result: &LocalizationResult) -> String {
        format!(
            "{:.3},{:.8},{:.8},{:.3},{:.6},{:.6},{},{},{:.6e}",
            result.timestamp_s,
            result.latitude,
            result.longitude,
            result.confidence,
            result.local_position.x,
            result.local_position.y,
            result.solver.converged,
            result.solver.iterations,
            result.solver.final_residual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DelayReading, LocalPoint, ReadingSource, SensorId, SolverDiagnostics};

    fn sample_result() -> LocalizationResult {
        LocalizationResult {
            latitude: 42.348665,
            longitude: -71.083724,
            timestamp_s: 1_700_000_000.25,
            confidence: 0.85,
            source: ReadingSource::KnownDelays,
            local_position: LocalPoint::new(0.001, -0.002),
            delays: vec![
                DelayReading::new(SensorId(1), 0.0),
                DelayReading::new(SensorId(2), 0.004373),
            ],
            correlation_peak: Some(0.912),
            solver: SolverDiagnostics {
                converged: true,
                iterations: 3,
                final_residual: 2.0e-5,
                fallback_steps: 0,
            },
        }
    }

    #[test]
    fn test_text_formatting() {
        let text = TextFormatter::new().with_diagnostics().format_text(&sample_result());
        assert!(text.contains("Latitude:   42.348665"));
        assert!(text.contains("Confidence: 85%"));
        assert!(text.contains("mic2: 4.373 ms"));
        assert!(text.contains("Peak:       0.912"));

        let compact = TextFormatter::new().compact().format_text(&sample_result());
        assert!(!compact.contains('\n'));
        assert!(compact.starts_with("Fix: 42.348665, -71.083724"));
    }

    #[test]
    fn test_json_formatting() {
        let json = JsonFormatter::new().format_json(&sample_result()).unwrap();
        let parsed: LocalizationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.source, ReadingSource::KnownDelays);
        assert_eq!(parsed.delays.len(), 2);
        assert!((parsed.latitude - 42.348665).abs() < 1e-9);
        assert!(json.contains("\"source\":\"known_delays\""));
    }

    #[test]
    fn test_csv_formatting() {
        let formatter = CsvFormatter::new();
        let columns = formatter.header().split(',').count();
        let row = formatter.format_csv(&sample_result());
        assert_eq!(row.split(',').count(), columns);
        assert!(row.starts_with("1700000000.250,42.34866500"));
    }
}
