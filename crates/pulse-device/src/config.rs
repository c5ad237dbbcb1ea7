use pulse_lib::detectors::ppg::PpgDetectorConfig;
use pulse_lib::io::history::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};

/// Timing and capacity knobs of the control program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Sampling timer rate (Hz).
    pub sample_rate_hz: u32,
    /// Splash screen duration (ms).
    pub splash_ms: u64,
    /// Give up connecting after this long (ms).
    pub connect_timeout_ms: u64,
    /// Measurement window of the local and remote analyses (ms).
    pub analysis_ms: u64,
    /// How long to wait for the remote analysis response (ms).
    pub response_timeout_ms: u64,
    /// Intervals kept for the live heart-rate readout.
    pub live_ppi_capacity: usize,
    /// Intervals kept for an analysis run.
    pub analysis_ppi_capacity: usize,
    pub history_capacity: usize,
    /// Minimum time between two accepted button edges (ms).
    pub debounce_ms: u64,
    /// Confirming a viewed analysis republishes it on the local topic.
    pub upload_after_view: bool,
    /// Display repaint period (ms).
    pub render_period_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250,
            splash_ms: 2200,
            connect_timeout_ms: 15_000,
            analysis_ms: 30_000,
            response_timeout_ms: 10_000,
            live_ppi_capacity: 10,
            analysis_ppi_capacity: 50,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            debounce_ms: 250,
            upload_after_view: true,
            render_period_ms: 30,
        }
    }
}

impl DeviceConfig {
    pub fn detector(&self, ppi_capacity: usize) -> PpgDetectorConfig {
        PpgDetectorConfig {
            fs_hz: self.sample_rate_hz,
            ..PpgDetectorConfig::default()
        }
        .with_ppi_capacity(ppi_capacity)
    }

    /// Sample period rounded to whole milliseconds, at least 1.
    pub fn sample_period_ms(&self) -> u64 {
        (1000 / u64::from(self.sample_rate_hz.max(1))).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: DeviceConfig = serde_json::from_str(r#"{"analysis_ms": 5000}"#).unwrap();
        assert_eq!(cfg.analysis_ms, 5000);
        assert_eq!(cfg.splash_ms, 2200);
        assert!(cfg.upload_after_view);
        assert_eq!(cfg.sample_period_ms(), 4);
        assert_eq!(cfg.detector(50).ppi_capacity, 50);
        assert_eq!(cfg.detector(50).fs_hz, 250);
    }
}
