use crate::signal::{is_valid_ppi, PpiSeries, Sample, SampleSource, SlidingWindow};
use serde::{Deserialize, Serialize};

/// Configurable parameters for the streaming PPG pulse detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PpgDetectorConfig {
    /// Sampling rate of the incoming stream (Hz).
    pub fs_hz: u32,
    /// Sliding window length (samples).
    pub window_len: usize,
    /// Samples required before detection starts.
    pub warmup: usize,
    /// How often the threshold is recomputed (samples).
    pub threshold_refresh: u64,
    /// Fraction of the window's peak-to-peak range added to its minimum.
    pub threshold_scale: f64,
    /// Length of the short rolling averages used for edge and trend checks.
    pub trend_len: usize,
    /// Maximum number of intervals retained.
    pub ppi_capacity: usize,
}

impl Default for PpgDetectorConfig {
    fn default() -> Self {
        Self {
            fs_hz: 250,
            window_len: 500,
            warmup: 500,
            threshold_refresh: 125,
            threshold_scale: 0.6,
            trend_len: 5,
            ppi_capacity: 10,
        }
    }
}

impl PpgDetectorConfig {
    pub fn with_ppi_capacity(mut self, capacity: usize) -> Self {
        self.ppi_capacity = capacity;
        self
    }
}

/// What a single pipeline step produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    /// A new sample was pulled from the source.
    pub sampled: bool,
    /// Interval accepted into the PPI sequence on this step.
    pub accepted: Option<i32>,
}

/// Streaming adaptive-threshold rising-edge detector.
///
/// Threshold: `min + threshold_scale * (max - min)` over the sliding window,
/// refreshed every `threshold_refresh` samples. A rising edge needs the short
/// average of the newest `trend_len` samples above the threshold and not below
/// the average of the `trend_len` samples before it.
#[derive(Debug, Clone)]
pub struct PpgPipeline {
    cfg: PpgDetectorConfig,
    window: SlidingWindow,
    ppi: PpiSeries,
    edge: bool,
    threshold: Option<f64>,
    peak_sample: Option<u64>,
    prev_peak_sample: Option<u64>,
    sample_count: u64,
}

impl PpgPipeline {
    pub fn new(cfg: PpgDetectorConfig) -> Self {
        let warmup = cfg.warmup.min(cfg.window_len).max(cfg.trend_len * 2);
        let cfg = PpgDetectorConfig { warmup, ..cfg };
        Self {
            window: SlidingWindow::new(cfg.window_len.max(warmup)),
            ppi: PpiSeries::new(cfg.ppi_capacity),
            cfg,
            edge: false,
            threshold: None,
            peak_sample: None,
            prev_peak_sample: None,
            sample_count: 0,
        }
    }

    pub fn config(&self) -> &PpgDetectorConfig {
        &self.cfg
    }

    /// Pulls at most one sample. Returns `false` when the source had none.
    pub fn ingest(&mut self, source: &mut dyn SampleSource) -> bool {
        match source.next_sample() {
            Some(sample) => {
                self.push_sample(sample);
                true
            }
            None => false,
        }
    }

    pub fn push_sample(&mut self, sample: Sample) {
        self.window.push(sample);
        self.sample_count += 1;
    }

    pub fn is_warmed_up(&self) -> bool {
        self.window.len() >= self.cfg.warmup
    }

    /// Runs one detection pass over the current window. Returns the interval
    /// accepted on this pass, if any.
    pub fn detect(&mut self) -> Option<i32> {
        if !self.is_warmed_up() {
            return None;
        }
        let k = self.cfg.trend_len.max(1);
        let short = self.window.recent_mean(0, k)?;
        let previous = self.window.recent_mean(k, k)?;

        if self.threshold.is_none() {
            self.threshold = self.compute_threshold();
            // A pulse already above threshold at warm-up has no usable onset.
            if self.threshold.is_some_and(|t| short > t) {
                self.edge = true;
            }
            return None;
        }
        if self.sample_count % self.cfg.threshold_refresh.max(1) == 0 {
            self.threshold = self.compute_threshold();
        }
        let threshold = self.threshold?;

        if short > threshold && short >= previous && !self.edge {
            let now = self.sample_count;
            self.edge = true;
            self.peak_sample = Some(now);
            let interval = self
                .prev_peak_sample
                .map(|prev| self.samples_to_ms(now.saturating_sub(prev)));
            return match interval {
                Some(ms) if self.accept(ms) => Some(ms),
                _ => None,
            };
        }
        if short < threshold && self.edge {
            self.edge = false;
            self.prev_peak_sample = self.peak_sample;
        }
        None
    }

    /// Ingest followed by detection when a sample arrived.
    pub fn process(&mut self, source: &mut dyn SampleSource) -> Step {
        if !self.ingest(source) {
            return Step::default();
        }
        Step {
            sampled: true,
            accepted: self.detect(),
        }
    }

    /// Validates and stores an interval. Returns `true` when it was kept.
    pub fn accept(&mut self, interval_ms: i32) -> bool {
        if !is_valid_ppi(interval_ms) {
            log::trace!("rejected interval {} ms", interval_ms);
            return false;
        }
        self.ppi.push(interval_ms);
        true
    }

    pub fn ppi(&self) -> &PpiSeries {
        &self.ppi
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn in_edge(&self) -> bool {
        self.edge
    }

    fn compute_threshold(&self) -> Option<f64> {
        let (lo, hi) = self.window.range()?;
        let lo = lo as f64;
        Some(lo + self.cfg.threshold_scale * (hi as f64 - lo))
    }

    fn samples_to_ms(&self, samples: u64) -> i32 {
        let fs = self.cfg.fs_hz.max(1) as f64;
        (samples as f64 * 1000.0 / fs).round() as i32
    }
}

/// Result of running the detector over a whole recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpgDetection {
    pub fs_hz: u32,
    pub sample_count: usize,
    pub ppi: Vec<i32>,
}

/// Runs the streaming detector over a recorded sample sequence, keeping every
/// accepted interval regardless of the configured capacity.
pub fn detect_ppi(samples: &[Sample], cfg: &PpgDetectorConfig) -> PpgDetection {
    let mut pipeline = PpgPipeline::new(*cfg);
    let mut ppi = Vec::new();
    for &sample in samples {
        pipeline.push_sample(sample);
        if let Some(interval) = pipeline.detect() {
            ppi.push(interval);
        }
    }
    PpgDetection {
        fs_hz: cfg.fs_hz,
        sample_count: samples.len(),
        ppi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn synthetic_ppg(fs: f64, period_s: f64, duration_s: f64) -> Vec<Sample> {
        let samples = (duration_s * fs) as usize;
        let mut data = Vec::with_capacity(samples);
        for i in 0..samples {
            let t = i as f64 / fs;
            let phase = t % period_s;
            let width = 0.06;
            let systolic = (-0.5 * ((phase - 0.2) / width).powi(2)).exp();
            let dicrotic = 0.3 * (-0.5 * ((phase - 0.45) / (width * 1.5)).powi(2)).exp();
            let v = 30_000.0 + 9_000.0 * (systolic + dicrotic);
            data.push(v as Sample);
        }
        data
    }

    #[test]
    fn periodic_waveform_yields_matching_intervals() {
        let fs = 250.0;
        for period_ms in [600, 800, 1100] {
            let data = synthetic_ppg(fs, period_ms as f64 / 1000.0, 20.0);
            let result = detect_ppi(&data, &PpgDetectorConfig::default());
            assert!(
                result.ppi.len() >= 10,
                "too few intervals for {} ms: {:?}",
                period_ms,
                result.ppi
            );
            for ppi in &result.ppi {
                assert!(
                    (ppi - period_ms).abs() <= 8,
                    "interval {} too far from {}",
                    ppi,
                    period_ms
                );
            }
        }
    }

    #[test]
    fn streaming_ingest_matches_batch() {
        let data = synthetic_ppg(250.0, 0.75, 12.0);
        let mut source: VecDeque<Sample> = data.iter().copied().collect();
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default().with_ppi_capacity(50));
        let mut accepted = Vec::new();
        loop {
            let step = pipeline.process(&mut source);
            if !step.sampled {
                break;
            }
            accepted.extend(step.accepted);
        }
        let batch = detect_ppi(&data, &PpgDetectorConfig::default());
        assert_eq!(accepted, batch.ppi);
        assert_eq!(pipeline.ppi().to_vec(), batch.ppi);
        assert_eq!(pipeline.sample_count(), data.len() as u64);
    }

    #[test]
    fn empty_source_is_a_no_op() {
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default());
        let mut source: VecDeque<Sample> = VecDeque::new();
        assert_eq!(pipeline.process(&mut source), Step::default());
        assert_eq!(pipeline.sample_count(), 0);
    }

    #[test]
    fn flat_signal_produces_no_intervals() {
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default());
        for _ in 0..500 {
            pipeline.push_sample(31_000);
            assert_eq!(pipeline.detect(), None);
        }
        assert!(pipeline.ppi().is_empty());
        assert_eq!(pipeline.threshold(), Some(31_000.0));
        assert!(!pipeline.in_edge());
    }

    #[test]
    fn out_of_range_intervals_are_never_stored() {
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default());
        for interval in [0, -5, 250, 2000, 2500, 100_000] {
            assert!(!pipeline.accept(interval));
        }
        assert!(pipeline.ppi().is_empty());
        assert!(pipeline.accept(251));
        assert!(pipeline.accept(1999));
        assert_eq!(pipeline.ppi().to_vec(), vec![251, 1999]);
    }

    #[test]
    fn ppi_capacity_evicts_oldest() {
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default().with_ppi_capacity(3));
        for interval in [700, 710, 720, 730, 740] {
            pipeline.accept(interval);
        }
        assert_eq!(pipeline.ppi().to_vec(), vec![720, 730, 740]);
    }

    #[test]
    fn no_detection_before_warmup() {
        let data = synthetic_ppg(250.0, 0.8, 1.9);
        let mut pipeline = PpgPipeline::new(PpgDetectorConfig::default());
        for sample in data {
            pipeline.push_sample(sample);
            assert_eq!(pipeline.detect(), None);
        }
        assert!(pipeline.threshold().is_none());
    }
}
