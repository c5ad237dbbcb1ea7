use super::{Control, State, Timeout};
use crate::config::DeviceConfig;
use crate::display::{ScreenMode, PLOT_HEIGHT, PLOT_PARKED, SCREEN_WIDTH};
use crate::hardware::Hardware;
use crate::input::Input;
use pulse_lib::detectors::ppg::PpgPipeline;
use pulse_lib::io::record::{round_half_even, RemoteRequest};
use pulse_lib::metrics::hrv;
use pulse_lib::signal::Sample;

/// Samples between plot rescales; the rescale uses this many oldest samples.
const PLOT_RESCALE_EVERY: u64 = 250;
/// Every n-th sample is plotted.
const PLOT_DECIMATION: u64 = 5;

/// Maps raw samples onto plot rows, largest value at the top.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlotScaler {
    max: Sample,
    scale: f64,
}

impl PlotScaler {
    pub fn rescale(&mut self, range: Option<(Sample, Sample)>) {
        let Some((lo, hi)) = range else {
            return;
        };
        self.max = hi;
        self.scale = if hi > lo {
            f64::from(PLOT_HEIGHT) / f64::from(hi - lo)
        } else {
            0.0
        };
    }

    pub fn row(&self, sample: Sample) -> i32 {
        let y = ((f64::from(self.max) - f64::from(sample)) * self.scale).round() as i32;
        y.clamp(0, PLOT_HEIGHT - 1)
    }
}

/// Sampling, detection and plotting shared by the measuring states.
#[derive(Debug)]
pub struct Measurement {
    pipeline: PpgPipeline,
    plot: PlotScaler,
    x: i32,
    fresh: bool,
}

impl Measurement {
    pub fn new(config: &DeviceConfig, ppi_capacity: usize) -> Self {
        Self {
            pipeline: PpgPipeline::new(config.detector(ppi_capacity)),
            plot: PlotScaler::default(),
            x: 0,
            fresh: false,
        }
    }

    pub fn start(&mut self, hw: &mut Hardware) {
        hw.sampler.start(hw.config.sample_rate_hz);
    }

    /// Consumes at most one sample. Returns the interval accepted on it.
    pub fn measure(&mut self, hw: &mut Hardware) -> Option<i32> {
        let sample = hw.sampler.next_sample()?;
        self.pipeline.push_sample(sample);
        self.fresh = true;
        if self.pipeline.sample_count() % PLOT_RESCALE_EVERY == 0 {
            self.plot
                .rescale(self.pipeline.window().oldest_range(PLOT_RESCALE_EVERY as usize));
        }
        let accepted = self.pipeline.detect();
        if accepted.is_some() {
            hw.screen.mark_pulse();
        }
        accepted
    }

    /// Emits a plot point for every fifth fresh sample once warmed up.
    pub fn display(&mut self, hw: &Hardware) {
        let count = self.pipeline.sample_count();
        if !self.fresh || !self.pipeline.is_warmed_up() || count % PLOT_DECIMATION != 0 {
            return;
        }
        let Some(latest) = self.pipeline.window().latest() else {
            return;
        };
        hw.screen.plot_point(self.x, self.plot.row(latest));
        self.x = (self.x + 1) % SCREEN_WIDTH;
        self.fresh = false;
    }

    pub fn stop(&mut self, hw: &mut Hardware) {
        hw.sampler.stop();
    }

    /// Parks the plot and zeroes the readout so the next measuring screen
    /// starts clean.
    pub fn release(&mut self, hw: &mut Hardware) {
        self.stop(hw);
        hw.screen.plot_point(PLOT_PARKED.0, PLOT_PARKED.1);
        hw.screen.heart_rate(0);
    }

    pub fn ppi(&self) -> Vec<i32> {
        self.pipeline.ppi().to_vec()
    }

    pub fn sample_count(&self) -> u64 {
        self.pipeline.sample_count()
    }
}

/// Live heart rate from the latest intervals.
#[derive(Debug)]
pub struct MeasureHr {
    measurement: Measurement,
    bpm: u32,
}

impl MeasureHr {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            measurement: Measurement::new(config, config.live_ppi_capacity),
            bpm: 0,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }
}

impl Control for MeasureHr {
    fn enter(&mut self, hw: &mut Hardware) {
        hw.screen.set_mode(ScreenMode::Measure);
        self.bpm = 0;
        self.measurement.start(hw);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        if self.measurement.measure(hw).is_some() {
            if let Ok(hr) = hrv::mean_hr(&self.measurement.ppi()) {
                self.bpm = round_half_even(hr).max(0) as u32;
                hw.screen.heart_rate(self.bpm);
            }
        }
        self.measurement.display(hw);
        (input == Some(Input::Confirm)).then(State::menu)
    }

    fn exit(&mut self, hw: &mut Hardware) {
        self.measurement.release(hw);
    }
}

/// Collects intervals for a fixed window, then analyses them on the device.
#[derive(Debug)]
pub struct HrvAnalysis {
    measurement: Measurement,
    timeout: Timeout,
}

impl HrvAnalysis {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            measurement: Measurement::new(config, config.analysis_ppi_capacity),
            timeout: Timeout::new(config.analysis_ms),
        }
    }

    fn analyse(&self, hw: &Hardware) -> State {
        let ppi = self.measurement.ppi();
        match hrv::full_analysis(&ppi, hw.epoch_secs()) {
            Ok(record) => State::view_analysis(record),
            Err(err) => {
                log::warn!("local analysis of {} intervals failed: {}", ppi.len(), err);
                State::error(&["Bad Data"])
            }
        }
    }
}

impl Control for HrvAnalysis {
    fn enter(&mut self, hw: &mut Hardware) {
        self.timeout.arm(hw);
        hw.screen.set_mode(ScreenMode::Analysing);
        self.measurement.start(hw);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        self.measurement.measure(hw);
        self.measurement.display(hw);
        if input == Some(Input::Confirm) {
            Some(State::menu())
        } else if self.timeout.expired(hw) {
            self.measurement.stop(hw);
            Some(self.analyse(hw))
        } else {
            None
        }
    }

    fn exit(&mut self, hw: &mut Hardware) {
        self.measurement.release(hw);
    }
}

/// Collects intervals for a fixed window, then submits them for remote
/// analysis.
#[derive(Debug)]
pub struct Kubios {
    measurement: Measurement,
    timeout: Timeout,
}

impl Kubios {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            measurement: Measurement::new(config, config.analysis_ppi_capacity),
            timeout: Timeout::new(config.analysis_ms),
        }
    }

    fn submit(&self, hw: &mut Hardware) -> State {
        let ppi = match hrv::preprocess(&self.measurement.ppi(), hrv::DEFAULT_OUTLIER_PCT) {
            Ok(ppi) => ppi,
            Err(err) => {
                log::warn!("nothing to submit: {}", err);
                return State::error(&["Bad data"]);
            }
        };
        let request = RemoteRequest::readiness(hw.epoch_secs(), ppi);
        match hw.online.send_remote_request(&request) {
            Ok(()) => State::wait_kubios(),
            Err(err) => {
                log::warn!("analysis request not sent: {}", err);
                State::error(&["No connection"])
            }
        }
    }
}

impl Control for Kubios {
    fn enter(&mut self, hw: &mut Hardware) {
        self.timeout.arm(hw);
        hw.screen.set_mode(ScreenMode::Analysing);
        self.measurement.start(hw);
    }

    fn run(&mut self, hw: &mut Hardware, input: Option<Input>) -> Option<State> {
        self.measurement.measure(hw);
        self.measurement.display(hw);
        if !hw.online.is_connected() {
            Some(State::error(&["No connection"]))
        } else if input == Some(Input::Confirm) {
            Some(State::menu())
        } else if self.timeout.expired(hw) {
            self.measurement.stop(hw);
            Some(self.submit(hw))
        } else {
            None
        }
    }

    fn exit(&mut self, hw: &mut Hardware) {
        self.measurement.release(hw);
    }
}
