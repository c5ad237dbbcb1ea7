//! Host-side board: a manual clock, a synthetic pulse sensor, interrupt
//! handlers driven by method calls and an in-process network.
//!
//! Every [`Simulation::step`] advances the clock by one sample period, lets
//! the sampling timer fire once and ticks the control loop once.

use crate::config::DeviceConfig;
use crate::display::{Frame, Screen};
use crate::hardware::{Hardware, Led};
use crate::input::{Button, Rotary, ROT_PUSH, SW0};
use crate::runner::PulseCheck;
use crate::sampler::{QueueSampler, SampleTimer};
use crate::states::{State, StateKind};
use pulse_lib::events::EventQueue;
use pulse_lib::io::history::{History, Storage};
use pulse_lib::signal::Sample;
use pulse_lib::time::{Clock, ManualClock};
use pulse_net::client::MessagingClient;
use pulse_net::config::LinkSettings;
use pulse_net::loopback::{LoopbackNetwork, Responder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Knobs of the simulated sensor and network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimOptions {
    /// RNG seed for jitter and noise.
    pub seed: u64,
    /// Mean beat-to-beat interval (ms).
    pub pulse_period_ms: f64,
    /// Each beat deviates from the mean by up to this much (ms).
    pub jitter_ms: f64,
    /// Peak amplitude of uniform sensor noise (ADC counts).
    pub noise: f64,
    /// Finger on the sensor. Without contact the signal is flat.
    pub contact: bool,
    /// Wall clock before the first time sync (s).
    pub start_epoch: i64,
    /// `link_up` polls answered "down" before the access point is joined.
    /// `None` keeps the link down.
    pub link_delay_polls: Option<u32>,
    /// UTC answered by the time service; `None` disables it.
    pub time_service_utc: Option<i64>,
    /// The analysis broker answers requests.
    pub analysis_service: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            seed: 1,
            pulse_period_ms: 800.0,
            jitter_ms: 0.0,
            noise: 0.0,
            contact: true,
            start_epoch: 1_600_000_000,
            link_delay_polls: Some(0),
            time_service_utc: Some(1_709_619_000),
            analysis_service: true,
        }
    }
}

const BASELINE: f64 = 30_000.0;
const AMPLITUDE: f64 = 9_000.0;
const PULSE_WIDTH_S: f64 = 0.06;

/// Synthetic fingertip PPG: a systolic peak with a smaller dicrotic wave per
/// beat on a constant baseline.
#[derive(Debug)]
pub struct PpgSynth {
    fs: f64,
    period_ms: f64,
    jitter_ms: f64,
    noise: f64,
    contact: bool,
    rng: StdRng,
    phase_s: f64,
    beat_s: f64,
}

impl PpgSynth {
    pub fn new(fs_hz: u32, options: &SimOptions) -> Self {
        let mut synth = Self {
            fs: f64::from(fs_hz.max(1)),
            period_ms: options.pulse_period_ms,
            jitter_ms: options.jitter_ms.abs(),
            noise: options.noise.abs(),
            contact: options.contact,
            rng: StdRng::seed_from_u64(options.seed),
            phase_s: 0.0,
            beat_s: 0.0,
        };
        synth.beat_s = synth.draw_beat();
        synth
    }

    fn draw_beat(&mut self) -> f64 {
        let jitter = if self.jitter_ms > 0.0 {
            self.rng.gen_range(-self.jitter_ms..=self.jitter_ms)
        } else {
            0.0
        };
        ((self.period_ms + jitter) / 1000.0).max(0.25)
    }

    pub fn next_sample(&mut self) -> Sample {
        let phase = self.phase_s;
        self.phase_s += 1.0 / self.fs;
        if self.phase_s >= self.beat_s {
            self.phase_s -= self.beat_s;
            self.beat_s = self.draw_beat();
        }

        let mut v = BASELINE;
        if self.contact {
            let systolic = (-0.5 * ((phase - 0.2) / PULSE_WIDTH_S).powi(2)).exp();
            let dicrotic = 0.3 * (-0.5 * ((phase - 0.45) / (PULSE_WIDTH_S * 1.5)).powi(2)).exp();
            v += AMPLITUDE * (systolic + dicrotic);
        }
        if self.noise > 0.0 {
            v += self.rng.gen_range(-self.noise..=self.noise);
        }
        v.clamp(0.0, f64::from(Sample::MAX)) as Sample
    }
}

#[derive(Debug, Clone, Default)]
struct SimLed {
    on: Arc<AtomicBool>,
}

impl Led for SimLed {
    fn set(&mut self, on: bool) {
        self.on.store(on, Ordering::Release);
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}

/// Interrupt sources and observation points of the simulated device.
#[derive(Debug)]
pub struct SimBoard {
    pub clock: ManualClock,
    pub events: Arc<EventQueue>,
    pub timer: SampleTimer,
    pub rot_push: Button,
    pub sw0: Button,
    pub rotary: Rotary,
    pub network: LoopbackNetwork,
    pub screen: Screen,
    led: SimLed,
    synth: PpgSynth,
    tick_ms: u64,
}

impl SimBoard {
    /// Wires a board and the [`Hardware`] the control loop owns.
    pub fn build(
        config: DeviceConfig,
        settings: LinkSettings,
        storage: Box<dyn Storage>,
        options: &SimOptions,
    ) -> (Self, Hardware) {
        let clock = ManualClock::new(options.start_epoch);
        let events = Arc::new(EventQueue::new());
        let (sampler, timer) = QueueSampler::new();
        let rotary = Rotary::new(Arc::clone(&events));
        let screen = Screen::new();
        let led = SimLed::default();

        let mut network = LoopbackNetwork::new().with_responder(if options.analysis_service {
            Responder::Analysis
        } else {
            Responder::Silent
        });
        match options.link_delay_polls {
            Some(polls) => network = network.with_link_delay(polls),
            None => network.set_link_down(true),
        }
        if let Some(utc) = options.time_service_utc {
            network = network.with_time(utc);
        }

        let board = Self {
            clock: clock.clone(),
            rot_push: Button::new(ROT_PUSH, config.debounce_ms, Arc::clone(&events)),
            sw0: Button::new(SW0, config.debounce_ms, Arc::clone(&events)),
            events: Arc::clone(&events),
            timer,
            rotary: rotary.clone(),
            network: network.clone(),
            screen: screen.clone(),
            led: led.clone(),
            synth: PpgSynth::new(config.sample_rate_hz, options),
            tick_ms: config.sample_period_ms(),
        };
        let hw = Hardware {
            history: History::new(storage, config.history_capacity),
            config,
            clock: Arc::new(clock),
            screen,
            events,
            rotary,
            sampler: Box::new(sampler),
            led: Box::new(led),
            online: MessagingClient::new(settings, Box::new(network)),
        };
        (board, hw)
    }

    /// Advances time by one sample period and fires the sampling timer.
    pub fn tick(&mut self) {
        self.clock.advance(self.tick_ms);
        let sample = self.synth.next_sample();
        if self.timer.is_running() {
            self.timer.fire(sample);
        }
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.ticks_ms()
    }

    pub fn led_on(&self) -> bool {
        self.led.is_on()
    }
}

/// A state change observed by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub at_ms: u64,
    pub from: StateKind,
    pub to: StateKind,
}

/// Board plus control loop, stepped in lockstep.
pub struct Simulation {
    board: SimBoard,
    machine: PulseCheck,
    transitions: Vec<Transition>,
}

impl Simulation {
    /// Boots into the splash screen.
    pub fn new(
        config: DeviceConfig,
        settings: LinkSettings,
        storage: Box<dyn Storage>,
        options: &SimOptions,
    ) -> Self {
        Self::starting_in(State::splash(), config, settings, storage, options)
    }

    pub fn starting_in(
        initial: State,
        config: DeviceConfig,
        settings: LinkSettings,
        storage: Box<dyn Storage>,
        options: &SimOptions,
    ) -> Self {
        let (board, hw) = SimBoard::build(config, settings, storage, options);
        Self {
            board,
            machine: PulseCheck::new(hw, initial),
            transitions: Vec::new(),
        }
    }

    pub fn step(&mut self) -> StateKind {
        self.board.tick();
        let from = self.machine.kind();
        let to = self.machine.tick();
        if from != to {
            self.transitions.push(Transition {
                at_ms: self.board.now_ms(),
                from,
                to,
            });
        }
        to
    }

    /// Steps for at least `ms` of simulated time.
    pub fn run_for(&mut self, ms: u64) -> StateKind {
        let until = self.board.now_ms() + ms;
        while self.board.now_ms() < until {
            self.step();
        }
        self.kind()
    }

    /// Steps until `kind` is live. Gives up after `max_ms` of simulated time.
    pub fn run_until(&mut self, kind: StateKind, max_ms: u64) -> bool {
        let until = self.board.now_ms() + max_ms;
        while self.kind() != kind {
            if self.board.now_ms() >= until {
                return false;
            }
            self.step();
        }
        true
    }

    /// Rotary push. Returns `false` when debounced or the queue was full.
    pub fn press_confirm(&mut self) -> bool {
        self.board.rot_push.on_press(self.board.now_ms())
    }

    pub fn press_reconnect(&mut self) -> bool {
        self.board.sw0.on_press(self.board.now_ms())
    }

    /// One rotary detent; positive is clockwise.
    pub fn turn(&mut self, dir: i8) -> bool {
        self.board.rotary.on_edge(dir > 0)
    }

    pub fn kind(&self) -> StateKind {
        self.machine.kind()
    }

    pub fn now_ms(&self) -> u64 {
        self.board.now_ms()
    }

    /// Current draw intents, leaving the one-shot flags for the renderer.
    pub fn frame(&self) -> Frame {
        self.board.screen.peek()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn board(&self) -> &SimBoard {
        &self.board
    }

    pub fn machine(&self) -> &PulseCheck {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut PulseCheck {
        &mut self.machine
    }
}
