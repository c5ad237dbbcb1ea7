use pulse_lib::events::EventQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Rotary encoder push button pin; also its event code.
pub const ROT_PUSH: i16 = 12;
/// Auxiliary switch pin; also its event code.
pub const SW0: i16 = 7;

/// A decoded event-queue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Rotary push.
    Confirm,
    /// SW0: reconnect request.
    Reconnect,
    /// One rotary detent, +1 or -1.
    Turn(i8),
}

impl Input {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            ROT_PUSH => Some(Input::Confirm),
            SW0 => Some(Input::Reconnect),
            1 => Some(Input::Turn(1)),
            -1 => Some(Input::Turn(-1)),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Input::Confirm => ROT_PUSH,
            Input::Reconnect => SW0,
            Input::Turn(dir) => i16::from(dir.signum()),
        }
    }
}

const NO_EDGE: u64 = u64::MAX;

/// Accepts an edge only if the previous edge, accepted or not, is more than
/// `interval_ms` old.
#[derive(Debug)]
pub struct Debouncer {
    interval_ms: u64,
    last_edge: AtomicU64,
}

impl Debouncer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_edge: AtomicU64::new(NO_EDGE),
        }
    }

    pub fn accept(&self, now_ms: u64) -> bool {
        let last = self.last_edge.swap(now_ms, Ordering::AcqRel);
        last == NO_EDGE || now_ms.saturating_sub(last) > self.interval_ms
    }
}

/// Push button interrupt handler.
#[derive(Debug, Clone)]
pub struct Button {
    pin: i16,
    debouncer: Arc<Debouncer>,
    events: Arc<EventQueue>,
}

impl Button {
    pub fn new(pin: i16, debounce_ms: u64, events: Arc<EventQueue>) -> Self {
        Self {
            pin,
            debouncer: Arc::new(Debouncer::new(debounce_ms)),
            events,
        }
    }

    pub fn pin(&self) -> i16 {
        self.pin
    }

    /// Falling-edge handler. Returns `true` when a press was queued.
    pub fn on_press(&self, now_ms: u64) -> bool {
        self.debouncer.accept(now_ms) && self.events.push(self.pin)
    }
}

/// Rotary encoder interrupt handler with an enable gate.
#[derive(Debug, Clone)]
pub struct Rotary {
    enabled: Arc<AtomicBool>,
    events: Arc<EventQueue>,
}

impl Rotary {
    pub fn new(events: Arc<EventQueue>) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            events,
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Clock-pin falling edge. `signal_high` is the second encoder pin level:
    /// high means clockwise (+1).
    pub fn on_edge(&self, signal_high: bool) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.events.push(if signal_high { 1 } else { -1 })
    }
}
