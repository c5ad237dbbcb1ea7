use crate::config::DeviceConfig;
use crate::display::Screen;
use crate::input::{Input, Rotary};
use crate::sampler::Sampler;
use pulse_lib::events::EventQueue;
use pulse_lib::io::history::History;
use pulse_lib::time::Clock;
use pulse_net::client::MessagingClient;
use std::sync::Arc;
use std::time::Duration;

/// Status indicator.
pub trait Led: Send {
    fn set(&mut self, on: bool);
    fn is_on(&self) -> bool;
}

/// Everything the control states act on, owned by the runner and lent to
/// the live state on each call.
pub struct Hardware {
    pub config: DeviceConfig,
    pub clock: Arc<dyn Clock>,
    pub screen: Screen,
    pub events: Arc<EventQueue>,
    pub rotary: Rotary,
    pub sampler: Box<dyn Sampler>,
    pub led: Box<dyn Led>,
    pub history: History,
    pub online: MessagingClient,
}

impl Hardware {
    /// Pops at most one queued event. Unknown codes are consumed and dropped.
    pub fn next_input(&self) -> Option<Input> {
        let code = self.events.pop()?;
        let input = Input::from_code(code);
        if input.is_none() {
            log::warn!("ignoring unknown event code {}", code);
        }
        input
    }

    /// How long the control loop may wait before its next tick: `None` while
    /// events or samples are queued, otherwise `period`, shortened to half a
    /// sample period while the sampler runs so the sample queue cannot fill.
    pub fn backoff(&self, period: Duration) -> Option<Duration> {
        if !self.events.is_empty() || self.sampler.pending() {
            return None;
        }
        if self.sampler.is_running() {
            let half_sample =
                Duration::from_micros(500_000 / u64::from(self.config.sample_rate_hz.max(1)));
            return Some(period.min(half_sample));
        }
        Some(period)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.ticks_ms()
    }

    pub fn epoch_secs(&self) -> i64 {
        self.clock.epoch_secs()
    }
}
