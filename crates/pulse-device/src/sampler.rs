use pulse_lib::events::SampleQueue;
use pulse_lib::signal::Sample;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Periodic ADC sampling.
pub trait Sampler: Send {
    fn start(&mut self, rate_hz: u32);
    /// Stops the timer and discards samples not yet read.
    fn stop(&mut self);
    /// Oldest unread sample, never blocks.
    fn next_sample(&mut self) -> Option<Sample>;
    /// Samples are queued and not yet read.
    fn pending(&self) -> bool;
    fn is_running(&self) -> bool;
}

#[derive(Debug, Default)]
struct TimerShared {
    queue: SampleQueue,
    running: AtomicBool,
    rate_hz: AtomicU32,
}

/// Interrupt side of [`QueueSampler`]: the timer handler pushes one ADC
/// reading per tick.
#[derive(Debug, Clone)]
pub struct SampleTimer {
    shared: Arc<TimerShared>,
}

impl SampleTimer {
    /// Timer tick. Returns `false` when stopped or the queue was full.
    pub fn fire(&self, sample: Sample) -> bool {
        self.shared.running.load(Ordering::Acquire) && self.shared.queue.push(sample)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn rate_hz(&self) -> u32 {
        self.shared.rate_hz.load(Ordering::Acquire)
    }

    /// Samples lost to a full queue so far.
    pub fn dropped(&self) -> usize {
        self.shared.queue.dropped()
    }
}

/// Control-loop side: reads what the timer interrupt queued.
#[derive(Debug)]
pub struct QueueSampler {
    shared: Arc<TimerShared>,
}

impl QueueSampler {
    pub fn new() -> (Self, SampleTimer) {
        let shared = Arc::new(TimerShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SampleTimer { shared },
        )
    }
}

impl Sampler for QueueSampler {
    fn start(&mut self, rate_hz: u32) {
        self.shared.queue.drain();
        self.shared.rate_hz.store(rate_hz, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);
        log::debug!("sampling timer started at {} Hz", rate_hz);
    }

    fn stop(&mut self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            log::debug!("sampling timer stopped");
        }
        self.shared.queue.drain();
    }

    fn next_sample(&mut self) -> Option<Sample> {
        self.shared.queue.pop()
    }

    fn pending(&self) -> bool {
        !self.shared.queue.is_empty()
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}
