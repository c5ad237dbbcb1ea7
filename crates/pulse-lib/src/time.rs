use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic millisecond ticks plus a settable wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn ticks_ms(&self) -> u64;
    /// Local wall-clock time in seconds since the Unix epoch.
    fn epoch_secs(&self) -> i64;
    /// Re-anchors the wall clock, e.g. after a time-server sync.
    fn set_epoch(&self, secs: i64);

    fn elapsed_since(&self, start_ms: u64) -> u64 {
        self.ticks_ms().saturating_sub(start_ms)
    }
}

/// Host clock: `Instant` for ticks, `SystemTime` plus a sync offset for wall time.
pub struct SystemClock {
    origin: Instant,
    offset_secs: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_secs: AtomicI64::new(0),
        }
    }

    fn system_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn ticks_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn epoch_secs(&self) -> i64 {
        Self::system_secs() + self.offset_secs.load(Ordering::Relaxed)
    }

    fn set_epoch(&self, secs: i64) {
        self.offset_secs
            .store(secs - Self::system_secs(), Ordering::Relaxed);
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
    epoch_base: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(epoch_secs: i64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            epoch_base: Arc::new(AtomicI64::new(epoch_secs)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.ticks.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn ticks_ms(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn epoch_secs(&self) -> i64 {
        self.epoch_base.load(Ordering::Acquire) + (self.ticks_ms() / 1000) as i64
    }

    fn set_epoch(&self, secs: i64) {
        let elapsed = (self.ticks_ms() / 1000) as i64;
        self.epoch_base.store(secs - elapsed, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_ticks_and_wall_time() {
        let clock = ManualClock::new(1_700_000_000);
        clock.advance(2500);
        assert_eq!(clock.ticks_ms(), 2500);
        assert_eq!(clock.epoch_secs(), 1_700_000_002);
        assert_eq!(clock.elapsed_since(1000), 1500);
        assert_eq!(clock.elapsed_since(9000), 0);
    }

    #[test]
    fn set_epoch_keeps_ticks() {
        let clock = ManualClock::new(0);
        clock.advance(3000);
        clock.set_epoch(1_000);
        assert_eq!(clock.epoch_secs(), 1_000);
        assert_eq!(clock.ticks_ms(), 3000);
        clock.advance(1000);
        assert_eq!(clock.epoch_secs(), 1_001);
    }

    #[test]
    fn system_clock_applies_sync_offset() {
        let clock = SystemClock::new();
        clock.set_epoch(42);
        assert!((clock.epoch_secs() - 42).abs() <= 1);
    }
}
