//! Interrupt-fed queues.
//!
//! Producers run in interrupt context (button/rotary edges, the sampling
//! timer) and may preempt each other; the single consumer is the control
//! loop. Storage is allocated once and every slot update is a lock-free CAS,
//! so producers never block or allocate.

use heapless::mpmc::MpMcQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Capacity of the input event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 64;
/// Capacity of the ADC sample queue between the timer interrupt and the loop.
pub const SAMPLE_QUEUE_CAPACITY: usize = 16;

/// Input events: pin ids for button presses, `+1`/`-1` for rotary turns.
pub type EventQueue = IsrQueue<i16, EVENT_QUEUE_CAPACITY>;
/// Samples pushed by the sampling timer interrupt.
pub type SampleQueue = IsrQueue<u16, SAMPLE_QUEUE_CAPACITY>;

/// Bounded FIFO with a drop-new overflow policy.
///
/// `N` must be a power of two.
pub struct IsrQueue<T, const N: usize> {
    slots: MpMcQueue<T, N>,
    pending: AtomicUsize,
    dropped: AtomicUsize,
}

impl<T, const N: usize> IsrQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: MpMcQueue::new(),
            pending: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Enqueues `value`. When the queue is full the value is discarded,
    /// existing entries are untouched and `false` is returned.
    pub fn push(&self, value: T) -> bool {
        // Count first so `pending` never drops below the number of stored items.
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.slots.enqueue(value) {
            Ok(()) => true,
            Err(_) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Oldest unread value, if any.
    pub fn pop(&self) -> Option<T> {
        let value = self.slots.dequeue()?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(value)
    }

    /// May briefly report `false` while a push is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    pub fn len_hint(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of values discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Discards everything currently queued.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while self.pop().is_some() {
            count += 1;
        }
        count
    }
}

impl<T, const N: usize> std::fmt::Debug for IsrQueue<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsrQueue")
            .field("capacity", &N)
            .field("pending", &self.len_hint())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<T, const N: usize> Default for IsrQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
