use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Raw ADC reading, one per tick of the sampling timer.
pub type Sample = u16;

/// Shortest pulse-to-pulse interval accepted, exclusive (ms).
pub const PPI_MIN_MS: i32 = 250;
/// Longest pulse-to-pulse interval accepted, exclusive (ms).
pub const PPI_MAX_MS: i32 = 2000;

pub fn is_valid_ppi(ppi_ms: i32) -> bool {
    PPI_MIN_MS < ppi_ms && ppi_ms < PPI_MAX_MS
}

/// Anything that can hand out at most one pending sample without blocking.
pub trait SampleSource {
    fn next_sample(&mut self) -> Option<Sample>;
}

impl SampleSource for VecDeque<Sample> {
    fn next_sample(&mut self) -> Option<Sample> {
        self.pop_front()
    }
}

/// Fixed-capacity FIFO of the most recent samples.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    data: VecDeque<Sample>,
    sum: u64,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
            sum: 0,
        }
    }

    /// Appends a sample, returning the evicted one once the window is full.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.data.len() == self.capacity {
            let old = self.data.pop_front();
            if let Some(old) = old {
                self.sum -= old as u64;
            }
            old
        } else {
            None
        };
        self.data.push_back(sample);
        self.sum += sample as u64;
        evicted
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<Sample> {
        self.data.back().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.sum as f64 / self.data.len() as f64)
        }
    }

    /// `(min, max)` over the whole window.
    pub fn range(&self) -> Option<(Sample, Sample)> {
        range_of(self.data.iter().copied())
    }

    /// `(min, max)` over the oldest `n` samples.
    pub fn oldest_range(&self, n: usize) -> Option<(Sample, Sample)> {
        range_of(self.data.iter().take(n).copied())
    }

    /// Mean of `len` samples ending `skip` samples before the newest one.
    pub fn recent_mean(&self, skip: usize, len: usize) -> Option<f64> {
        if len == 0 || skip + len > self.data.len() {
            return None;
        }
        let total: u64 = self
            .data
            .iter()
            .rev()
            .skip(skip)
            .take(len)
            .map(|&s| s as u64)
            .sum();
        Some(total as f64 / len as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.data.iter()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.sum = 0;
    }
}

fn range_of(iter: impl Iterator<Item = Sample>) -> Option<(Sample, Sample)> {
    iter.fold(None, |acc, s| match acc {
        None => Some((s, s)),
        Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
    })
}

/// Bounded sequence of pulse-to-pulse intervals (ms), oldest evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpiSeries {
    capacity: usize,
    ppi: VecDeque<i32>,
}

impl PpiSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ppi: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn push(&mut self, ppi_ms: i32) {
        self.ppi.push_back(ppi_ms);
        while self.ppi.len() > self.capacity {
            self.ppi.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.ppi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ppi.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.ppi.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.ppi.clear();
    }
}
