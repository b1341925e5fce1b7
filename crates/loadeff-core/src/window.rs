//! Bounded rolling windows and compensated summation.
//!
//! Every history the engine keeps is a [`RollingWindow`]: a FIFO with a fixed
//! capacity that evicts its oldest value on overflow. Statistics are computed
//! over the tail of the window and never fail. An empty window has mean 0 and
//! fewer than two values give a standard deviation of 0.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of `f64` samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` values (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent value.
    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Value `k` steps back from the newest (`nth_back(0) == last()`).
    pub fn nth_back(&self, k: usize) -> Option<f64> {
        let len = self.values.len();
        if k >= len {
            return None;
        }
        self.values.get(len - 1 - k).copied()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Iterate over the last `n` values (all of them if fewer), oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = f64> + '_ {
        let skip = self.values.len().saturating_sub(n);
        self.values.iter().skip(skip).copied()
    }

    /// Mean of the last `n` values; 0 for an empty window.
    pub fn mean(&self, n: usize) -> f64 {
        let count = n.min(self.values.len());
        if count == 0 {
            return 0.0;
        }
        self.tail(count).sum::<f64>() / count as f64
    }

    /// Population standard deviation of the last `n` values; 0 with fewer than
    /// two values available.
    pub fn stdev(&self, n: usize) -> f64 {
        let count = n.min(self.values.len());
        if count < 2 {
            return 0.0;
        }
        let mean = self.tail(count).sum::<f64>() / count as f64;
        let var = self.tail(count).map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;
        var.max(0.0).sqrt()
    }

    /// Upper median of the whole window.
    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        Some(sorted[sorted.len() / 2])
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Neumaier-compensated running sum.
///
/// Keeps the low-order bits lost by each addition in a separate term so that
/// millions of small increments do not drift.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}
