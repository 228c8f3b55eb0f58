/*!
 * History Buffer
 * Bounded rolling sequence of samples that drives the live graph
 */

use super::types::Sample;
use std::collections::VecDeque;

/// Maximum samples retained for the graph
pub const HISTORY_CAPACITY: usize = 200;

/// Insertion-ordered, capacity-bounded sample buffer.
///
/// Oldest samples are evicted first once the capacity is exceeded; one
/// eviction per insertion keeps the length at the bound.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest entry at capacity.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Most recently recorded sample, if any.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
