/*!
 * Presentation Sink
 * Narrow interface through which the engine feeds whatever renders it
 *
 * The engine treats presentation as a black box: it hands over stats
 * snapshots and time-series points and never waits on the result.
 */

use crate::engine::{Sample, StatsSnapshot};
use crate::format::{format_bytes, format_duration, format_rate};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Receiver of engine snapshots and graph points
pub trait PresentationSink: Send + Sync {
    /// Render current stats.
    fn render_stats(&self, snapshot: &StatsSnapshot);

    /// Append one point to the live chart.
    fn append_point(&self, sample: &Sample);
}

/// Sink that renders through structured tracing events.
pub struct LogSink;

impl PresentationSink for LogSink {
    fn render_stats(&self, snapshot: &StatsSnapshot) {
        debug!(
            allocated = %format_bytes(snapshot.allocated_bytes),
            rate = %format_rate(snapshot.rate_bytes_per_sec),
            elapsed = %format_duration(snapshot.elapsed_ms),
            progress_pct = snapshot.progress_fraction * 100.0,
            "stress stats"
        );
    }

    fn append_point(&self, sample: &Sample) {
        trace!(
            elapsed_secs = sample.elapsed_secs,
            allocated_bytes = sample.allocated_bytes,
            host_heap_bytes = ?sample.host_heap_bytes,
            "graph point"
        );
    }
}

/// Sink that captures everything it receives, for tests and headless use.
#[derive(Default)]
pub struct RecordingSink {
    stats: Mutex<Vec<StatsSnapshot>>,
    points: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Vec<StatsSnapshot> {
        self.stats.lock().clone()
    }

    pub fn points(&self) -> Vec<Sample> {
        self.points.lock().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn render_stats(&self, snapshot: &StatsSnapshot) {
        self.stats.lock().push(snapshot.clone());
    }

    fn append_point(&self, sample: &Sample) {
        self.points.lock().push(sample.clone());
    }
}
