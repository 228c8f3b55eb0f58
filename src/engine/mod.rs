/*!
 * Allocation Engine
 *
 * State machine that drives timed allocation steps toward a configured
 * target, accumulates usage totals, detects the out-of-memory condition,
 * and feeds a bounded rolling history buffer for visualization.
 *
 * ## Model
 *
 * - One mutable state instance behind a single mutex; every mutation goes
 *   through an engine method that holds the lock for the whole step.
 * - Two independently scheduled 100ms loops (allocation, sampling) run on
 *   one background task; their relative order within a wall-clock tick is
 *   unspecified and both tolerate observing the other mid-sequence.
 * - Allocation failure is the test's designed success criterion: the host
 *   declining a chunk ends the run cleanly with `completed = false`.
 */

mod chunk;
mod history;
mod task;
mod ticks;
mod types;

pub use chunk::{AllocationDenied, ChunkSource, HeapChunkSource, MemoryChunk};
pub use history::{HistoryBuffer, HISTORY_CAPACITY};
pub use task::TickerTask;
pub use types::{EngineError, EngineResult, Sample, StatsSnapshot, TestConfig, TestResult};

use crate::probe::{self, HostMemoryProbe};
use crate::sink::PresentationSink;
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cadence of the allocation loop
pub const ALLOCATION_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Cadence of the graph-sampling loop, deliberately decoupled from the
/// allocation cadence so graph resolution stays stable when the host
/// throttles allocation
pub const SAMPLING_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Minimum window over which the instantaneous rate is recomputed
pub(super) const RATE_WINDOW: Duration = Duration::from_millis(500);

/// Mutable test state, one instance per engine
pub(crate) struct EngineState {
    pub(crate) running: bool,
    pub(crate) config: TestConfig,
    pub(crate) started_at: Option<Instant>,
    pub(crate) allocated_bytes: u64,
    pub(crate) chunks: Vec<MemoryChunk>,
    pub(crate) last_rate_at: Option<Instant>,
    pub(crate) last_rate_bytes: u64,
    pub(crate) rate_bytes_per_sec: f64,
    pub(crate) history: HistoryBuffer,
    pub(crate) last_result: Option<TestResult>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            running: false,
            config: TestConfig::default(),
            started_at: None,
            allocated_bytes: 0,
            chunks: Vec::new(),
            last_rate_at: None,
            last_rate_bytes: 0,
            rate_bytes_per_sec: 0.0,
            history: HistoryBuffer::new(),
            last_result: None,
        }
    }
}

/// Allocation engine
pub struct StressEngine {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) source: Arc<dyn ChunkSource>,
    pub(crate) probe: Arc<dyn HostMemoryProbe>,
    pub(crate) sink: Option<Arc<dyn PresentationSink>>,
    ticker: Mutex<Option<TickerTask>>,
}

impl StressEngine {
    /// Engine backed by the process heap, with the probe detected for this
    /// platform.
    pub fn new() -> Self {
        Self::with_source(Arc::new(HeapChunkSource))
    }

    /// Engine with a custom chunk source.
    pub fn with_source(source: Arc<dyn ChunkSource>) -> Self {
        Self {
            state: Mutex::new(EngineState::new()),
            source,
            probe: probe::detect(),
            sink: None,
            ticker: Mutex::new(None),
        }
    }

    /// Replace the host memory probe.
    pub fn with_probe(mut self, probe: Arc<dyn HostMemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Attach a presentation sink.
    pub fn with_sink(mut self, sink: Arc<dyn PresentationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Begin a run: reset state, mark running, and schedule the two
    /// periodic loops.
    ///
    /// Fails with `InvalidConfig` before any state mutation, and with
    /// `AlreadyRunning` if a run is in flight.
    pub fn start(self: &Arc<Self>, config: TestConfig) -> EngineResult<()> {
        config.validate()?;

        {
            let mut state = self.state.lock();
            if state.running {
                return Err(EngineError::AlreadyRunning);
            }

            let now = Instant::now();
            state.config = config;
            state.running = true;
            state.started_at = Some(now);
            state.allocated_bytes = 0;
            state.chunks = Vec::new();
            state.last_rate_at = Some(now);
            state.last_rate_bytes = 0;
            state.rate_bytes_per_sec = 0.0;
            state.history.clear();
            state.last_result = None;
        }

        info!(
            "Memory test started: {} byte chunks toward {} byte target",
            config.chunk_size, config.target_limit
        );

        let ticker = TickerTask::spawn(Arc::clone(self));
        if let Some(old) = self.ticker.lock().replace(ticker) {
            old.cancel();
        }

        Ok(())
    }

    /// Stop the run and finalize its result record.
    ///
    /// Idempotent: when already stopped this returns the prior result and
    /// mutates nothing. The `running` flag is cleared under the state lock,
    /// so no late tick can mutate state after this returns; the tick loops
    /// are cancelled as well.
    pub fn stop(&self, completed: bool) -> Option<TestResult> {
        let result = {
            let mut state = self.state.lock();
            if !state.running {
                return state.last_result.clone();
            }
            self.finish_locked(&mut state, completed)
        };

        if let Some(ticker) = self.ticker.lock().take() {
            ticker.cancel();
        }

        Some(result)
    }

    /// Drop every retained chunk and zero the allocation counter.
    ///
    /// The prior result record and sample history are left untouched.
    /// Release makes the memory eligible for reclamation; the runtime owns
    /// the timing.
    pub fn release(&self) {
        let mut state = self.state.lock();
        let released = state.allocated_bytes;
        state.chunks.clear();
        state.allocated_bytes = 0;
        // The rate window restarts from the emptied counter, so a release
        // during a run never leaves the window anchored above it
        state.last_rate_at = Some(Instant::now());
        state.last_rate_bytes = 0;
        info!("Released {} bytes back to the runtime", released);
    }

    /// Point-in-time stats for presentation.
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated_bytes
    }

    /// Number of chunks currently retained.
    pub fn retained_chunks(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Result record of the most recently finished run.
    pub fn last_result(&self) -> Option<TestResult> {
        self.state.lock().last_result.clone()
    }

    /// Copy of the rolling sample history.
    pub fn history(&self) -> Vec<Sample> {
        self.state.lock().history.iter().cloned().collect()
    }
}

impl Default for StressEngine {
    fn default() -> Self {
        Self::new()
    }
}
