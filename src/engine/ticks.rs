/*!
 * Engine Ticks
 * The two periodic mutations: allocation steps and graph sampling
 */

use super::types::{EngineError, Sample, TestResult};
use super::{EngineState, StressEngine, RATE_WINDOW};
use log::{info, warn};
use std::time::Instant;

impl StressEngine {
    /// One allocation step: materialize a chunk, account for it, refresh
    /// the instantaneous rate, and detect completion or exhaustion.
    ///
    /// No-op when the engine is not running, so a tick that fires late
    /// cannot mutate a stopped run.
    pub fn allocation_tick(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }

        let chunk_size = state.config.chunk_size;
        match self.source.materialize(chunk_size) {
            Ok(chunk) => {
                state.chunks.push(chunk);
                state.allocated_bytes += chunk_size;
                self.update_rate(&mut state);

                if state.allocated_bytes >= state.config.target_limit {
                    info!(
                        "Target limit reached: {} bytes allocated",
                        state.allocated_bytes
                    );
                    self.finish_locked(&mut state, true);
                }
            }
            Err(denied) => {
                let error = EngineError::AllocationExhausted {
                    requested: chunk_size,
                    allocated: state.allocated_bytes,
                };
                warn!(
                    "RAM limit hit after {} bytes: {} ({})",
                    state.allocated_bytes, denied, error
                );
                self.finish_locked(&mut state, false);
            }
        }
    }

    /// One sampling step: record a point of engine and host state into the
    /// history buffer and forward it to the sink.
    ///
    /// No-op when the engine is not running. Runs on its own cadence,
    /// independent of the allocation loop.
    pub fn sampling_tick(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        self.record_sample(&mut state);

        if let Some(ref sink) = self.sink {
            sink.render_stats(&self.snapshot_locked(&state));
        }
    }

    /// Recompute the instantaneous rate once at least `RATE_WINDOW` has
    /// passed since the last rate sample; otherwise the rate is unchanged.
    fn update_rate(&self, state: &mut EngineState) {
        let Some(last_at) = state.last_rate_at else {
            return;
        };
        let elapsed = last_at.elapsed();
        if elapsed < RATE_WINDOW {
            return;
        }

        let delta = state.allocated_bytes.saturating_sub(state.last_rate_bytes);
        state.rate_bytes_per_sec = delta as f64 / elapsed.as_secs_f64();
        state.last_rate_at = Some(Instant::now());
        state.last_rate_bytes = state.allocated_bytes;
    }

    /// Record one sample into the history buffer and the sink.
    fn record_sample(&self, state: &mut EngineState) {
        let elapsed_secs = state
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let sample = Sample {
            elapsed_secs,
            allocated_bytes: state.allocated_bytes,
            host_heap_bytes: self.probe.read().map(|r| r.used_bytes),
        };

        state.history.push(sample.clone());
        if let Some(ref sink) = self.sink {
            sink.append_point(&sample);
        }
    }

    /// Finalize the run under an already-held state lock.
    ///
    /// Clears `running`, takes the forced final sample so the graph's last
    /// point reflects the true end state, and stores the result record.
    pub(super) fn finish_locked(&self, state: &mut EngineState, completed: bool) -> TestResult {
        state.running = false;

        let duration = state
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let duration_ms = duration.as_millis() as u64;

        // Final forced sample, bypassing the running guard
        self.record_sample(state);

        let average_rate = if duration_ms > 0 {
            state.allocated_bytes as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        let result = TestResult {
            completed,
            total_allocated: state.allocated_bytes,
            duration_ms,
            average_rate,
        };
        state.last_result = Some(result.clone());

        if completed {
            info!(
                "Memory test completed: {} bytes in {}ms",
                result.total_allocated, result.duration_ms
            );
        } else {
            warn!(
                "Memory test stopped without reaching target: {} bytes in {}ms",
                result.total_allocated, result.duration_ms
            );
        }

        if let Some(ref sink) = self.sink {
            sink.render_stats(&self.snapshot_locked(state));
        }

        result
    }

    /// Snapshot built from an already-held state lock.
    pub(super) fn snapshot_locked(&self, state: &EngineState) -> super::StatsSnapshot {
        // A stopped run reports its finalized duration, not a live clock
        let elapsed_ms = if state.running {
            state
                .started_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
        } else {
            state
                .last_result
                .as_ref()
                .map(|r| r.duration_ms)
                .unwrap_or(0)
        };
        let progress_fraction = if state.config.target_limit > 0 {
            (state.allocated_bytes as f64 / state.config.target_limit as f64).min(1.0)
        } else {
            0.0
        };

        super::StatsSnapshot {
            allocated_bytes: state.allocated_bytes,
            rate_bytes_per_sec: state.rate_bytes_per_sec,
            elapsed_ms,
            progress_fraction,
            host_heap: self.probe.read(),
            last_result: state.last_result.clone(),
        }
    }
}
