/*!
 * Engine Types
 * Configuration, samples, results, and errors for the allocation engine
 */

use crate::probe::HeapReading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine operation result
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid configuration: {field} out of range")]
    InvalidConfig { field: &'static str },

    #[error("test already running - stop it before starting a new run")]
    AlreadyRunning,

    #[error("allocation exhausted: host declined {requested} bytes after {allocated} bytes allocated")]
    AllocationExhausted { requested: u64, allocated: u64 },
}

/// Parameters for one test run
///
/// Immutable for the duration of a run; re-read at each `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Size of each allocation step in bytes
    pub chunk_size: u64,
    /// Stop the run once this many bytes have been retained
    pub target_limit: u64,
}

const MB: u64 = 1024 * 1024;

impl TestConfig {
    /// Build a config from operator-supplied megabyte values.
    ///
    /// Fails with `InvalidConfig` when a value overflows the byte counter.
    pub fn from_mb(chunk_mb: u64, target_mb: u64) -> EngineResult<Self> {
        let chunk_size = chunk_mb
            .checked_mul(MB)
            .ok_or(EngineError::InvalidConfig {
                field: "chunk_size",
            })?;
        let target_limit = target_mb
            .checked_mul(MB)
            .ok_or(EngineError::InvalidConfig {
                field: "target_limit",
            })?;
        Ok(Self {
            chunk_size,
            target_limit,
        })
    }

    pub(crate) fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfig {
                field: "chunk_size",
            });
        }
        if self.target_limit == 0 {
            return Err(EngineError::InvalidConfig {
                field: "target_limit",
            });
        }
        Ok(())
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100 * MB,
            target_limit: 4096 * MB,
        }
    }
}

/// One recorded observation of engine and host memory state
///
/// `host_heap_bytes` is `None` when the host probe is unavailable; consumers
/// must distinguish "no data" from zero usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_secs: f64,
    pub allocated_bytes: u64,
    pub host_heap_bytes: Option<u64>,
}

/// Finalized record of one run
///
/// Produced exactly once per run at stop time. `release` never touches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub completed: bool,
    pub total_allocated: u64,
    pub duration_ms: u64,
    /// Average allocation rate over the whole run, in bytes per second
    pub average_rate: f64,
}

/// Point-in-time view of engine state for the presentation sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub allocated_bytes: u64,
    pub rate_bytes_per_sec: f64,
    pub elapsed_ms: u64,
    /// Fraction of the target limit reached, clamped to 1.0
    pub progress_fraction: f64,
    pub host_heap: Option<HeapReading>,
    pub last_result: Option<TestResult>,
}
