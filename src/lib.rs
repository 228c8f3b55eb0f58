/*!
 * memstress Library
 * Allocation-and-measurement core for the interactive memory diagnostic
 */

pub mod engine;
pub mod format;
pub mod probe;
pub mod sink;
pub mod telemetry;

// Re-exports
pub use engine::{
    AllocationDenied, ChunkSource, EngineError, EngineResult, HeapChunkSource, HistoryBuffer,
    MemoryChunk, Sample, StatsSnapshot, StressEngine, TestConfig, TestResult, HISTORY_CAPACITY,
};
pub use format::{format_bytes, format_duration, format_rate};
pub use probe::{HeapReading, HostMemoryProbe, SysinfoProbe, UnavailableProbe};
pub use sink::{LogSink, PresentationSink, RecordingSink};
pub use telemetry::init_tracing;
