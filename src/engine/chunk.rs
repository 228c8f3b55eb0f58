/*!
 * Memory Chunks
 * Opaque retained byte blocks and the fallible source that materializes them
 */

use std::fmt;

/// Stride at which marker bytes are written into a fresh chunk. Touching one
/// byte per stride forces the host to commit real backing pages instead of
/// handing back a lazy virtual mapping.
const MARKER_STRIDE: usize = 1024;

const MARKER_BYTE: u8 = 0xA5;

/// Opaque signal that the host declined an allocation request.
///
/// Partial or delayed host failure modes are not distinguished; the boundary
/// is a single "allocation denied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationDenied;

impl fmt::Display for AllocationDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation denied by host")
    }
}

impl std::error::Error for AllocationDenied {}

/// One fixed-size unit of memory allocated per tick.
///
/// Ownership is exclusive to the engine's retained-chunks list; removing the
/// chunk from that list is the only way to release its backing store.
pub struct MemoryChunk {
    data: Vec<u8>,
}

impl MemoryChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for MemoryChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChunk")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Source of memory chunks
///
/// The seam between the engine's state machine and the host allocator.
/// Materialization is synchronous: it either returns a committed chunk or
/// reports that the host declined.
pub trait ChunkSource: Send + Sync {
    /// Materialize one chunk of `size` bytes.
    fn materialize(&self, size: u64) -> Result<MemoryChunk, AllocationDenied>;
}

/// Chunk source backed by the process heap.
///
/// Uses `try_reserve_exact` so exhaustion surfaces as a clean `Err` rather
/// than an abort, then writes the marker stride so every page is committed.
pub struct HeapChunkSource;

impl ChunkSource for HeapChunkSource {
    fn materialize(&self, size: u64) -> Result<MemoryChunk, AllocationDenied> {
        let size = usize::try_from(size).map_err(|_| AllocationDenied)?;

        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(size).map_err(|_| AllocationDenied)?;
        data.resize(size, 0);

        let mut offset = 0;
        while offset < data.len() {
            data[offset] = MARKER_BYTE;
            offset += MARKER_STRIDE;
        }

        Ok(MemoryChunk { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_exact_size() {
        let chunk = HeapChunkSource.materialize(64 * 1024).unwrap();
        assert_eq!(chunk.len(), 64 * 1024);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_marker_stride_written() {
        let chunk = HeapChunkSource.materialize(4096).unwrap();
        for offset in (0..chunk.len()).step_by(MARKER_STRIDE) {
            assert_eq!(chunk.data[offset], MARKER_BYTE);
        }
        // Bytes between markers stay zeroed
        assert_eq!(chunk.data[1], 0);
    }

    #[test]
    fn test_zero_size_chunk() {
        let chunk = HeapChunkSource.materialize(0).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_absurd_request_is_denied() {
        // try_reserve_exact fails long before the host OOM-kills us
        let result = HeapChunkSource.materialize(u64::MAX);
        assert_eq!(result.unwrap_err(), AllocationDenied);
    }
}
