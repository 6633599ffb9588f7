//! Core module: buffer pool dan statistik
//!
//! Prinsip desain:
//! - No-Allocation: buffer baca dipinjam dari pool dan di-reuse
//! - Lock-Free counters: statistik hanya atomic operations

mod buffer_pool;
mod stats;

pub use buffer_pool::{ByteBufferPool, PooledBuffers};
pub use stats::{MuxStats, StatsSnapshot};
