//! Statistik multiplexer
//!
//! Counter atomic saja, tidak ada lock di hot path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter untuk read loop dan flusher
#[derive(Debug, Default)]
pub struct MuxStats {
    pub datagrams_received: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Connection ID tidak bisa di-parse
    pub datagrams_dropped: AtomicU64,
    pub sessions_created: AtomicU64,
    /// Factory menolak membuat session
    pub sessions_declined: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub writes_submitted: AtomicU64,
    pub writes_completed: AtomicU64,
    pub writes_failed: AtomicU64,
}

/// Snapshot statistik pada satu titik waktu
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub datagrams_dropped: u64,
    pub sessions_created: u64,
    pub sessions_declined: u64,
    pub sessions_closed: u64,
    pub writes_submitted: u64,
    pub writes_completed: u64,
    pub writes_failed: u64,
}

impl MuxStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_declined: self.sessions_declined.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            writes_submitted: self.writes_submitted.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self, uptime: Duration, active_sessions: usize) {
        let s = self.snapshot();
        let secs = uptime.as_secs_f64().max(f64::EPSILON);

        tracing::info!(
            uptime_secs = format_args!("{:.1}", uptime.as_secs_f64()),
            datagrams_in = s.datagrams_received,
            rate_in = format_args!("{:.1}/sec", s.datagrams_received as f64 / secs),
            kb_in = s.bytes_received / 1024,
            dropped = s.datagrams_dropped,
            sessions = active_sessions,
            created = s.sessions_created,
            declined = s.sessions_declined,
            writes_ok = s.writes_completed,
            writes_failed = s.writes_failed,
            "mux stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = MuxStats::new();
        MuxStats::incr(&stats.datagrams_received);
        MuxStats::incr(&stats.datagrams_received);
        MuxStats::incr(&stats.writes_failed);

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.writes_failed, 1);
        assert_eq!(snap.sessions_created, 0);
    }
}
