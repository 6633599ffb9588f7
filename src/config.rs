//! Konfigurasi multiplexer
//!
//! Semua nilai punya default yang masuk akal; binary memetakan argumen CLI
//! ke struct ini lalu memanggil [`MuxConfig::validate`].

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{MuxError, Result};
use crate::protocol::{MAX_CONN_ID_LEN, MIN_CLIENT_INITIAL_LEN};

/// Default panjang connection ID lokal (bytes)
pub const DEFAULT_LOCAL_CID_LEN: usize = 16;

/// Konfigurasi untuk satu endpoint UDP beserta connection-nya
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Alamat bind socket UDP
    pub bind_addr: SocketAddr,
    /// Ukuran buffer baca per datagram
    pub read_buffer_size: usize,
    /// Hint untuk pool: minta buffer "direct"
    pub direct_buffers: bool,
    /// Panjang DCID pada short header (dipilih secara lokal)
    pub local_cid_len: usize,
    /// SO_RCVBUF / SO_SNDBUF
    pub socket_buffer_size: usize,
    /// Kapasitas `mio::Events`
    pub events_capacity: usize,
    /// Timeout poll untuk responsiveness
    pub poll_timeout: Duration,
    /// Interval log statistik
    pub stats_interval: Duration,
    /// Jumlah maksimum buffer yang disimpan pool
    pub pool_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 4433)),
            read_buffer_size: 1500,
            direct_buffers: true,
            local_cid_len: DEFAULT_LOCAL_CID_LEN,
            socket_buffer_size: 256 * 1024, // 256KB
            events_capacity: 1024,
            poll_timeout: Duration::from_millis(1),
            stats_interval: Duration::from_secs(5),
            pool_capacity: 64,
        }
    }
}

impl MuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size < MIN_CLIENT_INITIAL_LEN {
            return Err(MuxError::Config(format!(
                "read_buffer_size {} is below the minimum initial datagram size {}",
                self.read_buffer_size, MIN_CLIENT_INITIAL_LEN
            )));
        }
        if self.local_cid_len > MAX_CONN_ID_LEN {
            return Err(MuxError::Config(format!(
                "local_cid_len {} exceeds {}",
                self.local_cid_len, MAX_CONN_ID_LEN
            )));
        }
        if self.events_capacity == 0 {
            return Err(MuxError::Config("events_capacity must be non-zero".into()));
        }
        Ok(())
    }
}
