//! Session: satu koneksi logis yang di-multiplex di atas endpoint bersama
//!
//! State protokol (handshake, framing, enkripsi) ada di dalam
//! implementasi session; multiplexer hanya routing datagram.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::Result;
use crate::network::DatagramWriter;
use crate::protocol::ConnectionId;

pub trait Session: Send + Sync {
    /// Dipanggil sekali, tepat sebelum session masuk registry.
    fn set_connection_id(&self, id: ConnectionId);

    /// Proses satu datagram. Returns jumlah byte yang dikonsumsi.
    fn process(&self, remote: SocketAddr, datagram: &[u8]) -> Result<usize>;

    /// Lepas semua resource session.
    fn close(&self);
}

/// Dibuat per varian protokol (client-side / server-side).
pub trait SessionFactory: Send + Sync {
    /// Buat session untuk connection ID yang belum dikenal.
    ///
    /// `Ok(None)` berarti menolak (bukan initial packet, limit resource,
    /// handshake tidak valid). Datagram awal menjadi milik session baru;
    /// demultiplexer tidak memanggil `process` untuk datagram ini.
    fn create_session(
        &self,
        writer: &DatagramWriter,
        remote: SocketAddr,
        datagram: &[u8],
    ) -> Result<Option<Arc<dyn Session>>>;
}
