//! Kontrak transport endpoint datagram
//!
//! Alamat sumber/tujuan dikirim eksplisit bersama buffer, bukan lewat
//! side-channel per thread.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};

/// Hasil satu kali `fill`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Input ditutup permanen (terminal, bukan error)
    Closed,
    /// Belum ada data; tunggu readiness berikutnya
    Empty,
    /// Satu datagram sepanjang `len` dari `from`
    Datagram { len: usize, from: SocketAddr },
}

/// Notifikasi penyelesaian write. Dipanggil tepat satu kali, boleh
/// dari thread mana pun dan boleh secara sinkron di dalam `write`.
pub type WriteCompletion = Box<dyn FnOnce(io::Result<()>) + Send>;

/// Endpoint non-blocking yang dipakai bersama oleh semua session
pub trait DatagramEndPoint: Send + Sync {
    /// Isi `buffer` dengan satu datagram tanpa blocking.
    ///
    /// `buffer` harus kosong saat dipanggil; pada `Fill::Datagram`
    /// isinya tepat `len` bytes.
    fn fill(&self, buffer: &mut BytesMut) -> io::Result<Fill>;

    /// Kirim `buffers` sebagai satu datagram ke `to`.
    fn write(&self, to: SocketAddr, buffers: Vec<Bytes>, completion: WriteCompletion);

    /// Minta `on_fillable` dipanggil lagi saat ada data.
    fn fill_interested(&self);

    fn shutdown_output(&self);

    fn close(&self);

    fn is_open(&self) -> bool;
}
