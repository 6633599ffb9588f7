//! Connection ID extraction dari header QUIC
//!
//! Layout (RFC 8999, version-independent):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Long header:  [1|flags:7][version:32][dcid_len:8][dcid...]   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Short header: [0|flags:7][dcid: local_cid_len bytes]...      │
//! └──────────────────────────────────────────────────────────────┘
//!
//! Short header tidak membawa panjang DCID, jadi panjangnya harus
//! diketahui dari konfigurasi lokal.

use std::fmt;

use bytes::Bytes;

/// Panjang maksimum connection ID untuk QUIC v1
pub const MAX_CONN_ID_LEN: usize = 20;

/// Ukuran minimum datagram Initial dari client
pub const MIN_CLIENT_INITIAL_LEN: usize = 1200;

const LONG_HEADER_BIT: u8 = 0x80;
/// flags(1) + version(4) + dcid_len(1)
const LONG_HEADER_PREFIX: usize = 6;

/// Bentuk header paket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderForm {
    Long,
    Short,
}

impl HeaderForm {
    /// Returns `None` untuk datagram kosong.
    #[inline(always)]
    pub fn of(packet: &[u8]) -> Option<Self> {
        let first = *packet.first()?;
        if first & LONG_HEADER_BIT != 0 {
            Some(Self::Long)
        } else {
            Some(Self::Short)
        }
    }
}

/// Immutable routing key. Equality dan hash berdasarkan isi byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Bytes);

impl ConnectionId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Copy dari slice. Buffer baca di-reuse, jadi ID tidak boleh
    /// meminjam dari datagram.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Parse destination connection ID dari header datagram.
    ///
    /// Returns `None` jika header rusak atau terpotong; pemanggil
    /// cukup drop datagram tersebut.
    pub fn from_packet(packet: &[u8], local_cid_len: usize) -> Option<Self> {
        match HeaderForm::of(packet)? {
            HeaderForm::Long => {
                if packet.len() < LONG_HEADER_PREFIX {
                    return None;
                }
                let dcid_len = packet[LONG_HEADER_PREFIX - 1] as usize;
                if dcid_len > MAX_CONN_ID_LEN {
                    return None;
                }
                let dcid = packet.get(LONG_HEADER_PREFIX..LONG_HEADER_PREFIX + dcid_len)?;
                Some(Self::copy_from_slice(dcid))
            }
            HeaderForm::Short => {
                let dcid = packet.get(1..1 + local_cid_len)?;
                Some(Self::copy_from_slice(dcid))
            }
        }
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self)
    }
}

impl AsRef<[u8]> for ConnectionId {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
