//! Protocol Layer: Connection ID parsing
//!
//! Prinsip desain:
//! - Zero-copy parsing: baca header langsung dari slice datagram
//! - Gagal parse = `None`, bukan error (datagram cukup di-drop)

mod connection_id;

pub use connection_id::{ConnectionId, HeaderForm, MAX_CONN_ID_LEN, MIN_CLIENT_INITIAL_LEN};
