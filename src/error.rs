//! Error types untuk multiplexer

use std::io;

use thiserror::Error;

use crate::protocol::ConnectionId;

/// Errors yang bisa muncul di demultiplexer, flusher, atau session.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed")]
    Closed,

    #[error("connection ID {0} already registered")]
    DuplicateConnectionId(ConnectionId),

    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MuxError>;
