use std::io;

use relay_tls::TlsError;
use thiserror::Error;

use crate::forward::Direction;

/// Errors that end a session or prevent one from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to upstream {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with upstream {addr} failed: {source}")]
    UpstreamTls {
        addr: String,
        #[source]
        source: TlsError,
    },

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("line exceeds the {limit} byte limit")]
    LineTooLong { limit: usize },

    #[error("{direction} forwarder aborted: {reason}")]
    TaskFailed { direction: Direction, reason: String },
}
