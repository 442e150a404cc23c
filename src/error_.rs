use std::io;

use thiserror::Error;

/// Errors from sending or receiving packets.
#[derive(Debug, Error)]
pub enum NetError {
    /// Other io error.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The sender or receiver has been closed.
    #[error("Transport is closed")]
    Closed,

    /// The receiver worker has already been started.
    #[error("Receiver already started")]
    AlreadyStarted,

    /// The destination buffer cannot hold the packet.
    #[error("Input buffer {available} not big enough for {needed}")]
    BufferTooSmall {
        /// Bytes available in the destination.
        available: usize,
        /// Length of the packet.
        needed: usize,
    },

    /// An earlier receive failed and the receiver stopped for good.
    #[error("Receiver stopped after an I/O error")]
    ReceiveFailed,

    /// No packet has been delivered yet.
    #[error("No packet available")]
    NoPacket,

    /// The socket is gone.
    #[error("Socket is not valid")]
    InvalidSocket,

    /// The transport config was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Sending failed to at least one target.
    #[error("Failed to send to {failed} of {targets} targets")]
    SendFailed {
        /// Number of targets that failed.
        failed: usize,
        /// Number of targets attempted.
        targets: usize,
    },
}

/// A configuration was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Pacing requires a period of at least one millisecond.
    #[error("Rate limit period must be positive, got {0}ms")]
    PerMillis(u64),

    /// The receive buffer must hold at least one RTP header.
    #[error("Receive buffer length {0} is too small")]
    ReceiveBuffer(usize),

    /// The pacing queue needs room for at least one packet.
    #[error("Pacing queue capacity must be at least 1")]
    QueueCapacity,

    /// The receive timeout bounds shutdown latency and cannot be zero.
    #[error("Receive timeout must be positive")]
    ReceiveTimeout,
}

/// Failure to parse an RTCP packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RtcpError {
    /// Packet is malformed.
    #[error("RTCP parse: {0}")]
    Parse(&'static str),

    /// Not an RTCP packet of the expected type.
    #[error("RTCP packet type {0} is not expected here")]
    UnexpectedType(u8),
}

impl From<&'static str> for RtcpError {
    fn from(v: &'static str) -> Self {
        RtcpError::Parse(v)
    }
}

/// Errors reported by a [`StreamManager`][crate::StreamManager] backend.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend has been disposed.
    #[error("Session is disposed")]
    Disposed,

    /// The backend does not recognize the stream.
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// The data source format cannot be sent.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Other io error.
    #[error("{0}")]
    Io(#[from] io::Error),
}
