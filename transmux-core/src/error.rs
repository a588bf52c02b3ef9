//! Error types shared across the transmux pipeline.
//!
//! The hierarchy follows the pipeline stages: transport errors come from the
//! loader and the I/O controller, demux errors from the FLV parser, remux
//! errors from the fMP4 generator. Transport `EarlyEof` is special-cased by
//! the I/O controller, which recovers it locally for non-live streams of
//! known length; everything else is surfaced to the consumer.

use thiserror::Error;

/// Transport-level errors reported by loaders and the I/O controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established in time.
    #[error("Connecting timeout")]
    ConnectingTimeout,

    /// The server answered with a non-success status code.
    #[error("Invalid HTTP status code: {status}")]
    HttpStatusCodeInvalid {
        /// Status code received from the server.
        status: u16,
    },

    /// The connection was interrupted before the declared length arrived.
    ///
    /// Recoverable: the I/O controller reconnects with a range request when
    /// the total length is known and the stream is not live.
    #[error("Early EOF after {received} bytes")]
    EarlyEof {
        /// Bytes received before the interruption.
        received: u64,
    },

    /// An `EarlyEof` occurred and the range reconnection failed as well.
    #[error("Unrecoverable early EOF")]
    UnrecoverableEarlyEof,

    /// Any other transport failure.
    #[error("Transport exception: {0}")]
    Exception(String),
}

impl TransportError {
    /// Whether the I/O controller may attempt local recovery.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::EarlyEof { .. })
    }
}

/// Demuxer errors, classified per the consumer-facing taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// Malformed container or elementary stream data.
    #[error("Format error: {0}")]
    Format(String),

    /// A codec outside the supported set (AVC, AAC, MP3) was encountered.
    #[error("Unsupported codec: {0}")]
    CodecUnsupported(String),

    /// A bug in the demuxer itself.
    #[error("Internal demuxer error: {0}")]
    Internal(String),
}

/// Remuxer errors. These indicate programmer errors, not bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemuxError {
    /// The remuxer was driven in an invalid order (e.g. samples before
    /// track metadata).
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

/// Top-level error type for the transmux pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error (loader / I/O controller).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Demux error (FLV parser).
    #[error("Demux error: {0}")]
    Demux(#[from] DemuxError),

    /// Remux error (fMP4 generator).
    #[error("Remux error: {0}")]
    Remux(#[from] RemuxError),

    /// I/O error from the host environment.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Demux(DemuxError::Format(msg.into()))
    }

    /// Create an unsupported-codec error.
    pub fn codec_unsupported(msg: impl Into<String>) -> Self {
        Error::Demux(DemuxError::CodecUnsupported(msg.into()))
    }

    /// Create an illegal-state error.
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::Remux(RemuxError::IllegalState(msg.into()))
    }
}

/// Result type alias using the transmux [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
