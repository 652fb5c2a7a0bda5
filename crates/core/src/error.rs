//! Error types for the MJPEG RTSP server library.

use std::fmt;

/// Errors that can occur in the streaming engine.
///
/// No error outlives one session:
///
/// - [`MalformedJpeg`](Self::MalformedJpeg) drops the frame and streaming goes on.
/// - [`TransportWrite`](Self::TransportWrite) ends the session whose client went away.
/// - [`Parse`](Self::Parse) and [`ProtocolViolation`](Self::ProtocolViolation)
///   become an RTSP error status; the connection stays open.
/// - [`ResourceExhaustion`](Self::ResourceExhaustion) rejects the connection or SETUP.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error outside the RTP send path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame is not a usable baseline JPEG.
    #[error("malformed JPEG: {0}")]
    MalformedJpeg(&'static str),

    /// Writing an RTP packet to the client failed.
    #[error("transport write failed: {0}")]
    TransportWrite(#[source] std::io::Error),

    /// The request is not valid in the session's current state.
    #[error("{method} not valid in state {state}")]
    ProtocolViolation {
        method: &'static str,
        state: &'static str,
    },

    /// A socket or worker slot could not be obtained.
    #[error("resources exhausted: {0}")]
    ResourceExhaustion(&'static str),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// Request head was not valid UTF-8.
    InvalidEncoding,
    /// Request head exceeded the size limit without a terminating blank line.
    HeadTooLarge,
    /// `Content-Length` announced a body larger than the server accepts.
    BodyTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidEncoding => write!(f, "request is not valid UTF-8"),
            Self::HeadTooLarge => write!(f, "request head too large"),
            Self::BodyTooLarge => write!(f, "request body too large"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
