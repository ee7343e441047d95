//! Error types for the RTSP server library.

use std::fmt;

use crate::session::{SessionEvent, SessionState};

/// Errors that can occur in the RTSP server library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`MalformedRequest`](Self::MalformedRequest),
///   [`UnsupportedTransport`](Self::UnsupportedTransport).
/// - **Session**: [`SessionNotFound`](Self::SessionNotFound),
///   [`InvalidTransition`](Self::InvalidTransition).
/// - **Delivery**: [`TransmitFailure`](Self::TransmitFailure),
///   [`MediaSource`](Self::MediaSource), [`Io`](Self::Io).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
///
/// Protocol and session errors are answered with an RTSP status
/// (see [`status`](Self::status)); delivery errors stay inside the
/// streaming thread that raised them.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control connection produced text that is not an RTSP request.
    #[error("malformed request: {kind}")]
    MalformedRequest { kind: ParseErrorKind },

    /// The `Transport` header could not be negotiated (RFC 2326 §12.39).
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// No session with the given ID exists in the [`SessionTable`](crate::session::SessionTable).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The event is not applicable to the session's current state.
    #[error("{event:?} not valid in state {state:?}")]
    InvalidTransition {
        state: SessionState,
        event: SessionEvent,
    },

    /// Sending an RTP or RTCP packet to the client failed.
    #[error("transmit failure: {0}")]
    TransmitFailure(#[source] std::io::Error),

    /// The media source could not be opened or read.
    #[error("media source error: {0}")]
    MediaSource(String),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

impl RtspError {
    /// RTSP status code and reason phrase used when this error is
    /// answered on the control connection.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            Self::MalformedRequest { .. } => (400, "Bad Request"),
            Self::SessionNotFound(_) => (454, "Session Not Found"),
            Self::InvalidTransition { .. } => (455, "Method Not Valid in This State"),
            Self::UnsupportedTransport(_) => (461, "Unsupported Transport"),
            _ => (500, "Internal Server Error"),
        }
    }

    pub(crate) fn malformed(kind: ParseErrorKind) -> Self {
        Self::MalformedRequest { kind }
    }
}

/// Specific kind of request parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The connection ended before the blank line terminating the headers.
    Incomplete,
    /// The header block or the declared body exceeded its size limit.
    TooLarge,
    /// The request line or headers were not valid UTF-8.
    InvalidEncoding,
    /// `Content-Length` was present but not a valid byte count.
    InvalidContentLength,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::Incomplete => write!(f, "connection closed mid-request"),
            Self::TooLarge => write!(f, "request too large"),
            Self::InvalidEncoding => write!(f, "request is not valid UTF-8"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_rtsp_status() {
        assert_eq!(RtspError::SessionNotFound("x".into()).status().0, 454);
        assert_eq!(RtspError::UnsupportedTransport("x".into()).status().0, 461);
        assert_eq!(
            RtspError::InvalidTransition {
                state: SessionState::TornDown,
                event: SessionEvent::Play,
            }
            .status(),
            (455, "Method Not Valid in This State")
        );
        assert_eq!(
            RtspError::malformed(ParseErrorKind::InvalidHeader).status().0,
            400
        );
        assert_eq!(RtspError::NotStarted.status().0, 500);
    }
}
