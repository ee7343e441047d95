//! RTSP/1.0 signaling (RFC 2326).
//!
//! A control connection is a sequence of text requests, each answered by
//! exactly one response on the same connection:
//!
//! ```text
//! bytes --RequestReader--> RtspRequest --MethodHandler--> RtspResponse --serialize--> bytes
//!                                              |
//!                                              +--> SessionTable (SETUP/PLAY/PAUSE/TEARDOWN)
//!                                              +--> sdp::generate_sdp (DESCRIBE)
//! ```
//!
//! `OPTIONS`, `DESCRIBE`, `SETUP`, `PLAY`, `PAUSE` and `TEARDOWN` are
//! understood; any other method gets `501 Not Implemented`.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::{ConnectionContext, MethodHandler};
pub use request::{Method, RequestReader, RtspRequest};
pub use response::RtspResponse;
