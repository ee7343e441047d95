//! A small RTSP server: RTSP/1.0 signaling over TCP and RTP/RTCP delivery
//! over UDP or interleaved on the control connection.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtspd::media::StillImage;
//! use rtspd::Server;
//!
//! let media = Arc::new(StillImage::open("frame.jpg")?);
//! let mut server = Server::new("0.0.0.0:554", media);
//! server.start()?;
//! # Ok::<(), rtspd::RtspError>(())
//! ```

pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::{MediaFormat, MediaSource, Packetizer, StreamConfig};
pub use server::{Server, ServerConfig, Viewer};
pub use session::{SessionState, SessionTable, Transport};
