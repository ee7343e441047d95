//! Network transport for RTSP signaling and RTP/RTCP delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries request/response signaling. One TCP
//!   connection per client, with a thread per connection. With
//!   `RTP/AVP/TCP` the same connection also carries media, framed as
//!   `$ <channel> <length> <packet>` (RFC 2326 §10.12).
//!
//! - **UDP** ([`udp`]): RTP and RTCP datagrams to the client's negotiated
//!   port pair, from a socket owned by the session's streaming thread.

pub mod tcp;
pub mod udp;

use std::io;

pub use tcp::{InterleavedSink, InterleavedWriter};
pub use udp::UdpSink;

/// Destination for one session's RTP and RTCP packets.
///
/// A sink is moved into the streaming thread and dropped when that thread
/// ends, releasing any socket it owns.
pub trait MediaSink: Send {
    fn send_rtp(&mut self, packet: &[u8]) -> io::Result<()>;

    fn send_rtcp(&mut self, packet: &[u8]) -> io::Result<()>;
}
