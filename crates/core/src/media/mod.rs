//! Media sources, RTP packetization and the streaming thread.
//!
//! ## Pipeline
//!
//! ```text
//! MediaSource::open() -> FrameSource -> Packetizer -> MediaSink
//!                          (frames)      (RTP)        (UDP / interleaved)
//! ```
//!
//! A [`stream`] thread drives the pipeline at a fixed frame interval and
//! sends an [`rtcp`] report at a slower fixed interval.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! with a wrapping 16-bit sequence number, a 32-bit media timestamp and a
//! random SSRC identifying the sender.

pub mod raw;
pub mod rtcp;
pub mod rtp;
pub mod source;
pub mod stream;

pub use raw::RawPacketizer;
pub use source::{ChunkedFile, FrameSource, ImageSequence, MediaSource, MemorySource, StillImage};
pub use stream::{MediaStream, StreamConfig, StreamHandle};

/// Encoding advertised in SDP and stamped into RTP packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// Encoding name for `a=rtpmap` (e.g. `"JPEG"`, `"H264"`).
    pub encoding: String,
    /// RTP payload type (RFC 3551).
    pub payload_type: u8,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
}

impl MediaFormat {
    /// Static payload type 26, RFC 3551 §6.
    pub fn jpeg() -> Self {
        Self {
            encoding: "JPEG".to_string(),
            payload_type: 26,
            clock_rate: 90_000,
        }
    }

    /// Dynamic payload type 96.
    pub fn h264() -> Self {
        Self {
            encoding: "H264".to_string(),
            payload_type: 96,
            clock_rate: 90_000,
        }
    }

    /// SDP media-level attribute lines (`a=rtpmap` before `a=control`).
    pub fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type, self.encoding, self.clock_rate
            ),
            "a=control:track1".to_string(),
        ]
    }
}

/// Turns media frames into RTP packets.
///
/// One packetizer belongs to one session and owns its RTP numbering
/// state, so sequence numbers and timestamps continue across PAUSE/PLAY.
pub trait Packetizer: Send {
    /// Packetize one frame into complete RTP packets (header + payload),
    /// then advance the media timestamp by `timestamp_increment`.
    fn packetize(&mut self, frame: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;

    fn payload_type(&self) -> u8;

    /// SSRC of the stream, shared with its RTCP reports.
    fn ssrc(&self) -> u32;

    /// Sequence number of the next packet.
    fn next_sequence(&self) -> u16;

    /// RTP timestamp of the next frame.
    fn next_rtp_timestamp(&self) -> u32;
}
