use super::Packetizer;
use super::rtp::{RTP_HEADER_LEN, RtpHeader};

/// Largest payload per packet, keeping packets under a 1500-byte MTU.
pub const MAX_PAYLOAD: usize = 1400;

/// Packetizer for opaque frames.
///
/// A frame that fits goes out whole in one packet. A larger frame is split
/// into consecutive packets sharing one timestamp, with the marker bit set
/// only on the last, so the receiver can reassemble it by sequence number.
#[derive(Debug)]
pub struct RawPacketizer {
    header: RtpHeader,
}

impl RawPacketizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
        }
    }
}

impl Packetizer for RawPacketizer {
    fn packetize(&mut self, frame: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        let count = frame.len().div_ceil(MAX_PAYLOAD).max(1);
        let mut packets = Vec::with_capacity(count);

        for index in 0..count {
            let start = index * MAX_PAYLOAD;
            let chunk = &frame[start..frame.len().min(start + MAX_PAYLOAD)];
            let hdr = self.header.write(index + 1 == count);

            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(chunk);
            packets.push(packet);
        }

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            frame_bytes = frame.len(),
            packets = count,
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "frame packetized"
        );

        packets
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}
