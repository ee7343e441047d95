//! Minimal RTCP reports (RFC 3550 §6.4).
//!
//! The server sends a fixed-size receiver report on the RTCP port or
//! channel at a fixed interval. It carries the stream's SSRC and no
//! computed statistics:
//!
//! ```text
//! 80 C9 00 07   V=2, PT=201 (RR), length=7 words
//! <SSRC>        sender SSRC, same as the RTP stream
//! 00 x 24       report block fields, all zero
//! ```

/// RTCP packet type for receiver reports.
pub const PT_RECEIVER_REPORT: u8 = 201;

pub const REPORT_LEN: usize = 32;

/// Build the fixed-size report for the stream identified by `ssrc`.
pub fn receiver_report(ssrc: u32) -> [u8; REPORT_LEN] {
    let mut packet = [0u8; REPORT_LEN];
    packet[0] = 2 << 6;
    packet[1] = PT_RECEIVER_REPORT;
    packet[2..4].copy_from_slice(&((REPORT_LEN / 4 - 1) as u16).to_be_bytes());
    packet[4..8].copy_from_slice(&ssrc.to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_layout() {
        let packet = receiver_report(0x0102_0304);
        assert_eq!(&packet[..4], &[0x80, 0xC9, 0x00, 0x07]);
        assert_eq!(&packet[4..8], &[1, 2, 3, 4]);
        assert!(packet[8..].iter().all(|b| *b == 0));
        assert_eq!(packet.len(), 32);
    }
}
