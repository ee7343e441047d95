//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=<session-name>                             ← session name
//! c=IN IP4 <addr>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! a=tool:rtspd                                 ← server software
//! a=sendonly                                   ← direction
//! m=video <port> RTP/AVP <pt>                  ← media description
//! a=rtpmap:<pt> <encoding>/<clock>             ← encoding/clock rate
//! a=control:track1                             ← track control URL
//! ```

use std::net::Ipv6Addr;

use crate::media::MediaFormat;
use crate::server::ServerConfig;

/// Generate the session description for `format`, advertising `host`.
pub fn generate_sdp(format: &MediaFormat, host: &str, config: &ServerConfig) -> String {
    let addr_type = if host.parse::<Ipv6Addr>().is_ok() {
        "IP6"
    } else {
        "IP4"
    };

    let mut sdp: Vec<String> = vec![
        "v=0".to_string(),
        format!(
            "o={} {} {} IN {} {}",
            config.sdp_username, config.sdp_session_id, config.sdp_session_version, addr_type, host
        ),
        format!("s={}", config.sdp_session_name),
        format!("c=IN {} {}", addr_type, host),
        "t=0 0".to_string(),
        "a=tool:rtspd".to_string(),
        "a=sendonly".to_string(),
        format!("m=video {} RTP/AVP {}", config.media_port, format.payload_type),
    ];
    sdp.extend(format.sdp_attributes());

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_jpeg_sdp() {
        let config = ServerConfig {
            sdp_username: "server".into(),
            sdp_session_id: "1234567890".into(),
            sdp_session_version: "1".into(),
            sdp_session_name: "JPEG Stream".into(),
            ..ServerConfig::default()
        };
        let sdp = generate_sdp(&MediaFormat::jpeg(), "192.168.1.100", &config);

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=server 1234567890 1 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=JPEG Stream\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("m=video 5004 RTP/AVP 26\r\n"));

        let m_idx = sdp.find("m=video").unwrap();
        let rtpmap_idx = sdp.find("a=rtpmap:26 JPEG/90000").unwrap();
        assert!(sdp.find("a=sendonly").unwrap() < m_idx);
        assert!(rtpmap_idx > m_idx);
        assert!(sdp.ends_with("a=control:track1\r\n"));
    }

    #[test]
    fn ipv6_host_uses_ip6() {
        let sdp = generate_sdp(&MediaFormat::h264(), "::1", &ServerConfig::default());
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
    }
}
