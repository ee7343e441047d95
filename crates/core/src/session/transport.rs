use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RtspError};

/// Channels used when a TCP client omits `interleaved=`.
const DEFAULT_INTERLEAVED: (u8, u8) = (0, 1);

/// Negotiated RTP/RTCP delivery mode for a session (RFC 2326 §12.39).
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP;unicast;client_port=6000-6001
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// ```
///
/// The server echoes the negotiated value back unchanged in the SETUP
/// response (see the [`Display`](fmt::Display) impl).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// RTP and RTCP as UDP datagrams to the client's port pair.
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: u16,
    },
    /// RTP and RTCP framed onto the RTSP control connection (RFC 2326 §10.12).
    Interleaved { rtp_channel: u8, rtcp_channel: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    Udp,
    Tcp,
}

impl Transport {
    /// Parse and validate a `Transport` header value.
    ///
    /// ```
    /// use rtspd::session::Transport;
    ///
    /// let t = Transport::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(
    ///     t,
    ///     Transport::Udp { client_rtp_port: 8000, client_rtcp_port: 8001 }
    /// );
    ///
    /// assert!(Transport::parse("RTP/AVP;unicast").is_err());
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let reject = |why: &str| RtspError::UnsupportedTransport(format!("{why}: {header}"));

        let mut params = header.split(';').map(str::trim).filter(|p| !p.is_empty());

        let profile = match params.next() {
            Some("RTP/AVP") | Some("RTP/AVP/UDP") => Profile::Udp,
            Some("RTP/AVP/TCP") => Profile::Tcp,
            _ => return Err(reject("unrecognized profile")),
        };

        let mut client_port = None;
        let mut interleaved = None;

        for param in params {
            let (name, value) = param.split_once('=').unwrap_or((param, ""));
            match name.trim() {
                "client_port" => {
                    if profile == Profile::Tcp {
                        return Err(reject("client_port not valid with RTP/AVP/TCP"));
                    }
                    client_port = Some(
                        parse_range::<u16>(value)
                            .filter(|(start, _)| *start > 0)
                            .ok_or_else(|| reject("invalid client_port"))?,
                    );
                }
                "interleaved" => {
                    if profile == Profile::Udp {
                        return Err(reject("interleaved not valid with UDP"));
                    }
                    interleaved = Some(
                        parse_range::<u8>(value).ok_or_else(|| reject("invalid interleaved"))?,
                    );
                }
                "multicast" => return Err(reject("multicast not supported")),
                _ => {}
            }
        }

        match profile {
            Profile::Udp => {
                let (client_rtp_port, client_rtcp_port) =
                    client_port.ok_or_else(|| reject("missing client_port"))?;
                Ok(Transport::Udp {
                    client_rtp_port,
                    client_rtcp_port,
                })
            }
            Profile::Tcp => {
                let (rtp_channel, rtcp_channel) = interleaved.unwrap_or(DEFAULT_INTERLEAVED);
                Ok(Transport::Interleaved {
                    rtp_channel,
                    rtcp_channel,
                })
            }
        }
    }

    pub fn is_interleaved(&self) -> bool {
        matches!(self, Transport::Interleaved { .. })
    }
}

impl FromStr for Transport {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => write!(
                f,
                "RTP/AVP;unicast;client_port={}-{}",
                client_rtp_port, client_rtcp_port
            ),
            Transport::Interleaved {
                rtp_channel,
                rtcp_channel,
            } => write!(
                f,
                "RTP/AVP/TCP;unicast;interleaved={}-{}",
                rtp_channel, rtcp_channel
            ),
        }
    }
}

/// `<start>-<end>` with `start < end`.
fn parse_range<T: FromStr + PartialOrd>(value: &str) -> Option<(T, T)> {
    let (start, end) = value.trim().split_once('-')?;
    let start: T = start.trim().parse().ok()?;
    let end: T = end.trim().parse().ok()?;
    (start < end).then_some((start, end))
}
