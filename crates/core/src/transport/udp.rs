use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use super::MediaSink;
use crate::error::Result;

/// UDP delivery to one client (RFC 3550 §11).
///
/// Binds its own ephemeral socket so that the socket's lifetime is the
/// streaming thread's lifetime, independent of the control connection.
/// RTP goes to `client_ip:rtp_port`, RTCP to `client_ip:rtcp_port`.
pub struct UdpSink {
    socket: UdpSocket,
    rtp_addr: SocketAddr,
    rtcp_addr: SocketAddr,
}

impl UdpSink {
    pub fn bind(client_ip: IpAddr, rtp_port: u16, rtcp_port: u16) -> Result<Self> {
        let local: SocketAddr = match client_ip {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;

        let sink = Self {
            socket,
            rtp_addr: SocketAddr::new(client_ip, rtp_port),
            rtcp_addr: SocketAddr::new(client_ip, rtcp_port),
        };
        tracing::debug!(
            local = ?sink.socket.local_addr().ok(),
            rtp = %sink.rtp_addr,
            rtcp = %sink.rtcp_addr,
            "UDP sink bound"
        );
        Ok(sink)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl MediaSink for UdpSink {
    fn send_rtp(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.rtp_addr).map(|_| ())
    }

    fn send_rtcp(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.rtcp_addr).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rtp_and_rtcp_reach_adjacent_ports() {
        let rtp = UdpSocket::bind("127.0.0.1:0").unwrap();
        let rtcp = UdpSocket::bind("127.0.0.1:0").unwrap();
        rtp.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        rtcp.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let mut sink = UdpSink::bind(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            rtp.local_addr().unwrap().port(),
            rtcp.local_addr().unwrap().port(),
        )
        .unwrap();

        sink.send_rtp(b"rtp").unwrap();
        sink.send_rtcp(b"rtcp").unwrap();

        let mut buf = [0u8; 16];
        let n = rtp.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"rtp");
        let n = rtcp.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"rtcp");
    }
}
