use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::MediaSink;
use crate::error::RtspError;
use crate::protocol::request::RequestReader;
use crate::protocol::{ConnectionContext, MethodHandler, RtspResponse};
use crate::server::ServerConfig;
use crate::session::SessionTable;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    sessions: SessionTable,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let sessions = sessions.clone();
                let config = config.clone();
                let running = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, sessions, config, running);
                });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Write half of a control connection, shared between the request loop
/// and any interleaved streaming threads.
///
/// Each response and each `$` frame is written under one lock, so frames
/// never split a response.
#[derive(Clone)]
pub struct InterleavedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl InterleavedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn write_response(&self, response: &RtspResponse) -> io::Result<()> {
        let mut writer = self.inner.lock();
        writer.write_all(response.serialize().as_bytes())?;
        writer.flush()
    }

    /// Write one `$ <channel> <length:u16> <payload>` frame (RFC 2326 §10.12).
    pub fn write_frame(&self, channel: u8, payload: &[u8]) -> io::Result<()> {
        let len = u16::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} byte packet exceeds interleaved frame limit", payload.len()),
            )
        })?;
        let [hi, lo] = len.to_be_bytes();

        let mut writer = self.inner.lock();
        writer.write_all(&[b'$', channel, hi, lo])?;
        writer.write_all(payload)?;
        writer.flush()
    }
}

/// Delivers RTP/RTCP as interleaved frames on the control connection.
pub struct InterleavedSink {
    writer: InterleavedWriter,
    rtp_channel: u8,
    rtcp_channel: u8,
}

impl InterleavedSink {
    pub fn new(writer: InterleavedWriter, rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            writer,
            rtp_channel,
            rtcp_channel,
        }
    }
}

impl MediaSink for InterleavedSink {
    fn send_rtp(&mut self, packet: &[u8]) -> io::Result<()> {
        self.writer.write_frame(self.rtp_channel, packet)
    }

    fn send_rtcp(&mut self, packet: &[u8]) -> io::Result<()> {
        self.writer.write_frame(self.rtcp_channel, packet)
    }
}

/// A single RTSP client connection with its own lifecycle.
struct Connection {
    reader: RequestReader<BufReader<TcpStream>>,
    writer: InterleavedWriter,
    handler: MethodHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(
        stream: TcpStream,
        sessions: SessionTable,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let (peer_addr, local_addr) = match (stream.peer_addr(), stream.local_addr()) {
            (Ok(peer), Ok(local)) => (peer, local),
            _ => return,
        };

        tracing::info!(%peer_addr, "client connected");

        if let Err(e) = stream.set_read_timeout(config.idle_timeout) {
            tracing::warn!(%peer_addr, error = %e, "failed to set idle timeout");
        }
        if let Err(e) = stream.set_write_timeout(Some(config.write_timeout)) {
            tracing::warn!(%peer_addr, error = %e, "failed to set write timeout");
        }

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let writer = InterleavedWriter::new(stream);
        let context = ConnectionContext::new(peer_addr, local_addr);
        let handler = MethodHandler::new(sessions, config, context, Some(writer.clone()));

        let mut conn = Connection {
            reader: RequestReader::new(BufReader::new(reader_stream)),
            writer,
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.cleanup();

        tracing::info!(
            %peer_addr,
            reason,
            last_cseq = conn.handler.context().cseq(),
            "client disconnected"
        );
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &AtomicBool) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let request = match self.reader.next_request() {
                Ok(Some(request)) => request,
                Ok(None) => return "connection closed by client",
                Err(RtspError::MalformedRequest { kind }) => {
                    tracing::warn!(peer = %self.peer_addr, %kind, "malformed request");
                    let response = self.handler.reject_malformed();
                    let _ = self.writer.write_response(&response);
                    return "malformed request";
                }
                Err(RtspError::Io(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return "idle timeout";
                }
                Err(_) => return "read error",
            };

            tracing::debug!(
                peer = %self.peer_addr,
                method = %request.method,
                uri = %request.uri,
                cseq = ?request.cseq(),
                "request"
            );

            let response = self.handler.handle(&request);

            tracing::debug!(
                peer = %self.peer_addr,
                status = response.status_code,
                cseq = ?response.cseq,
                "response"
            );

            if self.writer.write_response(&response).is_err() {
                return "write error";
            }
        }

        "server shutting down"
    }

    /// Tear down sessions created on this connection. If the thread unwinds
    /// before getting here, dropping the handler does the same.
    fn cleanup(&mut self) {
        let removed = self.handler.close();
        if removed > 0 {
            tracing::info!(peer = %self.peer_addr, removed, "cleaned up sessions on disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frames_rtp_and_rtcp_on_their_channels() {
        let buf = SharedBuf::default();
        let mut sink = InterleavedSink::new(InterleavedWriter::new(buf.clone()), 2, 3);

        sink.send_rtp(&[0xAA; 3]).unwrap();
        sink.send_rtcp(&[0xBB; 2]).unwrap();

        assert_eq!(
            *buf.0.lock(),
            vec![b'$', 2, 0, 3, 0xAA, 0xAA, 0xAA, b'$', 3, 0, 2, 0xBB, 0xBB]
        );
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let writer = InterleavedWriter::new(SharedBuf::default());
        let err = writer.write_frame(0, &vec![0u8; 70_000]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn responses_share_the_writer() {
        let buf = SharedBuf::default();
        let writer = InterleavedWriter::new(buf.clone());
        writer
            .write_response(&RtspResponse::ok().with_cseq(2))
            .unwrap();
        assert_eq!(*buf.0.lock(), b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n".to_vec());
    }
}
