//! RTSP session management (RFC 2326 §3, §12.37).
//!
//! A session is server-side state created by SETUP and destroyed by
//! TEARDOWN or by loss of the control connection that created it. It
//! tracks:
//!
//! - A unique session ID (16 hex digits, returned in the `Session` header).
//! - The playback state.
//! - The transport negotiated during SETUP.
//! - The streaming thread, while playing.
//!
//! ## Session lifecycle
//!
//! ```text
//! Init     --SETUP-->    Ready
//! Ready    --PLAY-->     Playing   (starts the streaming thread)
//! Playing  --PLAY-->     Playing   (no second thread)
//! Playing  --PAUSE-->    Ready     (stops the thread, keeps numbering)
//! Ready    --PAUSE-->    Ready
//! Ready    --TEARDOWN--> TornDown  (removed from the table)
//! Playing  --TEARDOWN--> TornDown  (thread stopped, then removed)
//! ```
//!
//! Every state change and every start/stop of the streaming thread happens
//! under the session's own mutex; the table's lock only guards the map.

pub mod transport;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, RtspError};
use crate::media::{MediaSource, MediaStream, StreamConfig, StreamHandle};
use crate::transport::{InterleavedSink, InterleavedWriter, MediaSink, UdpSink};
pub use transport::Transport;

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Ready,
    Playing,
    TornDown,
}

/// Protocol events that drive [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Setup,
    Play,
    Pause,
    Teardown,
}

impl SessionState {
    /// State after `event`, or `None` if the event is not valid here.
    pub fn next(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Init, E::Setup) => Some(S::Ready),
            (S::Ready | S::Playing, E::Play) => Some(S::Playing),
            (S::Ready | S::Playing, E::Pause) => Some(S::Ready),
            (S::Ready | S::Playing, E::Teardown) => Some(S::TornDown),
            _ => None,
        }
    }
}

struct SessionInner {
    state: SessionState,
    /// Present only while `state == Playing`.
    stream: Option<StreamHandle>,
    /// Packetizer and source parked between PAUSE and PLAY.
    media: Option<MediaStream>,
}

/// A single RTSP session.
pub struct Session {
    pub id: String,
    /// Request-URI of the SETUP that created the session.
    pub uri: String,
    pub transport: Transport,
    /// Peer address of the control connection that issued SETUP.
    pub client_addr: SocketAddr,
    interleaved: Option<InterleavedWriter>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SessionState::Playing
    }

    /// Apply `event`, starting or stopping the streaming thread as needed.
    ///
    /// On error the state is left unchanged.
    fn apply(&self, event: SessionEvent, launcher: &Launcher) -> Result<SessionState> {
        let mut inner = self.inner.lock();
        let current = inner.state;

        if current == SessionState::TornDown {
            return Err(RtspError::SessionNotFound(self.id.clone()));
        }
        let next = current
            .next(event)
            .ok_or(RtspError::InvalidTransition {
                state: current,
                event,
            })?;

        match event {
            SessionEvent::Play => {
                if let Some(finished) = inner.stream.take_if(|handle| handle.is_finished()) {
                    inner.media = finished.stop();
                }
                if inner.stream.is_none() {
                    let media = inner.media.take();
                    inner.stream = Some(launcher.launch(self, media)?);
                }
            }
            SessionEvent::Pause | SessionEvent::Teardown => {
                if let Some(handle) = inner.stream.take() {
                    inner.media = handle.stop();
                }
                if event == SessionEvent::Teardown {
                    inner.media = None;
                }
            }
            SessionEvent::Setup => {}
        }

        tracing::debug!(session_id = %self.id, old_state = ?current, new_state = ?next, "state transition");
        inner.state = next;
        Ok(next)
    }

    fn open_sink(&self) -> Result<Box<dyn MediaSink>> {
        match self.transport {
            Transport::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => Ok(Box::new(UdpSink::bind(
                self.client_addr.ip(),
                client_rtp_port,
                client_rtcp_port,
            )?)),
            Transport::Interleaved {
                rtp_channel,
                rtcp_channel,
            } => {
                let writer = self.interleaved.clone().ok_or_else(|| {
                    RtspError::UnsupportedTransport("no control connection to interleave on".into())
                })?;
                Ok(Box::new(InterleavedSink::new(writer, rtp_channel, rtcp_channel)))
            }
        }
    }
}

/// Starts streaming threads with the server's media source and timing.
struct Launcher {
    media: Arc<dyn MediaSource>,
    config: StreamConfig,
}

impl Launcher {
    fn launch(&self, session: &Session, media: Option<MediaStream>) -> Result<StreamHandle> {
        let sink = session.open_sink()?;
        let media = match media {
            Some(media) => media,
            None => MediaStream::open(self.media.as_ref())?,
        };
        StreamHandle::spawn(&session.id, media, sink, &self.config)
    }
}

/// Process-wide registry of active sessions.
///
/// Cheap to clone; clones share the same map. Backed by
/// `parking_lot::RwLock` for the map and a `Mutex` per session, so
/// unrelated clients never wait on each other's state changes.
#[derive(Clone)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    next_id: Arc<AtomicU64>,
    launcher: Arc<Launcher>,
}

impl SessionTable {
    pub fn new(media: Arc<dyn MediaSource>, config: StreamConfig) -> Self {
        SessionTable {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            launcher: Arc::new(Launcher { media, config }),
        }
    }

    /// The media source every session streams from.
    pub fn media(&self) -> &dyn MediaSource {
        self.launcher.media.as_ref()
    }

    /// Create a session in `Ready` and register it under a fresh ID.
    ///
    /// IDs come from a monotonic counter and are never reused.
    pub fn create(
        &self,
        uri: &str,
        transport: Transport,
        client_addr: SocketAddr,
        interleaved: Option<InterleavedWriter>,
    ) -> Result<Arc<Session>> {
        let id = format!("{:016X}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let session = Arc::new(Session {
            id: id.clone(),
            uri: uri.to_string(),
            transport,
            client_addr,
            interleaved,
            inner: Mutex::new(SessionInner {
                state: SessionState::Init,
                stream: None,
                media: None,
            }),
        });
        session.apply(SessionEvent::Setup, &self.launcher)?;

        let total = {
            let mut sessions = self.sessions.write();
            sessions.insert(id.clone(), session.clone());
            sessions.len()
        };
        tracing::debug!(session_id = %id, uri, %transport, total_sessions = total, "session created");

        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RtspError::SessionNotFound(id.to_string()))
    }

    /// Apply `event` to session `id`. A completed TEARDOWN also removes
    /// the session.
    pub fn transition(&self, id: &str, event: SessionEvent) -> Result<SessionState> {
        let session = self.get(id)?;
        let state = session.apply(event, &self.launcher)?;
        if state == SessionState::TornDown {
            self.remove(id);
        }
        Ok(state)
    }

    /// Drop a session from the map without touching its state.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, total_sessions = sessions.len(), "session removed");
        }
        removed
    }

    /// Tear down several sessions (used when a control connection drops).
    /// Returns how many were still alive.
    pub fn teardown_all(&self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| self.transition(id, SessionEvent::Teardown).is_ok())
            .count()
    }

    /// Tear down every session.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        let removed = self.teardown_all(&ids);
        if removed > 0 {
            tracing::info!(removed, "all sessions torn down");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn playing_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaFormat, StillImage};
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;

    fn table() -> SessionTable {
        let media = Arc::new(StillImage::from_bytes(vec![0xFF; 8]).with_format(MediaFormat::jpeg()));
        SessionTable::new(
            media,
            StreamConfig {
                frame_interval: Duration::from_millis(5),
                rtcp_interval: Duration::from_secs(3600),
            },
        )
    }

    fn udp_session(table: &SessionTable, receiver: &UdpSocket) -> Arc<Session> {
        let port = receiver.local_addr().unwrap().port();
        table
            .create(
                "rtsp://127.0.0.1/stream",
                Transport::Udp {
                    client_rtp_port: port,
                    client_rtcp_port: port,
                },
                "127.0.0.1:40000".parse().unwrap(),
                None,
            )
            .unwrap()
    }

    #[test]
    fn transition_table() {
        use SessionEvent as E;
        use SessionState as S;

        assert_eq!(S::Init.next(E::Setup), Some(S::Ready));
        assert_eq!(S::Init.next(E::Play), None);
        assert_eq!(S::Ready.next(E::Play), Some(S::Playing));
        assert_eq!(S::Playing.next(E::Play), Some(S::Playing));
        assert_eq!(S::Playing.next(E::Pause), Some(S::Ready));
        assert_eq!(S::Ready.next(E::Teardown), Some(S::TornDown));
        assert_eq!(S::Playing.next(E::Teardown), Some(S::TornDown));
        assert_eq!(S::Ready.next(E::Setup), None);
        assert_eq!(S::TornDown.next(E::Play), None);
        assert_eq!(S::Init.next(E::Teardown), None);
    }

    #[test]
    fn create_registers_ready_session_with_unique_ids() {
        let table = table();
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a = udp_session(&table, &rx);
        let b = udp_session(&table, &rx);

        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
        assert_eq!(a.state(), SessionState::Ready);
        assert_eq!(table.len(), 2);
        assert!(table.get(&a.id).is_ok());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let table = table();
        assert!(matches!(
            table.transition("nope", SessionEvent::Play),
            Err(RtspError::SessionNotFound(_))
        ));
    }

    #[test]
    fn play_pause_teardown_lifecycle() {
        let table = table();
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let session = udp_session(&table, &rx);

        assert_eq!(
            table.transition(&session.id, SessionEvent::Play).unwrap(),
            SessionState::Playing
        );
        let mut buf = [0u8; 64];
        assert!(rx.recv(&mut buf).is_ok(), "streaming reaches the client");
        assert_eq!(table.playing_sessions().len(), 1);

        assert_eq!(
            table.transition(&session.id, SessionEvent::Pause).unwrap(),
            SessionState::Ready
        );
        assert!(table.playing_sessions().is_empty());

        assert_eq!(
            table.transition(&session.id, SessionEvent::Teardown).unwrap(),
            SessionState::TornDown
        );
        assert_eq!(session.state(), SessionState::TornDown);
        assert!(table.is_empty());
        assert!(matches!(
            table.transition(&session.id, SessionEvent::Play),
            Err(RtspError::SessionNotFound(_))
        ));
    }

    #[test]
    fn duplicate_play_keeps_one_stream() {
        let table = table();
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let session = udp_session(&table, &rx);

        table.transition(&session.id, SessionEvent::Play).unwrap();
        table.transition(&session.id, SessionEvent::Play).unwrap();
        thread::sleep(Duration::from_millis(50));
        table.transition(&session.id, SessionEvent::Teardown).unwrap();

        let mut seqs = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = rx.recv(&mut buf) {
            if n >= 12 && buf[1] & 0x7f == 26 {
                seqs.push(u16::from_be_bytes([buf[2], buf[3]]));
            }
        }
        assert!(!seqs.is_empty());
        let mut deduped = seqs.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), seqs.len(), "no sequence number sent twice");
    }

    #[test]
    fn shutdown_tears_down_everything() {
        let table = table();
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a = udp_session(&table, &rx);
        let _b = udp_session(&table, &rx);
        table.transition(&a.id, SessionEvent::Play).unwrap();

        assert_eq!(table.shutdown(), 2);
        assert!(table.is_empty());
        assert_eq!(a.state(), SessionState::TornDown);
    }

    #[test]
    fn interleaved_without_connection_cannot_play() {
        let table = table();
        let session = table
            .create(
                "rtsp://h/",
                Transport::Interleaved {
                    rtp_channel: 0,
                    rtcp_channel: 1,
                },
                "127.0.0.1:40000".parse().unwrap(),
                None,
            )
            .unwrap();
        assert!(table.transition(&session.id, SessionEvent::Play).is_err());
        assert_eq!(session.state(), SessionState::Ready);
    }
}
