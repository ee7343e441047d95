use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::{MediaSource, StreamConfig};
use crate::session::{SessionTable, Transport};
use crate::transport::tcp;

/// Server-level configuration used by protocol handlers and streaming
/// threads.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host advertised in SDP `o=` and `c=` lines.
    /// When `None`, the local address of the control connection is used.
    pub public_host: Option<String>,
    /// Port advertised in the SDP `m=` line.
    pub media_port: u16,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP origin session id field (`o=... <session-id> ...`).
    pub sdp_session_id: String,
    /// SDP origin session version field (`o=... ... <session-version> ...`).
    pub sdp_session_version: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// Frame and RTCP pacing of streaming threads.
    pub stream: StreamConfig,
    /// Close control connections that stay silent this long, tearing down
    /// their sessions. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Longest a write to a control connection may block. A client that
    /// stops reading interleaved media fails its stream after this long.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            media_port: 5004,
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
            sdp_session_name: "Stream".to_string(),
            stream: StreamConfig::default(),
            idle_timeout: None,
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the session table and the listener thread. Control connections are
/// handled by [`tcp::accept_loop`]; media is delivered by per-session
/// streaming threads started from PLAY.
pub struct Server {
    sessions: SessionTable,
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str, media: Arc<dyn MediaSource>) -> Self {
        Self::with_config(bind_addr, media, ServerConfig::default())
    }

    /// Create a server with custom protocol/SDP configuration.
    pub fn with_config(bind_addr: &str, media: Arc<dyn MediaSource>, config: ServerConfig) -> Self {
        Self {
            sessions: SessionTable::new(media, config.stream.clone()),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            accept_thread: None,
            config: Arc::new(config),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        self.running.store(true, Ordering::SeqCst);
        self.local_addr = Some(local_addr);

        let running = self.running.clone();
        let sessions = self.sessions.clone();
        let config = self.config.clone();

        tracing::info!(addr = %local_addr, "RTSP server listening");

        let accept_thread = thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || tcp::accept_loop(listener, sessions, config, running));
        match accept_thread {
            Ok(handle) => self.accept_thread = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }

        Ok(())
    }

    /// Stop accepting connections and tear down every session.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("server stopping");

        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let removed = self.sessions.shutdown();
        tracing::info!(removed, "server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// Sessions currently in the `Playing` state.
    pub fn viewers(&self) -> Vec<Viewer> {
        self.sessions
            .playing_sessions()
            .into_iter()
            .map(|session| Viewer {
                session_id: session.id.clone(),
                uri: session.uri.clone(),
                client_addr: session.client_addr,
                transport: session.transport,
            })
            .collect()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Returns the server's protocol configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Information about a connected viewer (client in PLAY state).
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session_id: String,
    pub uri: String,
    pub client_addr: SocketAddr,
    pub transport: Transport,
}
