use std::net::SocketAddr;
use std::sync::Arc;

use super::request::{Method, RtspRequest};
use super::response::RtspResponse;
use super::sdp;
use crate::error::RtspError;
use crate::server::ServerConfig;
use crate::session::{SessionEvent, SessionTable, Transport};
use crate::transport::InterleavedWriter;

/// Methods advertised in the OPTIONS `Public` header.
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE";

/// Per-connection protocol state.
///
/// Replaces connection-wide globals: the CSeq counter, the addresses of
/// both ends, and the sessions this connection created.
#[derive(Debug)]
pub struct ConnectionContext {
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    cseq: u32,
    session_ids: Vec<String>,
}

impl ConnectionContext {
    pub fn new(peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            local_addr,
            cseq: 0,
            session_ids: Vec::new(),
        }
    }

    /// CSeq for the next response: the request's CSeq + 1, or the previous
    /// response's CSeq + 1 when the request carries none.
    pub fn next_cseq(&mut self, request_cseq: Option<u32>) -> u32 {
        let base = request_cseq.unwrap_or(self.cseq);
        self.cseq = base.wrapping_add(1);
        self.cseq
    }

    /// CSeq of the last response produced on this connection.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Sessions created on this connection that are still live.
    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }
}

/// Handles RTSP method requests for a single control connection.
///
/// Interprets each request against the session table and produces the
/// response; PLAY, PAUSE and TEARDOWN start or stop streaming as a side
/// effect of the session transition.
pub struct MethodHandler {
    sessions: SessionTable,
    config: Arc<ServerConfig>,
    context: ConnectionContext,
    /// Write half of the control connection, for `RTP/AVP/TCP` sessions.
    writer: Option<InterleavedWriter>,
}

impl MethodHandler {
    pub fn new(
        sessions: SessionTable,
        config: Arc<ServerConfig>,
        context: ConnectionContext,
        writer: Option<InterleavedWriter>,
    ) -> Self {
        MethodHandler {
            sessions,
            config,
            context,
            writer,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = self.context.next_cseq(request.cseq());

        let response = match &request.method {
            Method::Options => self.handle_options(),
            Method::Describe => self.handle_describe(request),
            Method::Setup => self.handle_setup(request),
            Method::Play => self.handle_play(request),
            Method::Pause => self.handle_pause(request),
            Method::Teardown => self.handle_teardown(request),
            Method::Other(method) => {
                tracing::warn!(%method, cseq, "unsupported RTSP method");
                RtspResponse::not_implemented()
            }
        };

        response.with_cseq(cseq)
    }

    /// Response sent just before closing a connection that sent garbage.
    pub fn reject_malformed(&mut self) -> RtspResponse {
        let cseq = self.context.next_cseq(None);
        RtspResponse::bad_request().with_cseq(cseq)
    }

    /// Tear down every session this connection still owns. Also runs on
    /// drop, so a connection thread that unwinds still releases them.
    pub fn close(&mut self) -> usize {
        let ids = std::mem::take(&mut self.context.session_ids);
        self.sessions.teardown_all(&ids)
    }

    fn handle_options(&self) -> RtspResponse {
        RtspResponse::ok().add_header("Public", PUBLIC_METHODS)
    }

    fn handle_describe(&self, request: &RtspRequest) -> RtspResponse {
        let host = self
            .config
            .public_host
            .clone()
            .unwrap_or_else(|| self.context.local_addr.ip().to_string());
        let body = sdp::generate_sdp(&self.sessions.media().format(), &host, &self.config);

        let content_base = if request.uri.ends_with('/') {
            request.uri.clone()
        } else {
            format!("{}/", request.uri)
        };

        RtspResponse::ok()
            .add_header("Content-Base", &content_base)
            .add_header("Content-Type", "application/sdp")
            .with_body(body)
    }

    fn handle_setup(&mut self, request: &RtspRequest) -> RtspResponse {
        let Some(header) = request.get_header("Transport") else {
            tracing::warn!(uri = %request.uri, "SETUP missing Transport header");
            return RtspResponse::unsupported_transport();
        };

        let transport = match Transport::parse(header) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, "SETUP rejected");
                return RtspResponse::from_error(&e);
            }
        };

        let interleaved = match (transport.is_interleaved(), &self.writer) {
            (false, _) => None,
            (true, Some(writer)) => Some(writer.clone()),
            (true, None) => {
                tracing::warn!(%transport, "interleaved transport without a control stream");
                return RtspResponse::unsupported_transport();
            }
        };

        let session = match self.sessions.create(
            &request.uri,
            transport,
            self.context.peer_addr,
            interleaved,
        ) {
            Ok(session) => session,
            Err(e) => return self.reject("SETUP", "-", e),
        };
        self.context.session_ids.push(session.id.clone());

        tracing::info!(
            session_id = %session.id,
            uri = %request.uri,
            client = %self.context.peer_addr,
            %transport,
            "session created via SETUP"
        );

        RtspResponse::ok()
            .add_header("Transport", &transport.to_string())
            .with_session(&self.session_header(&session.id))
    }

    fn handle_play(&mut self, request: &RtspRequest) -> RtspResponse {
        let Some(id) = self.resolve_session(request) else {
            tracing::warn!("PLAY without a session");
            return RtspResponse::session_not_found();
        };

        match self.sessions.transition(&id, SessionEvent::Play) {
            Ok(_) => {
                tracing::info!(session_id = %id, "session playing");
                RtspResponse::ok()
                    .add_header("Range", "npt=0.000-")
                    .with_session(&self.session_header(&id))
            }
            Err(e) => self.reject("PLAY", &id, e),
        }
    }

    fn handle_pause(&mut self, request: &RtspRequest) -> RtspResponse {
        let Some(id) = self.resolve_session(request) else {
            tracing::warn!("PAUSE without a session");
            return RtspResponse::session_not_found();
        };

        match self.sessions.transition(&id, SessionEvent::Pause) {
            Ok(_) => {
                tracing::info!(session_id = %id, "session paused");
                RtspResponse::ok().with_session(&self.session_header(&id))
            }
            Err(e) => self.reject("PAUSE", &id, e),
        }
    }

    fn handle_teardown(&mut self, request: &RtspRequest) -> RtspResponse {
        let Some(id) = self.resolve_session(request) else {
            tracing::warn!("TEARDOWN without a session");
            return RtspResponse::session_not_found();
        };

        match self.sessions.transition(&id, SessionEvent::Teardown) {
            Ok(_) => {
                self.context.session_ids.retain(|owned| owned != &id);
                tracing::info!(session_id = %id, "session terminated via TEARDOWN");
                RtspResponse::ok().with_session(&id)
            }
            Err(e) => self.reject("TEARDOWN", &id, e),
        }
    }

    /// The request's `Session` header, or else the newest session this
    /// connection created.
    fn resolve_session(&self, request: &RtspRequest) -> Option<String> {
        request
            .session_id()
            .map(str::to_string)
            .or_else(|| self.context.session_ids.last().cloned())
    }

    /// `Session` header value, with `;timeout=` when idle reaping is on
    /// (RFC 2326 §12.37).
    fn session_header(&self, id: &str) -> String {
        match self.config.idle_timeout {
            Some(timeout) => format!("{};timeout={}", id, timeout.as_secs()),
            None => id.to_string(),
        }
    }

    fn reject(&self, method: &str, session_id: &str, error: RtspError) -> RtspResponse {
        let response = RtspResponse::from_error(&error);
        if response.status_code >= 500 {
            tracing::error!(method, session_id, %error, "request failed");
        } else {
            tracing::warn!(method, session_id, %error, "request rejected");
        }
        response
    }
}

impl Drop for MethodHandler {
    fn drop(&mut self) {
        let removed = self.close();
        if removed > 0 {
            tracing::debug!(removed, "sessions torn down with their connection");
        }
    }
}
