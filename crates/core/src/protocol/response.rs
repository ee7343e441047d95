use std::fmt::Write as _;

use crate::error::RtspError;

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format with headers in a fixed order:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// <method-specific headers, in insertion order>\r\n
/// Content-Length: 142\r\n          (only with a body)
/// Session: 0000000000000001\r\n    (only when set)
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header),
/// [`with_session`](Self::with_session) and [`with_body`](Self::with_body),
/// then call [`serialize`](Self::serialize).
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub cseq: Option<u32>,
    pub headers: Vec<(String, String)>,
    pub session: Option<String>,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            cseq: None,
            headers: Vec::new(),
            session: None,
            body: None,
        }
    }

    /// 200 OK (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request: the request could not be parsed.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 454 Session Not Found (RFC 2326 §11.3.3).
    pub fn session_not_found() -> Self {
        Self::new(454, "Session Not Found")
    }

    /// 461 Unsupported Transport (RFC 2326 §11.3.11).
    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    /// 501 Not Implemented.
    pub fn not_implemented() -> Self {
        Self::new(501, "Not Implemented")
    }

    /// Response carrying the status an error maps to.
    pub fn from_error(err: &RtspError) -> Self {
        let (code, reason) = err.status();
        Self::new(code, reason)
    }

    pub fn with_cseq(mut self, cseq: u32) -> Self {
        self.cseq = Some(cseq);
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the `Session` header, always written after the other headers.
    pub fn with_session(mut self, value: &str) -> Self {
        self.session = Some(value.to_string());
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is computed from its byte
    /// length (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        if let Some(cseq) = self.cseq {
            let _ = write!(response, "CSeq: {}\r\n", cseq);
        }

        for (name, value) in &self.headers {
            let _ = write!(response, "{}: {}\r\n", name, value);
        }

        if let Some(body) = &self.body {
            let _ = write!(response, "Content-Length: {}\r\n", body.len());
        }

        if let Some(session) = &self.session {
            let _ = write!(response, "Session: {}\r\n", session);
        }

        response.push_str("\r\n");
        if let Some(body) = &self.body {
            response.push_str(body);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_options_byte_exact() {
        let resp = RtspResponse::ok()
            .with_cseq(2)
            .add_header("Public", "OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE");
        assert_eq!(
            resp.serialize(),
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nPublic: OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE\r\n\r\n"
        );
    }

    #[test]
    fn session_header_comes_last() {
        let resp = RtspResponse::ok()
            .with_session("ABC")
            .add_header("Transport", "RTP/AVP;unicast;client_port=6000-6001")
            .with_cseq(3);
        assert_eq!(
            resp.serialize(),
            "RTSP/1.0 200 OK\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\nSession: ABC\r\n\r\n"
        );
    }

    #[test]
    fn content_length_counts_bytes() {
        let body = "s=Caméra\r\n".to_string();
        let resp = RtspResponse::ok().with_cseq(2).with_body(body.clone());
        let s = resp.serialize();
        assert!(s.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert_eq!(body.len(), 11);
        let (_, sent_body) = s.split_once("\r\n\r\n").unwrap();
        assert_eq!(sent_body.len(), body.len());
    }

    #[test]
    fn error_response_uses_mapped_status() {
        let resp = RtspResponse::from_error(&RtspError::SessionNotFound("1".into())).with_cseq(5);
        assert!(resp.serialize().starts_with("RTSP/1.0 454 Session Not Found\r\nCSeq: 5\r\n"));
    }
}
