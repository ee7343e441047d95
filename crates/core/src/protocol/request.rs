use std::fmt;
use std::io::{BufRead, Read};

use crate::error::{ParseErrorKind, Result, RtspError};

/// Upper bound on the request line plus headers, in bytes.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Upper bound on a request body (`Content-Length`), in bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// RTSP request method (RFC 2326 §10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    /// A syntactically valid method this server does not implement.
    Other(String),
}

impl Method {
    fn from_token(token: &str) -> Option<Self> {
        let valid = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if !valid {
            return None;
        }

        Some(match token {
            "OPTIONS" => Self::Options,
            "DESCRIBE" => Self::Describe,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "TEARDOWN" => Self::Teardown,
            other => Self::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header names are matched exactly as sent (`CSeq`, not `cseq`); names and
/// values are trimmed of surrounding whitespace.
#[derive(Debug)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:554/stream/track1`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Message body, read according to `Content-Length`.
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Parse the request line and headers of an RTSP request.
    ///
    /// `raw` is the text up to and including the terminating blank line.
    /// Anything after the blank line is ignored; bodies are attached by
    /// [`RequestReader`]. Returns [`RtspError::MalformedRequest`] on
    /// malformed input.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines().skip_while(|line| line.trim().is_empty());

        let request_line = lines
            .next()
            .ok_or(RtspError::malformed(ParseErrorKind::EmptyRequest))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RtspError::malformed(ParseErrorKind::InvalidRequestLine));
        }

        let method = Method::from_token(parts[0])
            .ok_or(RtspError::malformed(ParseErrorKind::InvalidRequestLine))?;
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or(RtspError::malformed(ParseErrorKind::InvalidHeader))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body: Vec::new(),
        })
    }

    /// Look up a header value by exact name.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Numeric CSeq (RFC 2326 §12.17). A missing or non-numeric header
    /// yields `None`.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq")?.parse().ok()
    }

    /// Session ID from the `Session` header, without the `;timeout=` suffix.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn content_length(&self) -> Result<usize> {
        match self.get_header("Content-Length") {
            Some(value) => value
                .parse()
                .map_err(|_| RtspError::malformed(ParseErrorKind::InvalidContentLength)),
            None => Ok(0),
        }
    }
}

/// Reads complete RTSP requests from a byte stream.
///
/// Handles the framing concerns of the control connection: blank lines
/// between requests, `$`-prefixed interleaved binary frames a client may
/// send (RFC 2326 §10.12), and `Content-Length` bodies.
pub struct RequestReader<R> {
    inner: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next request.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between requests and
    /// [`ParseErrorKind::Incomplete`] when it ends inside one.
    pub fn next_request(&mut self) -> Result<Option<RtspRequest>> {
        let mut head: Vec<u8> = Vec::new();

        loop {
            if head.is_empty() && self.skip_interleaved_frame()? {
                continue;
            }

            // One byte past the budget distinguishes "too long" from "fits".
            let remaining = MAX_HEADER_BYTES.saturating_sub(head.len());
            let mut line = Vec::new();
            let read = (&mut self.inner)
                .take(remaining as u64 + 1)
                .read_until(b'\n', &mut line)?;

            if read == 0 {
                return if is_blank(&head) {
                    Ok(None)
                } else {
                    Err(RtspError::malformed(ParseErrorKind::Incomplete))
                };
            }
            if head.len() + line.len() > MAX_HEADER_BYTES {
                return Err(RtspError::malformed(ParseErrorKind::TooLarge));
            }
            if !line.ends_with(b"\n") {
                return Err(RtspError::malformed(ParseErrorKind::Incomplete));
            }

            if is_blank(&line) {
                if head.is_empty() {
                    continue;
                }
                head.extend_from_slice(&line);
                break;
            }
            head.extend_from_slice(&line);
        }

        let head = String::from_utf8(head)
            .map_err(|_| RtspError::malformed(ParseErrorKind::InvalidEncoding))?;
        let mut request = RtspRequest::parse(&head)?;

        let length = request.content_length()?;
        if length > MAX_BODY_BYTES {
            return Err(RtspError::malformed(ParseErrorKind::TooLarge));
        }
        if length > 0 {
            let mut body = vec![0u8; length];
            self.inner.read_exact(&mut body).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    RtspError::malformed(ParseErrorKind::Incomplete)
                } else {
                    RtspError::Io(e)
                }
            })?;
            request.body = body;
        }

        Ok(Some(request))
    }

    /// Discard one `$ <channel> <len:u16> <data>` frame if the stream is
    /// positioned at one. Returns whether a frame was skipped.
    fn skip_interleaved_frame(&mut self) -> Result<bool> {
        let starts_with_dollar = matches!(self.inner.fill_buf()?.first(), Some(b'$'));
        if !starts_with_dollar {
            return Ok(false);
        }

        let mut header = [0u8; 4];
        self.inner.read_exact(&mut header)?;
        let channel = header[1];
        let len = u16::from_be_bytes([header[2], header[3]]) as u64;

        let skipped = std::io::copy(&mut (&mut self.inner).take(len), &mut std::io::sink())?;
        tracing::trace!(channel, len = skipped, "skipped interleaved frame from client");
        Ok(true)
    }
}
