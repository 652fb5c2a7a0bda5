use crate::error::{ParseErrorKind, RtspError};

/// Largest request head accepted before the connection is considered garbage.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Largest `Content-Length` accepted. Nothing this server handles needs a body.
pub const MAX_BODY_LEN: usize = 64 * 1024;

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
/// Header lookup is case-insensitive per RFC 2326 §4.2. A body announced by
/// `Content-Length` is consumed by [`take_message`] and not kept.
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/mjpeg/1/track1`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    /// Parse an RTSP request head from its text representation.
    ///
    /// Accepts CRLF or bare LF line endings. Returns [`RtspError::Parse`] on
    /// malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let parse_error = |kind| RtspError::Parse { kind };
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or(parse_error(ParseErrorKind::EmptyRequest))?;

        let mut fields = request_line.split_ascii_whitespace();
        let (Some(method), Some(uri), Some(version), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(parse_error(ParseErrorKind::InvalidRequestLine));
        };

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let headers = lines
            .take_while(|line| !line.is_empty())
            .map(|line| {
                line.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .ok_or(parse_error(ParseErrorKind::InvalidHeader))
            })
            .collect::<crate::error::Result<Vec<_>>>()?;

        Ok(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `CSeq`, echoed in the response (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Declared body length, 0 when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.get_header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// One complete unit read from an RTSP control connection.
#[derive(Debug)]
pub enum Inbound {
    /// A request head (body already consumed), or why it could not be parsed.
    Request(crate::error::Result<RtspRequest>),
    /// A `$`-framed interleaved packet from the client, already discarded.
    Interleaved { channel: u8, len: usize },
}

/// Pop the next complete message off the front of `buf`.
///
/// Returns `None` when more bytes are needed. Blank lines between messages
/// are skipped. A head that grows past [`MAX_HEAD_LEN`] without terminating,
/// or one announcing more than [`MAX_BODY_LEN`] of body, empties the buffer
/// and is reported as a parse error.
pub fn take_message(buf: &mut Vec<u8>) -> Option<Inbound> {
    let skip = buf
        .iter()
        .take_while(|&&b| b == b'\r' || b == b'\n')
        .count();
    buf.drain(..skip);

    match *buf.first()? {
        b'$' => {
            let header = buf.get(..4)?;
            let channel = header[1];
            let len = u16::from_be_bytes([header[2], header[3]]) as usize;
            if buf.len() < 4 + len {
                return None;
            }
            buf.drain(..4 + len);
            Some(Inbound::Interleaved { channel, len })
        }
        _ => {
            let Some((head_len, sep_len)) = find_head_end(buf) else {
                if buf.len() > MAX_HEAD_LEN {
                    buf.clear();
                    return Some(Inbound::Request(Err(RtspError::Parse {
                        kind: ParseErrorKind::HeadTooLarge,
                    })));
                }
                return None;
            };

            let request = match std::str::from_utf8(&buf[..head_len]) {
                Ok(text) => RtspRequest::parse(text),
                Err(_) => Err(RtspError::Parse {
                    kind: ParseErrorKind::InvalidEncoding,
                }),
            };

            let body_len = request.as_ref().map_or(0, RtspRequest::content_length);
            if body_len > MAX_BODY_LEN {
                buf.clear();
                return Some(Inbound::Request(Err(RtspError::Parse {
                    kind: ParseErrorKind::BodyTooLarge,
                })));
            }
            let total = head_len + sep_len + body_len;
            if buf.len() < total {
                return None;
            }
            buf.drain(..total);
            Some(Inbound::Request(request))
        }
    }
}

/// Position of the blank line ending the head, and the separator's length.
///
/// Only the first [`MAX_HEAD_LEN`] bytes are searched.
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let buf = &buf[..buf.len().min(MAX_HEAD_LEN + 4)];
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
