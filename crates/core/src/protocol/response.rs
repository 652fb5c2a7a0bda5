use std::fmt::Write as _;

/// An RTSP response (RFC 2326 §7), built by chaining
/// [`add_header`](Self::add_header) and [`with_body`](Self::with_body).
///
/// Every response starts with a `Server` header. `Content-Length` is added
/// by [`serialize`](Self::serialize) when there is a body.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// `Server` header value (RFC 2326 §12.36).
pub const SERVER_AGENT: &str = "mjpeg-rtsp/0.1";

/// Methods this server implements, for `Public` and `Allow`.
pub const SUPPORTED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            headers: vec![("Server".into(), SERVER_AGENT.into())],
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// Unparsable request, or SETUP without a `Transport` header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// The request URI does not name this server's stream.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// Unknown method. Carries `Allow` (RFC 2326 §11.3.3).
    pub fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed").add_header("Allow", SUPPORTED_METHODS)
    }

    /// The `Session` header names some other session.
    pub fn session_not_found() -> Self {
        Self::new(454, "Session Not Found")
    }

    /// RFC 2326 §11.3.6, e.g. PLAY before SETUP.
    pub fn method_not_valid_in_state() -> Self {
        Self::new(455, "Method Not Valid in This State")
    }

    /// Multicast, or no transport alternative we can serve.
    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    /// Every worker slot is taken.
    pub fn service_unavailable() -> Self {
        Self::new(503, "Service Unavailable")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Render the status line, headers and optional body.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(128 + self.body.as_ref().map_or(0, String::len));
        let _ = write!(out, "RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);
        for (name, value) in &self.headers {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        match &self.body {
            Some(body) => {
                let _ = write!(out, "Content-Length: {}\r\n\r\n{body}", body.len());
            }
            None => out.push_str("\r\n"),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_in_order_without_body() {
        let wire = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Public", SUPPORTED_METHODS)
            .serialize();
        assert_eq!(
            wire,
            format!(
                "RTSP/1.0 200 OK\r\nServer: {SERVER_AGENT}\r\nCSeq: 1\r\nPublic: {SUPPORTED_METHODS}\r\n\r\n"
            )
        );
    }

    #[test]
    fn body_gets_content_length() {
        let wire = RtspResponse::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n".to_string())
            .serialize();
        assert!(wire.ends_with("CSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let resp = RtspResponse::method_not_allowed().add_header("CSeq", "3");
        assert_eq!(resp.status_code, 405);
        assert_eq!(resp.get_header("allow"), Some(SUPPORTED_METHODS));
    }

    #[test]
    fn error_status_lines() {
        let cases = [
            (RtspResponse::not_found(), "RTSP/1.0 404 Not Found\r\n"),
            (RtspResponse::session_not_found(), "RTSP/1.0 454 Session Not Found\r\n"),
            (
                RtspResponse::method_not_valid_in_state(),
                "RTSP/1.0 455 Method Not Valid in This State\r\n",
            ),
            (RtspResponse::unsupported_transport(), "RTSP/1.0 461 Unsupported Transport\r\n"),
            (RtspResponse::service_unavailable(), "RTSP/1.0 503 Service Unavailable\r\n"),
        ];
        for (resp, line) in cases {
            assert!(resp.serialize().starts_with(line));
        }
    }
}
