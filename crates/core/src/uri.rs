//! The stream's RTSP URL: `rtsp://<host>[:port]/<presentation>/<stream>`.

pub const DEFAULT_PRESENTATION: &str = "mjpeg";
pub const DEFAULT_STREAM: &str = "1";

/// Names the single stream this server offers.
///
/// Configured once at startup and read-only afterwards. Used to validate
/// request URIs and to build the SDP and `Content-Base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriDescriptor {
    /// Host advertised to clients. When `None`, the address the client
    /// connected to is used.
    pub host: Option<String>,
    pub presentation: String,
    pub stream: String,
}

impl UriDescriptor {
    pub fn new(presentation: &str, stream: &str) -> Self {
        Self {
            host: None,
            presentation: presentation.trim_matches('/').to_string(),
            stream: stream.trim_matches('/').to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// `/<presentation>/<stream>`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.presentation, self.stream)
    }

    /// Whether a request URI addresses this stream.
    ///
    /// Accepts absolute `rtsp://` URIs and bare paths, with or without a
    /// trailing slash or a `/track…` control suffix.
    pub fn matches(&self, uri: &str) -> bool {
        let Some(path) = extract_path(uri) else {
            return false;
        };
        let path = path.trim_end_matches('/');
        let path = match path.rfind("/track") {
            Some(pos) => &path[..pos],
            None => path,
        };
        path == self.path()
    }

    /// Host to advertise: the configured one, else `fallback`.
    pub fn host_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.host.as_deref().unwrap_or(fallback)
    }

    /// Full stream URL on `port`.
    pub fn url(&self, fallback_host: &str, port: u16) -> String {
        let host = self.host_or(fallback_host);
        if host.contains(':') && !host.starts_with('[') {
            format!("rtsp://[{}]:{}{}", host, port, self.path())
        } else {
            format!("rtsp://{}:{}{}", host, port, self.path())
        }
    }
}

impl Default for UriDescriptor {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENTATION, DEFAULT_STREAM)
    }
}

/// Path component of an RTSP request URI.
///
/// `rtsp://host:8554/mjpeg/1/track1` → `/mjpeg/1/track1`
/// `rtsp://host:8554`                → `/`
/// `/mjpeg/1`                        → `/mjpeg/1`
/// `*`                               → `None`
pub fn extract_path(uri: &str) -> Option<&str> {
    if let Some(after) = uri
        .strip_prefix("rtsp://")
        .or_else(|| uri.strip_prefix("rtsps://"))
    {
        Some(match after.find('/') {
            Some(slash) => &after[slash..],
            None => "/",
        })
    } else if uri.starts_with('/') {
        Some(uri)
    } else {
        None
    }
}
