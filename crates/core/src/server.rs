use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::MonotonicClock;
use crate::error::{Result, RtspError};
use crate::media::MjpegPacketizer;
use crate::media::mjpeg::{DEFAULT_MTU, DEFAULT_STATIC_QUALITY};
use crate::media::source::FrameSource;
use crate::session::DEFAULT_SESSION_TIMEOUT_SECS;
use crate::transport::tcp;
use crate::uri::UriDescriptor;

/// Default RTSP listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8554";

/// Server-level configuration, read-only once the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The one stream this server offers, and the host advertised for it.
    pub uri: UriDescriptor,
    /// Frames per second delivered to each playing session.
    pub frame_rate: u32,
    /// Upper bound on a single RTP packet, header included.
    pub max_packet_size: usize,
    /// RFC 2435 Q value advertised for frames without their own tables.
    pub static_quality: u8,
    /// Timeout advertised in the `Session` header.
    pub session_timeout_secs: u64,
    /// Concurrent connections served before new ones get 503.
    pub max_clients: usize,
    /// How long a worker waits on its control socket per loop.
    pub request_poll_timeout: Duration,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP origin session id field (`o=... <session-id> ...`).
    pub sdp_session_id: String,
    /// SDP origin session version field (`o=... ... <session-version> ...`).
    pub sdp_session_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri: UriDescriptor::default(),
            frame_rate: 10,
            max_packet_size: DEFAULT_MTU,
            static_quality: DEFAULT_STATIC_QUALITY,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            max_clients: 4,
            request_poll_timeout: Duration::from_millis(10),
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
        }
    }
}

impl ServerConfig {
    /// Milliseconds between frames; a zero frame rate counts as 1 fps.
    pub fn frame_interval_ms(&self) -> u32 {
        1000 / self.frame_rate.clamp(1, 1000)
    }

    /// The packetizer every session uses.
    pub fn packetizer(&self) -> MjpegPacketizer {
        MjpegPacketizer::new(self.max_packet_size).with_static_quality(self.static_quality)
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the listener thread and the configuration shared with every
/// connection. Each accepted client gets its own worker thread, session and
/// frame cursor; see [`transport::tcp`](crate::transport::tcp).
pub struct Server {
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    config: Arc<ServerConfig>,
    source: FrameSource,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(bind_addr: &str, source: FrameSource) -> Self {
        Self::with_config(bind_addr, ServerConfig::default(), source)
    }

    /// Create a server with custom stream/protocol configuration.
    pub fn with_config(bind_addr: &str, config: ServerConfig, source: FrameSource) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            config: Arc::new(config),
            source,
            accept_thread: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let config = self.config.clone();
        let source = self.source.clone();
        let clock = MonotonicClock::new();

        tracing::info!(
            addr = %local_addr,
            path = %self.config.uri.path(),
            fps = self.config.frame_rate,
            "RTSP server listening"
        );

        self.accept_thread = Some(thread::spawn(move || {
            tcp::accept_loop(listener, config, source, running, clock);
        }));

        Ok(())
    }

    /// Stop accepting and signal every worker to wind down.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("server stopping");
        if let Some(handle) = self.accept_thread.take()
            && handle.join().is_err()
        {
            tracing::warn!("accept thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to. Useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// The stream's `rtsp://` URL as clients should use it.
    ///
    /// Uses the configured host when set; a wildcard bind address is shown as
    /// loopback.
    pub fn stream_url(&self) -> Result<String> {
        let addr = self.local_addr()?;
        let ip = if addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            addr.ip()
        };
        Ok(self.config.uri.url(&ip.to_string(), addr.port()))
    }

    /// Returns the server's configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
