//! RTSP session state (RFC 2326 §3, §12.37).
//!
//! Each control connection owns exactly one [`Session`]. It tracks:
//!
//! - The session ID (16 hex digits, assigned at SETUP, returned in the
//!   `Session` header).
//! - The playback state.
//! - The [`TransportSession`] negotiated by SETUP, which carries the RTP
//!   sequence/timestamp state.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! Init     --SETUP-->    Ready
//! Ready    --PLAY-->     Playing
//! Playing  --PAUSE-->    Ready
//! any      --TEARDOWN--> Teardown   (terminal; transport released)
//! ```

pub mod transport;

use crate::error::{Result, RtspError};
pub use transport::{TransportHeader, TransportSession};

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// RTSP session state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no transport yet.
    Init,
    /// Transport negotiated, not streaming.
    Ready,
    /// RTP packets are being delivered.
    Playing,
    /// Torn down; the connection is closing.
    Teardown,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Playing => "PLAYING",
            Self::Teardown => "TEARDOWN",
        }
    }
}

/// The session belonging to one control connection.
#[derive(Debug)]
pub struct Session {
    id: Option<String>,
    state: SessionState,
    transport: Option<TransportSession>,
    /// Session timeout in seconds (included in the `Session` response header).
    pub timeout_secs: u64,
}

impl Session {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            id: None,
            state: SessionState::Init,
            transport: None,
            timeout_secs,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attach the negotiated transport: INIT → READY.
    ///
    /// Returns the freshly assigned session id.
    pub fn setup(&mut self, transport: TransportSession) -> Result<&str> {
        if self.state != SessionState::Init {
            return Err(self.violation("SETUP"));
        }
        self.transport = Some(transport);
        self.id = Some(format!("{:016X}", rand::random::<u64>()));
        self.transition(SessionState::Ready);
        Ok(self.id.as_deref().unwrap_or_default())
    }

    /// READY/PLAYING → PLAYING.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Playing => {
                self.transition(SessionState::Playing);
                Ok(())
            }
            _ => Err(self.violation("PLAY")),
        }
    }

    /// PLAYING/READY → READY.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Playing => {
                self.transition(SessionState::Ready);
                Ok(())
            }
            _ => Err(self.violation("PAUSE")),
        }
    }

    /// Any state → TEARDOWN, releasing the transport.
    ///
    /// Returns `false` if the session was already torn down.
    pub fn teardown(&mut self) -> bool {
        if self.state == SessionState::Teardown {
            return false;
        }
        self.transport = None;
        self.transition(SessionState::Teardown);
        true
    }

    /// Whether a client-supplied session id names this session.
    pub fn matches(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id)
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Teardown
    }

    pub fn transport(&self) -> Option<&TransportSession> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut TransportSession> {
        self.transport.as_mut()
    }

    /// Format the `Session` response header value per RFC 2326 §12.37.
    ///
    /// Example: `"3F2A9C0D11E4B870;timeout=60"`
    pub fn header_value(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{};timeout={}", id, self.timeout_secs))
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            session_id = self.id.as_deref().unwrap_or("-"),
            old_state = self.state.as_str(),
            new_state = next.as_str(),
            "state transition"
        );
        self.state = next;
    }

    fn violation(&self, method: &'static str) -> RtspError {
        RtspError::ProtocolViolation {
            method,
            state: self.state.as_str(),
        }
    }
}
