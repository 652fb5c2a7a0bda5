//! RTSP signaling (RFC 2326).
//!
//! Requests arrive on the control connection as HTTP-like text heads,
//! possibly mixed with `$`-framed RTCP from clients using interleaved
//! transport. [`take_message`] splits the byte stream, [`RtspRequest`]
//! parses a head, [`MethodHandler`] applies it to the connection's session
//! and [`RtspResponse`] renders the answer.
//!
//! ```text
//! client                          server
//!   OPTIONS  ───────────────────▶  200 Public: ...
//!   DESCRIBE ───────────────────▶  200 application/sdp (m=video 0 RTP/AVP 26)
//!   SETUP    Transport: ... ────▶  200 Transport: ...;ssrc=  Session: id;timeout=60
//!   PLAY     Session: id ───────▶  200 Range, RTP-Info    ──▶ RTP/JPEG packets
//!   PAUSE    Session: id ───────▶  200                    (packets stop)
//!   TEARDOWN Session: id ───────▶  200                    (connection closes)
//! ```
//!
//! GET_PARAMETER is accepted as a keepalive. Any other method gets
//! `405 Method Not Allowed`.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::{Inbound, RtspRequest, take_message};
pub use response::RtspResponse;
