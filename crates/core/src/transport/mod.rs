//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! - **TCP** ([`tcp`]): the accept loop and one worker thread per control
//!   connection. In interleaved mode (RFC 2326 §10.12) RTP packets share the
//!   control connection using `$` framing.
//!
//! - **UDP** ([`udp`]): a per-session RTP/RTCP socket pair, bound at SETUP
//!   and closed with the session.

pub mod tcp;
pub mod udp;

pub use tcp::write_interleaved;
pub use udp::UdpPair;
