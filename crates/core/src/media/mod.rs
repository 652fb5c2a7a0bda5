//! JPEG framing and RTP packetization.
//!
//! A frame travels through this module in three steps:
//!
//! 1. [`source`] hands out a JPEG buffer from the camera or a canned list.
//! 2. [`jpeg`] strips the JFIF container, keeping the quantization tables
//!    and the entropy-coded scan ([`jpeg::JpegDescriptor`]).
//! 3. [`mjpeg`] cuts the scan into RTP packets with RFC 2435 headers, using
//!    the session's [`rtp::RtpHeader`] for sequence numbers and timestamps.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): 90 kHz media clock, identical for all packets of a frame.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |

pub mod jpeg;
pub mod mjpeg;
pub mod pattern;
pub mod rtp;
pub mod source;

pub use jpeg::JpegDescriptor;
pub use mjpeg::MjpegPacketizer;
pub use rtp::RtpHeader;
pub use source::{CameraDriver, Frame, FrameSource, Streamer};
