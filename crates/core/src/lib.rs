//! MJPEG streaming over RTSP/RTP.
//!
//! A small RTSP server (RFC 2326) that serves one MJPEG stream, packetized
//! per RFC 2435 and delivered over RTP (RFC 3550) either as UDP datagrams or
//! interleaved on the control connection. Frames come from a
//! [`CameraDriver`] or a canned sequence.
//!
//! ```no_run
//! use mjpeg_rtsp::{FrameSource, Server};
//!
//! let mut server = Server::new("0.0.0.0:8554", FrameSource::test_pattern(320, 240));
//! server.start()?;
//! println!("{}", server.stream_url()?);
//! # Ok::<(), mjpeg_rtsp::RtspError>(())
//! ```

pub mod clock;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod uri;

pub use error::{Result, RtspError};
pub use media::{CameraDriver, FrameSource};
pub use server::{Server, ServerConfig};
pub use uri::UriDescriptor;
