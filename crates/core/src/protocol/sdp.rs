//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=/mjpeg/1                                   ← session name
//! c=IN IP4 <addr>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! a=tool:mjpeg-rtsp                            ← server software (§6)
//! a=sendonly                                   ← direction (§6)
//! m=video 0 RTP/AVP 26                         ← static JPEG payload type
//! a=rtpmap:26 JPEG/90000                       ← codec/clock rate
//! a=control:track1                             ← track control URL
//! ```

use std::net::IpAddr;

use crate::media::MjpegPacketizer;
use crate::uri::UriDescriptor;

/// SDP origin fields (`o=<username> <session-id> <session-version> ...`).
#[derive(Debug, Clone)]
pub struct SdpOrigin<'a> {
    pub username: &'a str,
    pub session_id: &'a str,
    pub session_version: &'a str,
}

/// Generate the session description for the stream named by `uri`.
///
/// `host` fills the origin and connection lines; IPv6 literals are tagged
/// `IP6`, anything else (IPv4 or a hostname) `IP4`.
pub fn generate_sdp(
    uri: &UriDescriptor,
    host: &str,
    origin: &SdpOrigin<'_>,
    packetizer: &MjpegPacketizer,
) -> String {
    let addr_type = match host.trim_matches(['[', ']']).parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "IP6",
        _ => "IP4",
    };
    let host = host.trim_matches(['[', ']']);

    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!(
        "o={} {} {} IN {} {}",
        origin.username, origin.session_id, origin.session_version, addr_type, host
    ));
    sdp.push(format!("s={}", uri.path()));
    sdp.push(format!("c=IN {} {}", addr_type, host));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:mjpeg-rtsp".to_string());
    sdp.push("a=sendonly".to_string());
    sdp.push(format!("m=video 0 RTP/AVP {}", packetizer.payload_type()));
    sdp.extend(packetizer.sdp_attributes());

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
