use std::io::Write;
use std::net::{IpAddr, SocketAddr};

use crate::error::Result;
use crate::media::jpeg::JpegDescriptor;
use crate::media::mjpeg::{MjpegPacketizer, RTP_BUFFER_SIZE};
use crate::media::rtp::{JPEG_PAYLOAD_TYPE, RtpHeader};
use crate::media::source::Frame;
use crate::transport::tcp::write_interleaved;
use crate::transport::udp::UdpPair;

/// Parsed client-side transport request from the RTSP `Transport` header
/// (RFC 2326 §12.39).
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP;unicast;client_port=8000-8001
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// Transport: RTP/AVP/TCP;interleaved=0-1,RTP/AVP;unicast;client_port=8000-8001
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportHeader {
    /// RTP over UDP to the client's ports.
    Udp {
        client_rtp_port: u16,
        client_rtcp_port: u16,
    },
    /// RTP in `$`-frames on the RTSP connection.
    Interleaved { rtp_channel: u8, rtcp_channel: u8 },
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// The header may list alternatives separated by commas; the first one
    /// this server can serve wins. Multicast is never accepted.
    ///
    /// ## Examples
    ///
    /// ```
    /// use mjpeg_rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(
    ///     th,
    ///     TransportHeader::Udp { client_rtp_port: 8000, client_rtcp_port: 8001 }
    /// );
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        header.split(',').find_map(Self::parse_one)
    }

    fn parse_one(alternative: &str) -> Option<Self> {
        let mut params = alternative.split(';').map(str::trim);
        let protocol = params.next()?;
        let params: Vec<&str> = params.collect();

        if params.iter().any(|p| p.eq_ignore_ascii_case("multicast")) {
            return None;
        }
        let value = |key: &str| {
            params
                .iter()
                .copied()
                .find_map(|p| p.strip_prefix(key)?.strip_prefix('='))
        };

        match protocol.to_ascii_uppercase().as_str() {
            "RTP/AVP" | "RTP/AVP/UDP" => {
                let (rtp, rtcp) = parse_pair::<u16>(value("client_port")?)?;
                Some(Self::Udp {
                    client_rtp_port: rtp,
                    client_rtcp_port: rtcp.unwrap_or(rtp.wrapping_add(1)),
                })
            }
            "RTP/AVP/TCP" => {
                let (rtp, rtcp) = match value("interleaved") {
                    Some(channels) => parse_pair::<u8>(channels)?,
                    None => (0, Some(1)),
                };
                Some(Self::Interleaved {
                    rtp_channel: rtp,
                    rtcp_channel: rtcp.unwrap_or(rtp.wrapping_add(1)),
                })
            }
            _ => None,
        }
    }
}

/// `a-b` or `a`.
fn parse_pair<T: std::str::FromStr>(s: &str) -> Option<(T, Option<T>)> {
    match s.split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, Some(b.trim().parse().ok()?))),
        None => Some((s.trim().parse().ok()?, None)),
    }
}

/// Where a session's RTP packets go.
#[derive(Debug)]
pub enum Delivery {
    Udp {
        sockets: UdpPair,
        client_rtp: SocketAddr,
        client_rtcp: SocketAddr,
    },
    Interleaved {
        rtp_channel: u8,
        rtcp_channel: u8,
    },
}

/// Negotiated transport and RTP state for one session.
///
/// Created by SETUP, dropped by TEARDOWN or when the connection goes away,
/// which closes the UDP sockets.
#[derive(Debug)]
pub struct TransportSession {
    delivery: Delivery,
    rtp: RtpHeader,
    packet: Vec<u8>,
}

impl TransportSession {
    /// Build the transport the client asked for, binding server ports for UDP.
    pub fn setup(header: &TransportHeader, client_ip: IpAddr) -> Result<Self> {
        let delivery = match *header {
            TransportHeader::Udp {
                client_rtp_port,
                client_rtcp_port,
            } => Delivery::Udp {
                sockets: UdpPair::bind(client_ip)?,
                client_rtp: SocketAddr::new(client_ip, client_rtp_port),
                client_rtcp: SocketAddr::new(client_ip, client_rtcp_port),
            },
            TransportHeader::Interleaved {
                rtp_channel,
                rtcp_channel,
            } => Delivery::Interleaved {
                rtp_channel,
                rtcp_channel,
            },
        };
        Ok(Self {
            delivery,
            rtp: RtpHeader::random(JPEG_PAYLOAD_TYPE),
            packet: Vec::with_capacity(RTP_BUFFER_SIZE),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_rtp(mut self, rtp: RtpHeader) -> Self {
        self.rtp = rtp;
        self
    }

    pub fn rtp(&self) -> &RtpHeader {
        &self.rtp
    }

    pub fn server_rtp_port(&self) -> Option<u16> {
        match &self.delivery {
            Delivery::Udp { sockets, .. } => Some(sockets.rtp_port()),
            Delivery::Interleaved { .. } => None,
        }
    }

    pub fn server_rtcp_port(&self) -> Option<u16> {
        match &self.delivery {
            Delivery::Udp { sockets, .. } => Some(sockets.rtcp_port()),
            Delivery::Interleaved { .. } => None,
        }
    }

    /// `Transport` value for the SETUP response.
    pub fn response_header(&self) -> String {
        match &self.delivery {
            Delivery::Udp {
                sockets,
                client_rtp,
                client_rtcp,
            } => format!(
                "RTP/AVP;unicast;client_port={}-{};server_port={}-{};ssrc={:08X}",
                client_rtp.port(),
                client_rtcp.port(),
                sockets.rtp_port(),
                sockets.rtcp_port(),
                self.rtp.ssrc
            ),
            Delivery::Interleaved {
                rtp_channel,
                rtcp_channel,
            } => format!(
                "RTP/AVP/TCP;unicast;interleaved={}-{};ssrc={:08X}",
                rtp_channel, rtcp_channel, self.rtp.ssrc
            ),
        }
    }

    /// Send one finished RTP packet. Interleaved packets go to `control`.
    pub fn send_packet<W: Write>(&self, packet: &[u8], control: &mut W) -> Result<()> {
        match &self.delivery {
            Delivery::Udp {
                sockets,
                client_rtp,
                ..
            } => sockets.send_rtp(packet, *client_rtp),
            Delivery::Interleaved { rtp_channel, .. } => {
                write_interleaved(control, *rtp_channel, packet)
            }
        }
    }

    /// Packetize `frame` and send every fragment. Returns the packet count.
    ///
    /// A malformed frame is rejected before any packet is built or the
    /// timestamp moves. A send failure aborts the frame.
    pub fn stream_frame<W: Write>(
        &mut self,
        packetizer: &MjpegPacketizer,
        frame: &Frame<'_>,
        control: &mut W,
    ) -> Result<usize> {
        let mut jpeg = JpegDescriptor::parse(frame.data)?;
        let (width, height) = frame.declared_size;
        jpeg.reconcile_dimensions(width, height)?;

        let timestamp = self.rtp.advance_to(frame.captured_at_ms);

        let mut offset = 0;
        let mut sent = 0;
        loop {
            offset = packetizer.packetize_fragment(&mut self.rtp, &jpeg, offset, &mut self.packet);
            if self.packet.is_empty() {
                break;
            }
            self.send_packet(&self.packet, control)?;
            sent += 1;
            if offset == 0 {
                break;
            }
        }

        tracing::trace!(
            packets = sent,
            scan_len = jpeg.scan.len(),
            timestamp,
            "frame sent"
        );
        Ok(sent)
    }
}
