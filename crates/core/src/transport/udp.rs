use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use crate::error::{Result, RtspError};

/// Attempts at an even RTP port with RTCP on the next port up (RFC 3550 §11)
/// before settling for any two free ports.
const PAIR_ATTEMPTS: usize = 16;

/// A session's server-side RTP and RTCP sockets.
///
/// Both are bound on the unspecified address of the client's family, on
/// ports chosen by the OS. Dropping the pair releases the ports.
#[derive(Debug)]
pub struct UdpPair {
    rtp: UdpSocket,
    rtcp: UdpSocket,
}

impl UdpPair {
    /// Bind a fresh socket pair suitable for sending to `client_ip`.
    pub fn bind(client_ip: IpAddr) -> Result<Self> {
        let any = match client_ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        for _ in 0..PAIR_ATTEMPTS {
            let rtp = UdpSocket::bind(SocketAddr::new(any, 0)).map_err(exhausted)?;
            let port = rtp.local_addr().map_err(exhausted)?.port();
            if port % 2 != 0 || port == u16::MAX {
                continue;
            }
            if let Ok(rtcp) = UdpSocket::bind(SocketAddr::new(any, port + 1)) {
                tracing::trace!(rtp_port = port, rtcp_port = port + 1, "bound RTP/RTCP pair");
                return Ok(Self { rtp, rtcp });
            }
        }

        let rtp = UdpSocket::bind(SocketAddr::new(any, 0)).map_err(exhausted)?;
        let rtcp = UdpSocket::bind(SocketAddr::new(any, 0)).map_err(exhausted)?;
        tracing::debug!("no adjacent RTP/RTCP ports free, using two unrelated ports");
        Ok(Self { rtp, rtcp })
    }

    pub fn rtp_port(&self) -> u16 {
        self.rtp.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn rtcp_port(&self) -> u16 {
        self.rtcp.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Send one RTP packet as a single datagram.
    pub fn send_rtp(&self, packet: &[u8], addr: SocketAddr) -> Result<()> {
        self.rtp
            .send_to(packet, addr)
            .map(|_| ())
            .map_err(RtspError::TransportWrite)
    }
}

fn exhausted(e: io::Error) -> RtspError {
    tracing::warn!(error = %e, "cannot bind RTP socket");
    RtspError::ResourceExhaustion("no UDP ports available")
}
