use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::{FramePacer, MonotonicClock};
use crate::error::{Result, RtspError};
use crate::media::MjpegPacketizer;
use crate::media::source::{FrameSource, Streamer};
use crate::protocol::request::{Inbound, take_message};
use crate::protocol::{MethodHandler, RtspResponse};
use crate::server::ServerConfig;

/// A stalled client must not hold its worker forever.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a rejected client gets to send its first request, in total.
const REJECT_DEADLINE: Duration = Duration::from_millis(500);

/// Rejections waiting on a CSeq at once. Beyond this the 503 goes out bare.
const MAX_PENDING_REJECTS: usize = 16;

/// Idle sleep when no frame is due.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Write one RTP packet with interleaved framing (RFC 2326 §10.12).
///
/// ```text
/// '$' | channel (1 byte) | length (u16, big-endian) | packet
/// ```
pub fn write_interleaved<W: Write>(w: &mut W, channel: u8, packet: &[u8]) -> Result<()> {
    let len = u16::try_from(packet.len())
        .map_err(|_| RtspError::TransportWrite(ErrorKind::InvalidInput.into()))?;
    let mut framed = Vec::with_capacity(4 + packet.len());
    framed.push(b'$');
    framed.push(channel);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(packet);
    w.write_all(&framed).map_err(RtspError::TransportWrite)
}

/// Decrements the live-worker count when a connection thread ends.
struct WorkerSlot(Arc<AtomicUsize>);

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Connections beyond `max_clients` are answered with 503 and closed.
pub fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    source: FrameSource,
    running: Arc<AtomicBool>,
    clock: MonotonicClock,
) {
    let active = Arc::new(AtomicUsize::new(0));
    let rejecting = Arc::new(AtomicUsize::new(0));

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }

                if active.load(Ordering::SeqCst) >= config.max_clients {
                    tracing::warn!(%peer_addr, max_clients = config.max_clients, "rejecting client, server full");
                    if rejecting.load(Ordering::SeqCst) >= MAX_PENDING_REJECTS {
                        send_unavailable(stream, None);
                        continue;
                    }
                    rejecting.fetch_add(1, Ordering::SeqCst);
                    let slot = WorkerSlot(rejecting.clone());
                    let spawned = thread::Builder::new()
                        .name("rtsp-reject".into())
                        .spawn(move || {
                            let _slot = slot;
                            reject(stream);
                        });
                    if let Err(e) = spawned {
                        tracing::warn!(%peer_addr, error = %e, "cannot spawn reject thread, dropping client");
                    }
                    continue;
                }

                active.fetch_add(1, Ordering::SeqCst);
                let slot = WorkerSlot(active.clone());
                let c = config.clone();
                let s = source.clone();
                let r = running.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rtsp-client-{peer_addr}"))
                    .spawn(move || {
                        let _slot = slot;
                        Connection::handle(stream, c, s, r, clock);
                    });
                if let Err(e) = spawned {
                    tracing::warn!(%peer_addr, error = %e, "cannot spawn client thread, dropping client");
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Answer a connection the server has no room for.
///
/// Waits up to [`REJECT_DEADLINE`] for the client's first request so the 503
/// can echo its CSeq.
fn reject(mut stream: TcpStream) {
    let deadline = Instant::now() + REJECT_DEADLINE;
    let mut inbox = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut cseq = None;

    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() || stream.set_read_timeout(Some(left)).is_err() {
            break;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => inbox.extend_from_slice(&chunk[..n]),
        }
        match take_message(&mut inbox) {
            Some(Inbound::Request(Ok(request))) => {
                cseq = request.cseq().map(str::to_string);
                break;
            }
            Some(_) => break,
            None => {}
        }
    }

    send_unavailable(stream, cseq.as_deref());
}

fn send_unavailable(mut stream: TcpStream, cseq: Option<&str>) {
    let mut response = RtspResponse::service_unavailable();
    if let Some(cseq) = cseq {
        response = response.add_header("CSeq", cseq);
    }
    let _ = stream.set_write_timeout(Some(REJECT_DEADLINE));
    let _ = stream.write_all(response.serialize().as_bytes());
    let _ = stream.shutdown(Shutdown::Both);
}

/// A single RTSP client connection with its own lifecycle.
///
/// Owns the control socket, the session (inside the handler) and the
/// session's frame cursor; nothing here is shared with other connections.
struct Connection {
    stream: TcpStream,
    inbox: Vec<u8>,
    handler: MethodHandler,
    streamer: Streamer,
    packetizer: MjpegPacketizer,
    peer_addr: SocketAddr,
    poll_timeout: Duration,
    frame_interval_ms: u32,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        config: Arc<ServerConfig>,
        source: FrameSource,
        running: Arc<AtomicBool>,
        clock: MonotonicClock,
    ) {
        let (peer_addr, local_addr) = match (stream.peer_addr(), stream.local_addr()) {
            (Ok(peer), Ok(local)) => (peer, local),
            _ => return,
        };

        tracing::info!(%peer_addr, "client connected");

        if let Err(e) = stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .and_then(|()| stream.set_nodelay(true))
        {
            tracing::warn!(%peer_addr, error = %e, "cannot configure control socket");
            return;
        }

        let packetizer = config.packetizer();
        let mut conn = Connection {
            stream,
            inbox: Vec::new(),
            handler: MethodHandler::new(config.clone(), packetizer.clone(), peer_addr, local_addr),
            streamer: source.streamer(),
            packetizer,
            peer_addr,
            poll_timeout: config.request_poll_timeout,
            frame_interval_ms: config.frame_interval_ms(),
        };

        let reason = conn.run(&running, clock);
        conn.cleanup();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/stream loop. Returns the reason for exiting.
    fn run(&mut self, running: &AtomicBool, clock: MonotonicClock) -> &'static str {
        let mut pacer = FramePacer::new(self.frame_interval_ms);

        while running.load(Ordering::SeqCst) {
            if let Err(reason) = self.handle_requests(self.poll_timeout) {
                return reason;
            }

            let now = clock.now_ms();
            if self.handler.session().is_playing() && pacer.due(now) {
                if let Err(reason) = self.broadcast_current_frame(now) {
                    return reason;
                }
            } else {
                thread::sleep(IDLE_SLEEP);
            }
        }

        "server shutting down"
    }

    /// Wait up to `timeout` for input and service at most one request.
    /// A zero timeout only takes what has already arrived.
    ///
    /// Interleaved frames from the client are consumed and dropped on the way.
    fn handle_requests(&mut self, timeout: Duration) -> std::result::Result<(), &'static str> {
        if self.service_one()? {
            return Ok(());
        }

        // A zero read timeout is an error for std sockets, so poll instead.
        let poll = timeout.is_zero();
        let configured = if poll {
            self.stream.set_nonblocking(true)
        } else {
            self.stream.set_read_timeout(Some(timeout))
        };
        if configured.is_err() {
            return Err("socket error");
        }
        let mut chunk = [0u8; 2048];
        let read = self.stream.read(&mut chunk);
        if poll && self.stream.set_nonblocking(false).is_err() {
            return Err("socket error");
        }
        match read {
            Ok(0) => Err("connection closed by client"),
            Ok(n) => {
                self.inbox.extend_from_slice(&chunk[..n]);
                self.service_one().map(|_| ())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(_) => Err("read error"),
        }
    }

    /// Answer the next buffered request, if a complete one is there.
    fn service_one(&mut self) -> std::result::Result<bool, &'static str> {
        loop {
            match take_message(&mut self.inbox) {
                None => return Ok(false),
                Some(Inbound::Interleaved { channel, len }) => {
                    tracing::trace!(peer = %self.peer_addr, channel, len, "discarding interleaved frame from client");
                }
                Some(Inbound::Request(request)) => {
                    self.dispatch(request)?;
                    return Ok(true);
                }
            }
        }
    }

    fn dispatch(&mut self, request: Result<crate::protocol::RtspRequest>) -> std::result::Result<(), &'static str> {
        let response = match request {
            Ok(request) => {
                tracing::debug!(
                    peer = %self.peer_addr,
                    method = %request.method,
                    uri = %request.uri,
                    version = %request.version,
                    "request"
                );
                self.handler.handle(&request)
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                RtspResponse::bad_request()
            }
        };

        tracing::debug!(
            peer = %self.peer_addr,
            status = response.status_code,
            "response"
        );

        if self
            .stream
            .write_all(response.serialize().as_bytes())
            .is_err()
        {
            return Err("write error");
        }

        if self.handler.session().is_terminated() {
            let _ = self.stream.shutdown(Shutdown::Write);
            return Err("session torn down");
        }
        Ok(())
    }

    /// Push the next frame to the client. No-op unless the session is playing.
    ///
    /// A malformed frame is dropped; a failed send ends the session.
    fn broadcast_current_frame(&mut self, now_ms: u32) -> std::result::Result<(), &'static str> {
        if !self.handler.session().is_playing() {
            return Ok(());
        }
        let Some(transport) = self.handler.session_mut().transport_mut() else {
            return Ok(());
        };
        let packetizer = &self.packetizer;
        let stream = &mut self.stream;

        let result = self.streamer.stream_image(now_ms, |frame| {
            transport
                .stream_frame(packetizer, frame, stream)
                .map(|_| ())
        });

        match result {
            Ok(_) => Ok(()),
            Err(RtspError::MalformedJpeg(reason)) => {
                tracing::warn!(peer = %self.peer_addr, reason, "dropping malformed frame");
                Ok(())
            }
            Err(RtspError::TransportWrite(e)) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "RTP send failed, ending session");
                Err("transport write failed")
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "frame not sent");
                Ok(())
            }
        }
    }

    /// Release the session's transport if the client never tore it down.
    fn cleanup(&mut self) {
        let session = self.handler.session_mut();
        if let Some(id) = session.id().map(str::to_string)
            && session.teardown()
        {
            tracing::info!(peer = %self.peer_addr, session_id = %id, "released session on disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_framing() {
        let mut out = Vec::new();
        write_interleaved(&mut out, 2, &[0xAA; 300]).unwrap();
        assert_eq!(&out[..4], &[b'$', 2, 0x01, 0x2C]);
        assert_eq!(out.len(), 304);
    }

    #[test]
    fn interleaved_rejects_oversized_packet() {
        let mut out = Vec::new();
        let result = write_interleaved(&mut out, 0, &vec![0u8; 70_000]);
        assert!(matches!(result, Err(RtspError::TransportWrite(_))));
        assert!(out.is_empty());
    }
}
