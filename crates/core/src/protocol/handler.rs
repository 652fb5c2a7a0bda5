use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::RtspError;
use crate::media::MjpegPacketizer;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::{RtspResponse, SUPPORTED_METHODS};
use crate::protocol::sdp::{self, SdpOrigin};
use crate::server::ServerConfig;
use crate::session::{Session, TransportHeader, TransportSession};

/// Handles RTSP method requests for a single TCP connection.
///
/// Owns the connection's [`Session`]; the session's transport is released
/// when the handler is dropped, so a vanished client leaves nothing behind.
pub struct MethodHandler {
    config: Arc<ServerConfig>,
    packetizer: MjpegPacketizer,
    session: Session,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    /// Control URL the client used in SETUP, echoed in `RTP-Info`.
    setup_uri: Option<String>,
}

impl MethodHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        packetizer: MjpegPacketizer,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Self {
        let session = Session::new(config.session_timeout_secs);
        MethodHandler {
            config,
            packetizer,
            session,
            peer_addr,
            local_addr,
            setup_uri: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0");

        if let Some(id) = extract_session_id(request)
            && !self.session.matches(id)
            && request.method != "OPTIONS"
            && request.method != "DESCRIBE"
        {
            tracing::warn!(method = %request.method, session_id = id, "request for unknown session");
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        }

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq),
            "DESCRIBE" => self.handle_describe(cseq, &request.uri),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" => self.handle_play(cseq),
            "PAUSE" => self.handle_pause(cseq),
            "TEARDOWN" => self.handle_teardown(cseq),
            "GET_PARAMETER" => self.handle_get_parameter(cseq, request),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::method_not_allowed().add_header("CSeq", cseq)
            }
        }
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", SUPPORTED_METHODS)
    }

    /// Host to advertise: configured host, else the host from the request
    /// URI, else the local address the client reached us on.
    fn advertised_host(&self, uri: &str) -> String {
        if let Some(host) = &self.config.uri.host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let authority = after_scheme.split('/').next().unwrap_or("");
            let host = if let Some(rest) = authority.strip_prefix('[') {
                rest.split(']').next().unwrap_or("")
            } else {
                authority.split(':').next().unwrap_or("")
            };
            if !host.trim().is_empty() {
                return host.trim().to_string();
            }
        }
        self.local_addr.ip().to_string()
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        if !self.config.uri.matches(uri) {
            tracing::warn!(uri, "DESCRIBE for unknown stream");
            return RtspResponse::not_found().add_header("CSeq", cseq);
        }

        let host = self.advertised_host(uri);
        let origin = SdpOrigin {
            username: &self.config.sdp_username,
            session_id: &self.config.sdp_session_id,
            session_version: &self.config.sdp_session_version,
        };
        let sdp = sdp::generate_sdp(&self.config.uri, &host, &origin, &self.packetizer);

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &format!("{}/", uri.trim_end_matches('/')))
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        if !self.config.uri.matches(&request.uri) {
            tracing::warn!(uri = %request.uri, "SETUP for unknown stream");
            return RtspResponse::not_found().add_header("CSeq", cseq);
        }

        let Some(transport_header) = request.get_header("Transport") else {
            tracing::warn!(%cseq, "SETUP missing Transport header");
            return RtspResponse::bad_request().add_header("CSeq", cseq);
        };

        let Some(requested) = TransportHeader::parse(transport_header) else {
            tracing::warn!(%cseq, transport = transport_header, "unsupported transport");
            return RtspResponse::unsupported_transport().add_header("CSeq", cseq);
        };

        if self.session.transport().is_some() || self.session.id().is_some() {
            tracing::warn!(%cseq, state = self.session.state().as_str(), "SETUP on an established session");
            return RtspResponse::method_not_valid_in_state().add_header("CSeq", cseq);
        }

        let transport = match TransportSession::setup(&requested, self.peer_addr.ip()) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to set up transport");
                return RtspResponse::internal_error().add_header("CSeq", cseq);
            }
        };
        let transport_response = transport.response_header();

        let session_id = match self.session.setup(transport) {
            Ok(id) => id.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "SETUP rejected");
                return RtspResponse::method_not_valid_in_state().add_header("CSeq", cseq);
            }
        };
        self.setup_uri = Some(request.uri.clone());

        tracing::info!(
            session_id,
            peer = %self.peer_addr,
            uri = %request.uri,
            transport = %transport_response,
            "session created via SETUP"
        );

        let mut resp = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_response);
        if let Some(value) = self.session.header_value() {
            resp = resp.add_header("Session", &value);
        }
        resp
    }

    fn handle_play(&mut self, cseq: &str) -> RtspResponse {
        if let Err(e) = self.session.play() {
            tracing::warn!(error = %e, "PLAY rejected");
            return self.state_error(cseq, e);
        }

        let mut resp = self.with_session(RtspResponse::ok().add_header("CSeq", cseq));
        resp = resp.add_header("Range", "npt=0.000-");

        if let (Some(transport), Some(url)) = (self.session.transport(), &self.setup_uri) {
            let rtp = transport.rtp();
            let rtp_info = format!(
                "url={};seq={};rtptime={}",
                url,
                rtp.sequence(),
                rtp.timestamp()
            );
            resp = resp.add_header("RTP-Info", &rtp_info);
        }

        tracing::info!(session_id = self.session.id().unwrap_or("-"), "session started playing");
        resp
    }

    fn handle_pause(&mut self, cseq: &str) -> RtspResponse {
        if let Err(e) = self.session.pause() {
            tracing::warn!(error = %e, "PAUSE rejected");
            return self.state_error(cseq, e);
        }
        tracing::info!(session_id = self.session.id().unwrap_or("-"), "session paused");
        self.with_session(RtspResponse::ok().add_header("CSeq", cseq))
    }

    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        let resp = self.with_session(RtspResponse::ok().add_header("CSeq", cseq));
        if self.session.teardown() {
            tracing::info!(session_id = self.session.id().unwrap_or("-"), "session terminated via TEARDOWN");
        }
        resp
    }

    /// GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
    fn handle_get_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, "GET_PARAMETER keepalive");

        let resp = RtspResponse::ok().add_header("CSeq", cseq);
        match extract_session_id(request) {
            Some(id) if self.session.matches(id) => resp.add_header("Session", id),
            _ => resp,
        }
    }

    fn with_session(&self, resp: RtspResponse) -> RtspResponse {
        match self.session.header_value() {
            Some(value) => resp.add_header("Session", &value),
            None => resp,
        }
    }

    fn state_error(&self, cseq: &str, e: RtspError) -> RtspResponse {
        match e {
            RtspError::ProtocolViolation { .. } => {
                RtspResponse::method_not_valid_in_state().add_header("CSeq", cseq)
            }
            _ => RtspResponse::internal_error().add_header("CSeq", cseq),
        }
    }
}

/// Extract session ID from the Session header.
/// Handles timeout suffix: "SESSIONID;timeout=60" -> "SESSIONID"
fn extract_session_id(request: &RtspRequest) -> Option<&str> {
    request
        .get_header("Session")
        .map(|s| s.split(';').next().unwrap_or(s).trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn handler() -> MethodHandler {
        let config = Arc::new(ServerConfig::default());
        let packetizer = config.packetizer();
        MethodHandler::new(
            config,
            packetizer,
            "127.0.0.1:50000".parse().unwrap(),
            "127.0.0.1:8554".parse().unwrap(),
        )
    }

    fn request(method: &str, uri: &str, cseq: u32, extra: &[(&str, &str)]) -> RtspRequest {
        let mut raw = format!("{method} {uri} RTSP/1.0\r\nCSeq: {cseq}\r\n");
        for (name, value) in extra {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        raw.push_str("\r\n");
        RtspRequest::parse(&raw).unwrap()
    }

    const URL: &str = "rtsp://127.0.0.1:8554/mjpeg/1";
    const INTERLEAVED: (&str, &str) = ("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1");

    fn setup(h: &mut MethodHandler) -> String {
        let resp = h.handle(&request("SETUP", &format!("{URL}/track1"), 3, &[INTERLEAVED]));
        assert_eq!(resp.status_code, 200);
        let session = resp.get_header("Session").unwrap();
        session.split(';').next().unwrap().to_string()
    }

    #[test]
    fn options_lists_methods() {
        let resp = handler().handle(&request("OPTIONS", "*", 1, &[]));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("CSeq"), Some("1"));
        assert_eq!(resp.get_header("Public"), Some(SUPPORTED_METHODS));
    }

    #[test]
    fn describe_returns_sdp() {
        let resp = handler().handle(&request("DESCRIBE", URL, 2, &[]));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("Content-Type"), Some("application/sdp"));
        assert_eq!(
            resp.get_header("Content-Base"),
            Some("rtsp://127.0.0.1:8554/mjpeg/1/")
        );
        let body = resp.body.unwrap();
        assert!(body.contains("c=IN IP4 127.0.0.1"));
        assert!(body.contains("m=video 0 RTP/AVP 26"));
    }

    #[test]
    fn describe_unknown_path_is_404() {
        let resp = handler().handle(&request("DESCRIBE", "rtsp://127.0.0.1/other", 2, &[]));
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.get_header("CSeq"), Some("2"));
    }

    #[test]
    fn setup_interleaved() {
        let mut h = handler();
        let resp = h.handle(&request("SETUP", URL, 3, &[INTERLEAVED]));
        assert_eq!(resp.status_code, 200);
        assert!(
            resp.get_header("Transport")
                .unwrap()
                .starts_with("RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=")
        );
        assert!(resp.get_header("Session").unwrap().ends_with(";timeout=60"));
        assert_eq!(h.session().state(), SessionState::Ready);
    }

    #[test]
    fn setup_udp_reports_server_ports() {
        let mut h = handler();
        let resp = h.handle(&request(
            "SETUP",
            URL,
            3,
            &[("Transport", "RTP/AVP;unicast;client_port=5000-5001")],
        ));
        assert_eq!(resp.status_code, 200);
        let transport = resp.get_header("Transport").unwrap();
        assert!(transport.contains("client_port=5000-5001"));
        assert!(transport.contains("server_port="));
    }

    #[test]
    fn setup_errors() {
        let mut h = handler();
        assert_eq!(h.handle(&request("SETUP", URL, 3, &[])).status_code, 400);
        assert_eq!(
            h.handle(&request(
                "SETUP",
                URL,
                4,
                &[("Transport", "RTP/AVP;multicast;port=5000-5001")]
            ))
            .status_code,
            461
        );
        assert_eq!(
            h.handle(&request("SETUP", "rtsp://127.0.0.1/nope", 5, &[INTERLEAVED]))
                .status_code,
            404
        );
        assert_eq!(h.session().state(), SessionState::Init);

        setup(&mut h);
        assert_eq!(h.handle(&request("SETUP", URL, 7, &[INTERLEAVED])).status_code, 455);
    }

    #[test]
    fn play_before_setup_is_455() {
        let mut h = handler();
        let resp = h.handle(&request("PLAY", URL, 4, &[]));
        assert_eq!(resp.status_code, 455);
        assert_eq!(h.session().state(), SessionState::Init);
    }

    #[test]
    fn play_pause_teardown() {
        let mut h = handler();
        let id = setup(&mut h);

        let resp = h.handle(&request("PLAY", URL, 4, &[("Session", id.as_str())]));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("Range"), Some("npt=0.000-"));
        let rtp_info = resp.get_header("RTP-Info").unwrap();
        assert!(rtp_info.starts_with(&format!("url={URL}/track1;seq=")));
        assert!(rtp_info.contains(";rtptime="));
        assert!(h.session().is_playing());

        let resp = h.handle(&request("PAUSE", URL, 5, &[("Session", id.as_str())]));
        assert_eq!(resp.status_code, 200);
        assert_eq!(h.session().state(), SessionState::Ready);

        let resp = h.handle(&request("TEARDOWN", URL, 6, &[("Session", id.as_str())]));
        assert_eq!(resp.status_code, 200);
        assert!(h.session().is_terminated());
        assert!(h.session().transport().is_none());

        let resp = h.handle(&request("TEARDOWN", URL, 7, &[("Session", id.as_str())]));
        assert_eq!(resp.status_code, 200);
    }

    #[test]
    fn mismatched_session_is_454() {
        let mut h = handler();
        setup(&mut h);
        let resp = h.handle(&request("PLAY", URL, 4, &[("Session", "DEADBEEF")]));
        assert_eq!(resp.status_code, 454);
        assert_eq!(h.session().state(), SessionState::Ready);
    }

    #[test]
    fn get_parameter_echoes_session() {
        let mut h = handler();
        let id = setup(&mut h);
        let resp = h.handle(&request(
            "GET_PARAMETER",
            URL,
            5,
            &[("Session", format!("{id};timeout=60").as_str())],
        ));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.get_header("Session"), Some(id.as_str()));
    }

    #[test]
    fn unknown_method_is_405() {
        let resp = handler().handle(&request("RECORD", URL, 9, &[]));
        assert_eq!(resp.status_code, 405);
        assert_eq!(resp.get_header("Allow"), Some(SUPPORTED_METHODS));
        assert_eq!(resp.get_header("CSeq"), Some("9"));
    }

    #[test]
    fn configured_host_wins() {
        let config = ServerConfig {
            uri: crate::uri::UriDescriptor::default().with_host("cam.local"),
            ..ServerConfig::default()
        };
        let packetizer = config.packetizer();
        let h = MethodHandler::new(
            Arc::new(config),
            packetizer,
            "127.0.0.1:50000".parse().unwrap(),
            "127.0.0.1:8554".parse().unwrap(),
        );
        assert_eq!(h.advertised_host(URL), "cam.local");
        assert_eq!(handler().advertised_host("rtsp://[::1]:8554/mjpeg/1"), "::1");
        assert_eq!(handler().advertised_host("/mjpeg/1"), "127.0.0.1");
    }
}
