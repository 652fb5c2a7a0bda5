/// RTP payload type for JPEG (RFC 3551 §6, static assignment).
pub const JPEG_PAYLOAD_TYPE: u8 = 26;

/// Size of the fixed RTP header without CSRCs.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP clock rate for video payloads, in Hz (RFC 2435 §3).
pub const CLOCK_RATE: u32 = 90_000;

const TICKS_PER_MS: u32 = CLOCK_RATE / 1000;

/// Sequence, timestamp and SSRC for one RTP sender (RFC 3550 §5.1).
///
/// One per transport session. The sequence number goes up by one per packet
/// and wraps; the timestamp only moves between frames, by the capture-time
/// delta on the 90 kHz clock; the SSRC never changes. Headers are always
/// version 2 with no padding, extension or CSRCs.
#[derive(Debug)]
pub struct RtpHeader {
    pub pt: u8,
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
    last_capture_ms: Option<u32>,
}

impl RtpHeader {
    /// Create header state with explicit initial values.
    pub fn new(pt: u8, ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        tracing::trace!(pt, ssrc = format_args!("{ssrc:08X}"), sequence, timestamp, "new RTP sender");
        Self {
            pt,
            ssrc,
            sequence,
            timestamp,
            last_capture_ms: None,
        }
    }

    /// Create with random SSRC, initial sequence number and timestamp.
    ///
    /// RFC 3550 §5.1 recommends random initial values so that sessions
    /// reusing a port do not collide with stale packets.
    pub fn random(pt: u8) -> Self {
        Self::new(pt, rand::random(), rand::random(), rand::random())
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp of the current frame.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Fixed header for the next packet. Consumes one sequence number.
    ///
    /// RFC 2435 sets `marker` on the final packet of each frame.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let [s0, s1] = self.sequence.to_be_bytes();
        let [t0, t1, t2, t3] = self.timestamp.to_be_bytes();
        let [c0, c1, c2, c3] = self.ssrc.to_be_bytes();
        let m = if marker { 0x80 } else { 0 };
        self.sequence = self.sequence.wrapping_add(1);
        [0x80, m | (self.pt & 0x7F), s0, s1, t0, t1, t2, t3, c0, c1, c2, c3]
    }

    /// Move the media clock to a frame captured at `capture_ms`.
    ///
    /// The first frame keeps the initial timestamp. Later frames advance it by
    /// the elapsed capture time at 90 ticks per millisecond; the subtraction
    /// wraps so a rolled-over millisecond counter still yields a small delta.
    pub fn advance_to(&mut self, capture_ms: u32) -> u32 {
        if let Some(prev) = self.last_capture_ms {
            let elapsed = capture_ms.wrapping_sub(prev);
            self.timestamp = self
                .timestamp
                .wrapping_add(elapsed.wrapping_mul(TICKS_PER_MS));
        }
        self.last_capture_ms = Some(capture_ms);
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(header: &[u8]) -> u16 {
        u16::from_be_bytes([header[2], header[3]])
    }

    #[test]
    fn header_layout() {
        let mut h = RtpHeader::new(JPEG_PAYLOAD_TYPE, 0x1234_5678, 7, 0xDEAD_BEEF);
        let plain = h.write(false);
        assert_eq!(
            plain,
            [0x80, 26, 0, 7, 0xDE, 0xAD, 0xBE, 0xEF, 0x12, 0x34, 0x56, 0x78]
        );
        let last = h.write(true);
        assert_eq!(last[1], 0x80 | 26);
        assert_eq!(seq(&last), 8);
    }

    #[test]
    fn sequence_wraps() {
        let mut h = RtpHeader::new(26, 1, u16::MAX, 0);
        assert_eq!(seq(&h.write(false)), u16::MAX);
        assert_eq!(seq(&h.write(false)), 0);
        assert_eq!(h.sequence(), 1);
    }

    #[test]
    fn timestamp_follows_capture_time() {
        let mut h = RtpHeader::new(26, 1, 0, 1000);
        assert_eq!(h.advance_to(5_000), 1000);
        assert_eq!(h.advance_to(5_100), 1000 + 100 * 90);
        assert_eq!(h.advance_to(5_133), 1000 + 133 * 90);
    }

    #[test]
    fn timestamp_survives_millisecond_rollover() {
        let mut h = RtpHeader::new(26, 1, 0, 0);
        h.advance_to(u32::MAX - 9);
        assert_eq!(h.advance_to(30), 40 * 90);
    }

    #[test]
    fn timestamp_wraps_at_32_bits() {
        let mut h = RtpHeader::new(26, 1, 0, u32::MAX - 89);
        h.advance_to(0);
        assert_eq!(h.advance_to(2), 90);
    }

    #[test]
    fn every_packet_of_a_frame_shares_the_timestamp() {
        let mut h = RtpHeader::new(26, 1, 0, 0);
        h.advance_to(0);
        h.advance_to(100);
        let first = h.write(false);
        let last = h.write(true);
        assert_eq!(first[4..8], last[4..8]);
    }

    #[test]
    fn senders_get_distinct_ssrcs() {
        assert_ne!(RtpHeader::random(26).ssrc, RtpHeader::random(26).ssrc);
    }
}
