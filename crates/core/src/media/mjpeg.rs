//! MJPEG RTP packetizer (RFC 2435).
//!
//! Every packet carries the 12-byte RTP header followed by an 8-byte
//! JPEG-specific header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Type-specific |              Fragment Offset                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Type     |       Q       |     Width     |     Height    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Then, in order and only when applicable:
//!
//! - **Restart Marker header** (types 64–127, every packet, §3.1.7).
//! - **Quantization Table header** + tables (Q ≥ 128, first packet of the
//!   frame only, §3.1.8).
//! - A contiguous slice of the scan data starting at the fragment offset.
//!
//! Uses static payload type 26: `a=rtpmap:26 JPEG/90000`.

use super::jpeg::JpegDescriptor;
use super::rtp::{CLOCK_RATE, JPEG_PAYLOAD_TYPE, RTP_HEADER_LEN, RtpHeader};

/// Length of the main RTP/JPEG header.
pub const JPEG_HEADER_LEN: usize = 8;

/// Length of the Restart Marker header.
pub const RESTART_HEADER_LEN: usize = 4;

/// Length of the Quantization Table header (without the tables).
pub const QUANT_HEADER_LEN: usize = 4;

/// Hard ceiling for a packet, matching the fixed send buffer.
pub const RTP_BUFFER_SIZE: usize = 2048;

/// Default RTP packet size; keeps datagrams under a 1500-byte Ethernet MTU.
pub const DEFAULT_MTU: usize = 1400;

/// Smallest packet that still fits every header, two tables and one byte of scan.
pub const MIN_PACKET_SIZE: usize = 256;

/// Q value announcing in-band tables that may change every frame.
pub const DYNAMIC_QUALITY: u8 = 255;

/// Q value used when a frame carries no tables of its own.
pub const DEFAULT_STATIC_QUALITY: u8 = 94;

/// RFC 2435 packetizer.
///
/// Holds only configuration; the sequence/timestamp state lives in the
/// session's [`RtpHeader`] so one packetizer can serve any session.
#[derive(Debug, Clone)]
pub struct MjpegPacketizer {
    max_packet_size: usize,
    static_quality: u8,
}

impl MjpegPacketizer {
    /// Create a packetizer emitting RTP packets of at most `max_packet_size`
    /// bytes, clamped to [`MIN_PACKET_SIZE`]..=[`RTP_BUFFER_SIZE`].
    pub fn new(max_packet_size: usize) -> Self {
        let clamped = max_packet_size.clamp(MIN_PACKET_SIZE, RTP_BUFFER_SIZE);
        if clamped != max_packet_size {
            tracing::warn!(requested = max_packet_size, used = clamped, "RTP packet size clamped");
        }
        Self {
            max_packet_size: clamped,
            static_quality: DEFAULT_STATIC_QUALITY,
        }
    }

    /// Q used for frames without their own tables (1–99, §4.2).
    pub fn with_static_quality(mut self, quality: u8) -> Self {
        self.static_quality = quality.clamp(1, 99);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Q field for a frame: dynamic when tables travel in-band.
    pub fn quality(&self, jpeg: &JpegDescriptor<'_>) -> u8 {
        if jpeg.has_quant_tables() {
            DYNAMIC_QUALITY
        } else {
            self.static_quality
        }
    }

    /// Write one packet of `jpeg` starting at fragment `offset` into `packet`.
    ///
    /// The packet takes as much scan data as the size budget leaves after the
    /// headers. Returns the offset of the next fragment, or 0 once the packet
    /// written was the last one of the frame (its marker bit is set). An
    /// `offset` past the scan writes nothing and returns 0.
    pub fn packetize_fragment(
        &self,
        rtp: &mut RtpHeader,
        jpeg: &JpegDescriptor<'_>,
        offset: usize,
        packet: &mut Vec<u8>,
    ) -> usize {
        packet.clear();
        if offset >= jpeg.scan.len() {
            return 0;
        }

        let quality = self.quality(jpeg);
        let with_tables = offset == 0 && quality >= 128;

        let mut overhead = RTP_HEADER_LEN + JPEG_HEADER_LEN;
        if jpeg.restart_interval > 0 {
            overhead += RESTART_HEADER_LEN;
        }
        if with_tables {
            overhead += QUANT_HEADER_LEN + jpeg.quant_len();
        }

        let chunk_len = (jpeg.scan.len() - offset).min(self.max_packet_size - overhead);
        let end = offset + chunk_len;
        let last = end == jpeg.scan.len();

        packet.extend_from_slice(&rtp.write(last));

        packet.push(0); // type-specific
        packet.extend_from_slice(&(offset as u32).to_be_bytes()[1..]);
        packet.push(jpeg.rtp_type());
        packet.push(quality);
        packet.push(jpeg.width_blocks());
        packet.push(jpeg.height_blocks());

        if jpeg.restart_interval > 0 {
            // F=1, L=1, count=0x3FFF: reassemble the whole frame before decoding.
            packet.extend_from_slice(&jpeg.restart_interval.to_be_bytes());
            packet.extend_from_slice(&[0xFF, 0xFF]);
        }

        if with_tables {
            packet.push(0); // MBZ
            packet.push(0); // precision: all tables 8-bit
            packet.extend_from_slice(&(jpeg.quant_len() as u16).to_be_bytes());
            for table in jpeg.quant_tables() {
                packet.extend_from_slice(table);
            }
        }

        packet.extend_from_slice(&jpeg.scan[offset..end]);

        tracing::trace!(
            offset,
            len = chunk_len,
            last,
            seq = rtp.sequence().wrapping_sub(1),
            "JPEG fragment"
        );

        if last { 0 } else { end }
    }

    /// Packetize a whole frame into owned packets.
    pub fn packetize(&self, rtp: &mut RtpHeader, jpeg: &JpegDescriptor<'_>) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut offset = 0;
        loop {
            let mut packet = Vec::with_capacity(self.max_packet_size);
            offset = self.packetize_fragment(rtp, jpeg, offset, &mut packet);
            if packet.is_empty() {
                break;
            }
            packets.push(packet);
            if offset == 0 {
                break;
            }
        }
        packets
    }

    pub fn payload_type(&self) -> u8 {
        JPEG_PAYLOAD_TYPE
    }

    pub fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    /// SDP media-level attributes for the JPEG track.
    ///
    /// - `a=rtpmap:26 JPEG/90000`: codec name and clock rate
    /// - `a=control:track1`: track control URL for SETUP
    pub fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!("a=rtpmap:{} JPEG/{}", self.payload_type(), self.clock_rate()),
            "a=control:track1".to_string(),
        ]
    }
}

impl Default for MjpegPacketizer {
    fn default() -> Self {
        Self::new(DEFAULT_MTU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::jpeg::tests::build_jpeg;

    const BASE_HEADER: usize = RTP_HEADER_LEN + JPEG_HEADER_LEN;

    fn header() -> RtpHeader {
        RtpHeader::new(JPEG_PAYLOAD_TYPE, 0x11223344, 65530, 9000)
    }

    fn sequence(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[2], packet[3]])
    }

    fn fragment_offset(packet: &[u8]) -> usize {
        u32::from_be_bytes([0, packet[13], packet[14], packet[15]]) as usize
    }

    fn has_marker(packet: &[u8]) -> bool {
        packet[1] & 0x80 != 0
    }

    /// Scan bytes of a packet, skipping optional headers.
    fn payload(packet: &[u8], restart: bool) -> &[u8] {
        let mut start = BASE_HEADER;
        if restart {
            start += RESTART_HEADER_LEN;
        }
        if fragment_offset(packet) == 0 && packet[17] >= 128 {
            let len = u16::from_be_bytes([packet[start + 2], packet[start + 3]]) as usize;
            start += QUANT_HEADER_LEN + len;
        }
        &packet[start..]
    }

    fn scan_of(len: usize) -> Vec<u8> {
        // Entropy data never contains FF D9; avoid 0xFF entirely.
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn small_frame_single_packet() {
        let data = build_jpeg(&[1, 2, 3], true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let mut rtp = header();
        let packets = MjpegPacketizer::default().packetize(&mut rtp, &jpeg);

        assert_eq!(packets.len(), 1);
        let p = &packets[0];
        assert!(has_marker(p));
        assert_eq!(p[1] & 0x7F, 26);
        assert_eq!(fragment_offset(p), 0);
        assert_eq!(p[16], 0); // type
        assert_eq!(p[17], DYNAMIC_QUALITY);
        assert_eq!((p[18], p[19]), (80, 60));
        // quant header: MBZ, precision, length 128
        assert_eq!(&p[20..24], &[0, 0, 0, 128]);
        assert_eq!(&p[24..88], &[0x10; 64]);
        assert_eq!(&p[88..152], &[0x11; 64]);
        assert_eq!(&p[152..], &[1, 2, 3]);
    }

    #[test]
    fn fragments_reassemble_to_scan() {
        let scan = scan_of(10_000);
        let data = build_jpeg(&scan, true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let mut rtp = header();
        let packets = MjpegPacketizer::new(1000).packetize(&mut rtp, &jpeg);

        let mut reassembled = Vec::new();
        for p in &packets {
            assert!(p.len() <= 1000);
            assert_eq!(fragment_offset(p), reassembled.len());
            reassembled.extend_from_slice(payload(p, false));
        }
        assert_eq!(reassembled, scan);
    }

    #[test]
    fn marker_only_on_last_fragment() {
        let data = build_jpeg(&scan_of(5_000), true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packets = MjpegPacketizer::new(512).packetize(&mut header(), &jpeg);

        let markers: Vec<bool> = packets.iter().map(|p| has_marker(p)).collect();
        assert_eq!(markers.iter().filter(|&&m| m).count(), 1);
        assert!(*markers.last().unwrap());
    }

    #[test]
    fn tables_only_in_first_fragment() {
        let data = build_jpeg(&scan_of(5_000), true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packets = MjpegPacketizer::new(512).packetize(&mut header(), &jpeg);

        assert!(packets.len() > 2);
        // First packet: quant header right after the JPEG header.
        assert_eq!(&packets[0][20..24], &[0, 0, 0, 128]);
        // Later packets: scan data straight after the JPEG header, filling the budget.
        for p in &packets[1..packets.len() - 1] {
            assert_eq!(p.len(), 512);
            assert_eq!(payload(p, false).len(), 512 - BASE_HEADER);
        }
        // Every packet still announces dynamic Q.
        assert!(packets.iter().all(|p| p[17] == DYNAMIC_QUALITY));
    }

    #[test]
    fn without_tables_uses_static_quality() {
        let data = build_jpeg(&scan_of(300), false);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packets = MjpegPacketizer::default().packetize(&mut header(), &jpeg);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][17], DEFAULT_STATIC_QUALITY);
        assert_eq!(packets[0].len(), BASE_HEADER + 300);
    }

    #[test]
    fn sequence_contiguous_across_frames_and_wrap() {
        let data = build_jpeg(&scan_of(3_000), true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packetizer = MjpegPacketizer::new(700);
        let mut rtp = header();

        let mut seqs = Vec::new();
        for frame in 0..4u32 {
            rtp.advance_to(frame * 100);
            for p in packetizer.packetize(&mut rtp, &jpeg) {
                seqs.push(sequence(&p));
            }
        }
        for pair in seqs.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_add(1));
        }
        assert!(seqs.contains(&u16::MAX) && seqs.contains(&0));
    }

    #[test]
    fn timestamp_constant_within_frame() {
        let data = build_jpeg(&scan_of(4_000), true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packetizer = MjpegPacketizer::new(600);
        let mut rtp = header();

        rtp.advance_to(0);
        let first = packetizer.packetize(&mut rtp, &jpeg);
        rtp.advance_to(100);
        let second = packetizer.packetize(&mut rtp, &jpeg);

        assert!(first.iter().all(|p| p[4..8] == first[0][4..8]));
        assert!(second.iter().all(|p| p[4..8] == second[0][4..8]));
        let ts1 = u32::from_be_bytes([first[0][4], first[0][5], first[0][6], first[0][7]]);
        let ts2 = u32::from_be_bytes([second[0][4], second[0][5], second[0][6], second[0][7]]);
        assert_eq!(ts2.wrapping_sub(ts1), 9000);
    }

    #[test]
    fn fifty_kilobyte_frame_at_2048() {
        let scan = scan_of(50_000);
        let data = build_jpeg(&scan, false);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packets = MjpegPacketizer::new(2048).packetize(&mut header(), &jpeg);

        let per_packet = 2048 - BASE_HEADER;
        assert_eq!(packets.len(), 50_000usize.div_ceil(per_packet));
        assert!(packets.iter().all(|p| p.len() <= 2048));
        let total: usize = packets.iter().map(|p| p.len() - BASE_HEADER).sum();
        assert_eq!(total, 50_000);
    }

    #[test]
    fn restart_header_in_every_packet() {
        let scan = scan_of(2_000);
        let data = build_jpeg(&scan, true);
        let mut jpeg = JpegDescriptor::parse(&data).unwrap();
        jpeg.restart_interval = 4;
        let packets = MjpegPacketizer::new(600).packetize(&mut header(), &jpeg);

        let mut reassembled = Vec::new();
        for p in &packets {
            assert_eq!(p[16], 64);
            assert_eq!(&p[20..24], &[0x00, 0x04, 0xFF, 0xFF]);
            reassembled.extend_from_slice(payload(p, true));
        }
        assert_eq!(reassembled, scan);
    }

    #[test]
    fn fragment_call_reports_progress() {
        let data = build_jpeg(&scan_of(1_500), false);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        let packetizer = MjpegPacketizer::new(1000);
        let mut rtp = header();
        let mut packet = Vec::new();

        let next = packetizer.packetize_fragment(&mut rtp, &jpeg, 0, &mut packet);
        assert_eq!(next, 1000 - BASE_HEADER);
        assert!(!has_marker(&packet));

        let done = packetizer.packetize_fragment(&mut rtp, &jpeg, next, &mut packet);
        assert_eq!(done, 0);
        assert!(has_marker(&packet));

        assert_eq!(packetizer.packetize_fragment(&mut rtp, &jpeg, 1_500, &mut packet), 0);
        assert!(packet.is_empty());
    }

    #[test]
    fn packet_size_is_clamped() {
        assert_eq!(MjpegPacketizer::new(10).max_packet_size(), MIN_PACKET_SIZE);
        assert_eq!(MjpegPacketizer::new(9000).max_packet_size(), RTP_BUFFER_SIZE);
    }

    #[test]
    fn sdp_attributes_name_jpeg() {
        let attrs = MjpegPacketizer::default().sdp_attributes();
        assert_eq!(attrs[0], "a=rtpmap:26 JPEG/90000");
        assert!(attrs.contains(&"a=control:track1".to_string()));
    }
}
