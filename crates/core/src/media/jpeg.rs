//! JPEG container parsing for RFC 2435 payloads.
//!
//! A JPEG file wraps the entropy-coded scan in marker segments (JFIF/EXIF
//! application data, Huffman and quantization tables, frame and scan headers).
//! RFC 2435 receivers rebuild those headers themselves from the RTP/JPEG
//! header, so only two things leave the device:
//!
//! - the quantization tables (sent once per frame when Q ≥ 128), and
//! - the scan data between the SOS header and the trailing EOI marker.
//!
//! ```text
//! FFD8 | FFE0 len APP0 ... | FFDB len DQT ... | FFC0 len SOF0 ... | FFDA len SOS | scan ... | FFD9
//! SOI    skipped             recorded            recorded           scan start     payload    dropped
//! ```

use crate::error::{Result, RtspError};

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const TEM: u8 = 0x01;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

/// Largest width/height representable in the 8-bit block fields of the
/// RTP/JPEG header (255 × 8).
pub const MAX_DIMENSION: u16 = 2040;

/// Largest scan addressable by the 24-bit fragment offset.
pub const MAX_SCAN_LEN: usize = 1 << 24;

/// Length of one 8-bit precision quantization table.
pub const QUANT_TABLE_LEN: usize = 64;

/// Offset added to the RTP/JPEG type when restart markers are present
/// (RFC 2435 §3.1.3).
const RESTART_TYPE_OFFSET: u8 = 64;

/// The parts of a JPEG frame that RFC 2435 transmits.
///
/// Borrowed from the frame buffer; recomputed for every frame and never kept
/// past the streaming call.
#[derive(Debug, Clone)]
pub struct JpegDescriptor<'a> {
    /// Entropy-coded scan data (the RTP payload).
    pub scan: &'a [u8],
    /// 8-bit quantization tables by table index (0 = luma, 1 = chroma).
    pub quant_tables: [Option<&'a [u8]>; 2],
    /// Image width in pixels from SOF0, or 0 when unknown.
    pub width: u16,
    /// Image height in pixels from SOF0, or 0 when unknown.
    pub height: u16,
    /// RFC 2435 base type: 0 for 4:2:2, 1 for 4:2:0.
    pub jpeg_type: u8,
    /// Restart interval from DRI, 0 when the scan has no restart markers.
    pub restart_interval: u16,
    /// Container bytes discarded in front of the scan.
    pub header_len: usize,
    /// Bytes discarded after the scan (EOI plus any padding).
    pub trailer_len: usize,
}

impl<'a> JpegDescriptor<'a> {
    /// Parse a complete JPEG buffer.
    ///
    /// Returns [`RtspError::MalformedJpeg`] when the buffer has no start of
    /// image, a segment runs past the end, or no start-of-scan is found.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 4 || data[0] != MARKER_PREFIX || data[1] != SOI {
            return Err(RtspError::MalformedJpeg("missing start-of-image marker"));
        }

        let mut quant_tables: [Option<&'a [u8]>; 2] = [None, None];
        let mut width = 0u16;
        let mut height = 0u16;
        let mut jpeg_type = 0u8;
        let mut restart_interval = 0u16;
        let mut pos = 2usize;

        loop {
            if pos >= data.len() {
                return Err(RtspError::MalformedJpeg("no start-of-scan marker"));
            }
            if data[pos] != MARKER_PREFIX {
                return Err(RtspError::MalformedJpeg("expected marker between segments"));
            }
            // Any number of 0xFF fill bytes may precede the marker type.
            while pos < data.len() && data[pos] == MARKER_PREFIX {
                pos += 1;
            }
            let Some(&marker) = data.get(pos) else {
                return Err(RtspError::MalformedJpeg("no start-of-scan marker"));
            };
            pos += 1;

            match marker {
                SOI | TEM | RST0..=RST7 => continue,
                EOI => return Err(RtspError::MalformedJpeg("end-of-image before start-of-scan")),
                _ => {}
            }

            let segment_len = match data.get(pos..pos + 2) {
                Some(len) => u16::from_be_bytes([len[0], len[1]]) as usize,
                None => return Err(RtspError::MalformedJpeg("truncated segment length")),
            };
            if segment_len < 2 || pos + segment_len > data.len() {
                return Err(RtspError::MalformedJpeg("segment runs past end of buffer"));
            }
            let body = &data[pos + 2..pos + segment_len];

            match marker {
                DQT => parse_quant_tables(body, &mut quant_tables)?,
                SOF0 | SOF1 => {
                    (width, height, jpeg_type) = parse_frame_header(body)?;
                }
                SOF2 => return Err(RtspError::MalformedJpeg("progressive JPEG is not supported")),
                DRI => {
                    if body.len() >= 2 {
                        restart_interval = u16::from_be_bytes([body[0], body[1]]);
                    }
                }
                SOS => {
                    let scan_start = pos + segment_len;
                    return Self::from_scan(
                        data,
                        scan_start,
                        quant_tables,
                        (width, height),
                        jpeg_type,
                        restart_interval,
                    );
                }
                other => {
                    tracing::trace!(marker = format_args!("{:#04X}", other), len = segment_len, "skipping JPEG segment");
                }
            }

            pos += segment_len;
        }
    }

    fn from_scan(
        data: &'a [u8],
        scan_start: usize,
        quant_tables: [Option<&'a [u8]>; 2],
        (width, height): (u16, u16),
        jpeg_type: u8,
        restart_interval: u16,
    ) -> Result<Self> {
        let tail = &data[scan_start..];
        // Scan data never contains FF D9: entropy-coded 0xFF bytes are always
        // followed by 0x00 or an RSTn marker.
        let scan_len = tail
            .windows(2)
            .rposition(|w| w == [MARKER_PREFIX, EOI])
            .unwrap_or_else(|| {
                tracing::trace!("JPEG has no end-of-image marker, sending to end of buffer");
                tail.len()
            });

        if scan_len == 0 {
            return Err(RtspError::MalformedJpeg("empty scan"));
        }
        if scan_len >= MAX_SCAN_LEN {
            return Err(RtspError::MalformedJpeg("scan exceeds 24-bit fragment offset"));
        }

        Ok(Self {
            scan: &tail[..scan_len],
            quant_tables,
            width,
            height,
            jpeg_type,
            restart_interval,
            header_len: scan_start,
            trailer_len: tail.len() - scan_len,
        })
    }

    /// Fill in or cross-check the size against what the frame source declared.
    ///
    /// SOF0 wins when both are known; a disagreement is only logged.
    pub fn reconcile_dimensions(&mut self, declared_width: u16, declared_height: u16) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            self.width = declared_width;
            self.height = declared_height;
        } else if declared_width != 0
            && (declared_width, declared_height) != (self.width, self.height)
        {
            tracing::debug!(
                frame_width = self.width,
                frame_height = self.height,
                declared_width,
                declared_height,
                "JPEG size differs from source size"
            );
        }

        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(RtspError::MalformedJpeg("image larger than 2040 pixels"));
        }
        Ok(())
    }

    /// Width in 8-pixel blocks, as carried in the RTP/JPEG header.
    pub fn width_blocks(&self) -> u8 {
        self.width.min(MAX_DIMENSION).div_ceil(8) as u8
    }

    /// Height in 8-pixel blocks, as carried in the RTP/JPEG header.
    pub fn height_blocks(&self) -> u8 {
        self.height.min(MAX_DIMENSION).div_ceil(8) as u8
    }

    /// Type field for the RTP/JPEG header, including the restart offset.
    pub fn rtp_type(&self) -> u8 {
        if self.restart_interval > 0 {
            self.jpeg_type + RESTART_TYPE_OFFSET
        } else {
            self.jpeg_type
        }
    }

    /// Whether the frame carries its own quantization tables.
    pub fn has_quant_tables(&self) -> bool {
        self.quant_tables.iter().any(Option::is_some)
    }

    /// Present tables in index order.
    pub fn quant_tables(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.quant_tables.iter().flatten().copied()
    }

    /// Total bytes of table data (the quantization header's length field).
    pub fn quant_len(&self) -> usize {
        self.quant_tables().map(<[u8]>::len).sum()
    }
}

/// Record 8-bit tables 0 and 1 from a DQT segment body.
///
/// A single DQT segment may define several tables back to back.
fn parse_quant_tables<'a>(mut body: &'a [u8], tables: &mut [Option<&'a [u8]>; 2]) -> Result<()> {
    while let Some((&pq_tq, rest)) = body.split_first() {
        let precision = pq_tq >> 4;
        let id = (pq_tq & 0x0F) as usize;
        let size = if precision == 0 {
            QUANT_TABLE_LEN
        } else {
            QUANT_TABLE_LEN * 2
        };
        if rest.len() < size {
            return Err(RtspError::MalformedJpeg("truncated quantization table"));
        }

        if precision == 0 && id < tables.len() {
            tables[id] = Some(&rest[..size]);
        } else {
            tracing::debug!(id, precision, "ignoring quantization table");
        }
        body = &rest[size..];
    }
    Ok(())
}

/// Extract (width, height, RFC 2435 type) from a SOF0/SOF1 body.
fn parse_frame_header(body: &[u8]) -> Result<(u16, u16, u8)> {
    if body.len() < 6 {
        return Err(RtspError::MalformedJpeg("truncated frame header"));
    }
    let height = u16::from_be_bytes([body[1], body[2]]);
    let width = u16::from_be_bytes([body[3], body[4]]);
    let components = body[5] as usize;

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RtspError::MalformedJpeg("image larger than 2040 pixels"));
    }

    // The first component is luma; its sampling factors pick the type.
    let jpeg_type = match body.get(6..6 + 3 * components.min(1)) {
        Some([_, 0x21, _]) => 0,
        Some([_, 0x22, _]) => 1,
        Some([_, sampling, _]) => {
            tracing::debug!(sampling = format_args!("{:#04X}", sampling), "unusual luma sampling, sending as type 0");
            0
        }
        _ => 0,
    };

    Ok((width, height, jpeg_type))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a minimal baseline JPEG around `scan`.
    pub(crate) fn build_jpeg(scan: &[u8], with_tables: bool) -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        // APP0 / JFIF
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
        if with_tables {
            out.extend_from_slice(&[0xFF, DQT, 0x00, 0x84, 0x00]);
            out.extend_from_slice(&[0x10; 64]);
            out.push(0x01);
            out.extend_from_slice(&[0x11; 64]);
        }
        // SOF0 640x480, Y 2x1, Cb/Cr 1x1
        out.extend_from_slice(&[0xFF, SOF0, 0x00, 0x11, 8, 0x01, 0xE0, 0x02, 0x80, 3]);
        out.extend_from_slice(&[1, 0x21, 0, 2, 0x11, 1, 3, 0x11, 1]);
        // SOS
        out.extend_from_slice(&[0xFF, SOS, 0x00, 0x0C, 3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 63, 0]);
        out.extend_from_slice(scan);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    #[test]
    fn extracts_scan_and_tables() {
        let scan = [0x12, 0x34, 0xFF, 0x00, 0x56];
        let data = build_jpeg(&scan, true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();

        assert_eq!(jpeg.scan, &scan);
        assert_eq!(jpeg.quant_tables[0], Some(&[0x10; 64][..]));
        assert_eq!(jpeg.quant_tables[1], Some(&[0x11; 64][..]));
        assert_eq!(jpeg.quant_len(), 128);
        assert_eq!((jpeg.width, jpeg.height), (640, 480));
        assert_eq!((jpeg.width_blocks(), jpeg.height_blocks()), (80, 60));
        assert_eq!(jpeg.rtp_type(), 0);
    }

    #[test]
    fn accounts_for_every_byte() {
        let scan = vec![0x5A; 1000];
        let data = build_jpeg(&scan, true);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        assert_eq!(jpeg.header_len + jpeg.scan.len() + jpeg.trailer_len, data.len());
        assert_eq!(jpeg.trailer_len, 2);
    }

    #[test]
    fn padding_after_eoi_is_dropped() {
        let mut data = build_jpeg(&[1, 2, 3], false);
        data.extend_from_slice(&[0, 0, 0, 0]);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        assert_eq!(jpeg.scan, &[1, 2, 3]);
        assert_eq!(jpeg.trailer_len, 6);
    }

    #[test]
    fn missing_tables_are_allowed() {
        let data = build_jpeg(&[9, 9], false);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        assert!(!jpeg.has_quant_tables());
        assert_eq!(jpeg.quant_len(), 0);
    }

    #[test]
    fn missing_soi_is_malformed() {
        let mut data = build_jpeg(&[1], true);
        data[1] = 0xD9;
        assert!(matches!(
            JpegDescriptor::parse(&data),
            Err(RtspError::MalformedJpeg(_))
        ));
    }

    #[test]
    fn missing_sos_is_malformed() {
        let data = [0xFF, SOI, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        assert!(matches!(
            JpegDescriptor::parse(&data),
            Err(RtspError::MalformedJpeg("no start-of-scan marker"))
        ));
    }

    #[test]
    fn eoi_before_sos_is_malformed() {
        let data = [0xFF, SOI, 0xFF, EOI, 0x00, 0x00];
        assert!(JpegDescriptor::parse(&data).is_err());
    }

    #[test]
    fn overlong_segment_is_malformed() {
        let data = [0xFF, SOI, 0xFF, 0xE1, 0x40, 0x00, 0x01, 0x02];
        assert!(matches!(
            JpegDescriptor::parse(&data),
            Err(RtspError::MalformedJpeg("segment runs past end of buffer"))
        ));
    }

    #[test]
    fn empty_scan_is_malformed() {
        let data = build_jpeg(&[], true);
        assert!(JpegDescriptor::parse(&data).is_err());
    }

    #[test]
    fn progressive_is_rejected() {
        let mut data = build_jpeg(&[1, 2], false);
        let sof = data.iter().position(|&b| b == SOF0).unwrap();
        data[sof] = SOF2;
        assert!(JpegDescriptor::parse(&data).is_err());
    }

    #[test]
    fn fill_bytes_before_marker_are_skipped() {
        let data = build_jpeg(&[7, 7], true);
        let mut padded = data[..2].to_vec();
        padded.extend_from_slice(&[0xFF, 0xFF]);
        padded.extend_from_slice(&data[2..]);
        let jpeg = JpegDescriptor::parse(&padded).unwrap();
        assert_eq!(jpeg.scan, &[7, 7]);
    }

    #[test]
    fn sampling_420_is_type_1() {
        let mut data = build_jpeg(&[1], false);
        let sof = data.iter().position(|&b| b == SOF0).unwrap();
        // marker, len(2), precision, h(2), w(2), count, id, sampling
        data[sof + 10] = 0x22;
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        assert_eq!(jpeg.rtp_type(), 1);
    }

    #[test]
    fn restart_interval_offsets_type() {
        let data = build_jpeg(&[1, 2], false);
        let mut with_dri = data[..2].to_vec();
        with_dri.extend_from_slice(&[0xFF, DRI, 0x00, 0x04, 0x00, 0x10]);
        with_dri.extend_from_slice(&data[2..]);
        let jpeg = JpegDescriptor::parse(&with_dri).unwrap();
        assert_eq!(jpeg.restart_interval, 16);
        assert_eq!(jpeg.rtp_type(), 64);
    }

    #[test]
    fn sixteen_bit_tables_are_ignored() {
        let mut data = vec![0xFF, SOI, 0xFF, DQT, 0x00, 0x83, 0x10];
        data.extend_from_slice(&[0x01; 128]);
        data.extend_from_slice(&[0xFF, SOS, 0x00, 0x08, 1, 1, 0, 0, 63, 0]);
        data.extend_from_slice(&[0xAB, 0xFF, EOI]);
        let jpeg = JpegDescriptor::parse(&data).unwrap();
        assert!(!jpeg.has_quant_tables());
        assert_eq!(jpeg.scan, &[0xAB]);
    }

    #[test]
    fn declared_size_fills_unknown_dimensions() {
        let mut data = vec![0xFF, SOI];
        data.extend_from_slice(&[0xFF, SOS, 0x00, 0x08, 1, 1, 0, 0, 63, 0, 0x42, 0xFF, EOI]);
        let mut jpeg = JpegDescriptor::parse(&data).unwrap();
        assert_eq!(jpeg.width, 0);
        jpeg.reconcile_dimensions(320, 240).unwrap();
        assert_eq!((jpeg.width_blocks(), jpeg.height_blocks()), (40, 30));
    }

    #[test]
    fn frame_size_wins_over_declared() {
        let data = build_jpeg(&[1], false);
        let mut jpeg = JpegDescriptor::parse(&data).unwrap();
        jpeg.reconcile_dimensions(320, 240).unwrap();
        assert_eq!((jpeg.width, jpeg.height), (640, 480));
    }
}
