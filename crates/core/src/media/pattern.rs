//! Synthetic baseline JPEG frames for running without a camera.
//!
//! Each frame is a 4:2:0 image of vertical grey bars whose brightness
//! rotates from frame to frame. Every 8×8 block is flat (DC only), so the
//! entropy coder reduces to DC differences plus an end-of-block code, which
//! keeps the encoder tiny while the output stays a standard JFIF file that
//! any decoder (and any RFC 2435 receiver using the default tables) accepts.

use std::sync::OnceLock;

/// Number of vertical bars in the pattern, also the length of the cycle.
pub const BAR_COUNT: usize = 8;

/// Largest supported side, a multiple of the 16-pixel MCU below 2040.
const MAX_SIDE: u16 = 2032;

const LUMA_QUANT: u8 = 16;
const CHROMA_QUANT: u8 = 17;

// ITU-T T.81 Annex K.3 tables: code counts per length 1..=16, then values.
const DC_LUMA_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_LUMA_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const DC_CHROMA_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const DC_CHROMA_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const AC_LUMA_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7D];
#[rustfmt::skip]
const AC_LUMA_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08,
    0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16,
    0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7,
    0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
    0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5,
    0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4,
    0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
    0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA,
    0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8,
    0xF9, 0xFA,
];

const AC_CHROMA_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
#[rustfmt::skip]
const AC_CHROMA_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xA1, 0xB1, 0xC1, 0x09, 0x23, 0x33, 0x52, 0xF0,
    0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24, 0x34,
    0xE1, 0x25, 0xF1, 0x17, 0x18, 0x19, 0x1A, 0x26,
    0x27, 0x28, 0x29, 0x2A, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7A, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5,
    0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4,
    0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3,
    0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2,
    0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA,
    0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9,
    0xEA, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8,
    0xF9, 0xFA,
];

const EOB: u8 = 0x00;

/// One Huffman code: the bit pattern right-aligned in `bits`, and its length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Code {
    bits: u16,
    len: u8,
}

/// Encoder-side lookup from symbol to code.
struct HuffmanTable {
    codes: [Code; 256],
}

impl HuffmanTable {
    /// Assign canonical codes (T.81 Annex C) from a BITS/HUFFVAL pair.
    fn new(counts: &[u8; 16], values: &[u8]) -> Self {
        let mut codes = [Code::default(); 256];
        let mut code = 0u16;
        let mut k = 0;
        for (i, &count) in counts.iter().enumerate() {
            let len = i as u8 + 1;
            for _ in 0..count {
                codes[values[k] as usize] = Code { bits: code, len };
                code += 1;
                k += 1;
            }
            code <<= 1;
        }
        Self { codes }
    }

    fn code(&self, symbol: u8) -> Code {
        self.codes[symbol as usize]
    }
}

struct Tables {
    dc_luma: HuffmanTable,
    dc_chroma: HuffmanTable,
    ac_luma: HuffmanTable,
    ac_chroma: HuffmanTable,
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        dc_luma: HuffmanTable::new(&DC_LUMA_BITS, &DC_LUMA_VALUES),
        dc_chroma: HuffmanTable::new(&DC_CHROMA_BITS, &DC_CHROMA_VALUES),
        ac_luma: HuffmanTable::new(&AC_LUMA_BITS, &AC_LUMA_VALUES),
        ac_chroma: HuffmanTable::new(&AC_CHROMA_BITS, &AC_CHROMA_VALUES),
    })
}

/// MSB-first bit packer with JPEG byte stuffing.
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    count: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            count: 0,
        }
    }

    fn put(&mut self, bits: u16, len: u8) {
        for i in (0..len).rev() {
            self.acc = (self.acc << 1) | u32::from((bits >> i) & 1);
            self.count += 1;
            if self.count == 8 {
                self.emit(self.acc as u8);
                self.acc = 0;
                self.count = 0;
            }
        }
    }

    fn put_code(&mut self, code: Code) {
        self.put(code.bits, code.len);
    }

    fn emit(&mut self, byte: u8) {
        self.out.push(byte);
        if byte == 0xFF {
            self.out.push(0x00);
        }
    }

    /// Pad the final byte with 1-bits and return the scan.
    fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            let pad = 8 - self.count;
            self.put((1 << pad) - 1, pad);
        }
        self.out
    }
}

/// Encode one flat block: a DC difference followed by end-of-block.
fn encode_block(w: &mut BitWriter, dc: &HuffmanTable, ac: &HuffmanTable, diff: i16) {
    let magnitude = diff.unsigned_abs();
    let category = (16 - magnitude.leading_zeros()) as u8;
    w.put_code(dc.code(category));
    if category > 0 {
        let extra = if diff < 0 {
            (diff - 1) as u16 & ((1 << category) - 1)
        } else {
            diff as u16
        };
        w.put(extra, category);
    }
    w.put_code(ac.code(EOB));
}

/// Quantized DC level of a bar, centred on mid grey.
fn bar_level(bar: usize) -> i16 {
    (bar as i16 * 2 - (BAR_COUNT as i16 - 1)) * 6
}

/// Encode one frame of the pattern, shifted by `phase` bars.
pub fn encode_frame(width: u16, height: u16, phase: usize) -> Vec<u8> {
    let (width, height) = padded_size(width, height);
    let mcus_x = usize::from(width / 16);
    let mcus_y = usize::from(height / 16);
    let t = tables();

    let mut scan = BitWriter::new();
    let mut prev_dc = 0i16;
    for _ in 0..mcus_y {
        for mx in 0..mcus_x {
            let bar = mx * BAR_COUNT / mcus_x;
            let level = bar_level((bar + phase) % BAR_COUNT);
            // Four luma blocks share the level; only the first changes it.
            encode_block(&mut scan, &t.dc_luma, &t.ac_luma, level - prev_dc);
            for _ in 0..3 {
                encode_block(&mut scan, &t.dc_luma, &t.ac_luma, 0);
            }
            prev_dc = level;
            // Neutral chroma.
            encode_block(&mut scan, &t.dc_chroma, &t.ac_chroma, 0);
            encode_block(&mut scan, &t.dc_chroma, &t.ac_chroma, 0);
        }
    }
    let scan = scan.finish();

    let mut out = Vec::with_capacity(scan.len() + 700);
    out.extend_from_slice(&[0xFF, 0xD8]);
    // APP0 JFIF 1.1, no density, no thumbnail.
    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
    // DQT with both 8-bit tables.
    out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x84, 0x00]);
    out.extend_from_slice(&[LUMA_QUANT; 64]);
    out.push(0x01);
    out.extend_from_slice(&[CHROMA_QUANT; 64]);
    // SOF0: 8-bit, three components, Y 2x2 / Cb 1x1 / Cr 1x1.
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 8]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    write_dht(&mut out, 0x00, &DC_LUMA_BITS, &DC_LUMA_VALUES);
    write_dht(&mut out, 0x10, &AC_LUMA_BITS, &AC_LUMA_VALUES);
    write_dht(&mut out, 0x01, &DC_CHROMA_BITS, &DC_CHROMA_VALUES);
    write_dht(&mut out, 0x11, &AC_CHROMA_BITS, &AC_CHROMA_VALUES);
    // SOS
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 63, 0]);
    out.extend_from_slice(&scan);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn write_dht(out: &mut Vec<u8>, class_id: u8, counts: &[u8; 16], values: &[u8]) {
    let len = 2 + 1 + counts.len() + values.len();
    out.extend_from_slice(&[0xFF, 0xC4]);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.push(class_id);
    out.extend_from_slice(counts);
    out.extend_from_slice(values);
}

/// Frame size actually produced for a requested size: whole MCUs, at most 2032.
pub fn padded_size(width: u16, height: u16) -> (u16, u16) {
    let pad = |side: u16| side.clamp(16, MAX_SIDE).div_ceil(16) * 16;
    (pad(width), pad(height))
}

/// Full cycle of pattern frames at the given size (rounded up to 16 pixels).
pub fn test_pattern(width: u16, height: u16) -> Vec<Vec<u8>> {
    tracing::debug!(width, height, frames = BAR_COUNT, "generating test pattern");
    (0..BAR_COUNT)
        .map(|phase| encode_frame(width, height, phase))
        .collect()
}
