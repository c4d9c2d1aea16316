//! Encoders for small test images
//!
//! PNGs come from the `png` crate or a raw chunk writer; GIF, BMP and PNM
//! files are assembled byte by byte so edge cases can be expressed
//! directly.

#![allow(dead_code)]

use zenscan::{Codec, GrowingStream};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic RGBA test pattern.
pub fn rgba_pattern(width: u32, height: u32) -> Vec<u8> {
    let mut v = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            v.extend_from_slice(&[
                (x * 37 + y * 11) as u8,
                (x * 5 + y * 23) as u8,
                (x ^ y).wrapping_mul(13) as u8,
                if (x + y) % 3 == 0 { 255 } else { (x * 40 + 30) as u8 },
            ]);
        }
    }
    v
}

/// Opaque RGB test pattern.
pub fn rgb_pattern(width: u32, height: u32) -> Vec<u8> {
    rgba_pattern(width, height)
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect()
}

/// Drop the alpha of an RGBA buffer, returning opaque RGBA.
pub fn opaque(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect()
}

/// Encode with the `png` crate.
pub fn png_encode(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
        writer.finish().unwrap();
    }
    out
}

pub fn png_rgba(width: u32, height: u32, data: &[u8]) -> Vec<u8> {
    png_encode(width, height, png::ColorType::Rgba, data)
}

pub fn png_rgb(width: u32, height: u32, data: &[u8]) -> Vec<u8> {
    png_encode(width, height, png::ColorType::Rgb, data)
}

pub fn png_gray(width: u32, height: u32, data: &[u8]) -> Vec<u8> {
    png_encode(width, height, png::ColorType::Grayscale, data)
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= u32::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// Chunk-level PNG writer for headers the `png` crate will not produce.
pub struct RawPng {
    out: Vec<u8>,
}

impl RawPng {
    pub fn new(width: u32, height: u32, depth: u8, color_type: u8, interlace: u8) -> Self {
        let mut png = Self {
            out: b"\x89PNG\r\n\x1a\n".to_vec(),
        };
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[depth, color_type, 0, 0, interlace]);
        png.chunk(b"IHDR", &ihdr);
        png
    }

    pub fn chunk(&mut self, kind: &[u8; 4], body: &[u8]) -> &mut Self {
        self.out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        let start = self.out.len();
        self.out.extend_from_slice(kind);
        self.out.extend_from_slice(body);
        let crc = crc32(&self.out[start..]);
        self.out.extend_from_slice(&crc.to_be_bytes());
        self
    }

    /// Compress filtered rows and split them over IDAT chunks of `split` bytes.
    pub fn idat(&mut self, filtered: &[u8], split: usize) -> &mut Self {
        let z = miniz_oxide::deflate::compress_to_vec_zlib(filtered, 6);
        for part in z.chunks(split.max(1)) {
            self.chunk(b"IDAT", part);
        }
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.chunk(b"IEND", &[]);
        std::mem::take(&mut self.out)
    }
}

/// Prefix every row with filter type 0.
pub fn unfiltered(rows: &[u8], row_len: usize) -> Vec<u8> {
    rows.chunks_exact(row_len)
        .flat_map(|r| std::iter::once(0).chain(r.iter().copied()))
        .collect()
}

/// eXIf body holding only an orientation tag.
pub fn exif_orientation(value: u16) -> Vec<u8> {
    let mut v = b"II*\0".to_vec();
    v.extend_from_slice(&8u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&0x0112u16.to_le_bytes());
    v.extend_from_slice(&3u16.to_le_bytes());
    v.extend_from_slice(&1u32.to_le_bytes());
    v.extend_from_slice(&value.to_le_bytes());
    v.extend_from_slice(&[0, 0]);
    v.extend_from_slice(&0u32.to_le_bytes());
    v
}

/// One frame of a test GIF; `indices` are in row order.
#[derive(Clone, Debug)]
pub struct GifFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: Vec<u8>,
    pub transparent: Option<u8>,
    /// GIF disposal code: 1 keep, 2 background, 3 previous
    pub disposal: u8,
    pub delay_cs: u16,
    pub interlaced: bool,
}

impl GifFrame {
    pub fn new(left: u16, top: u16, width: u16, height: u16, indices: Vec<u8>) -> Self {
        assert_eq!(indices.len(), usize::from(width) * usize::from(height));
        Self {
            left,
            top,
            width,
            height,
            indices,
            transparent: None,
            disposal: 1,
            delay_cs: 10,
            interlaced: false,
        }
    }

    pub fn filled(left: u16, top: u16, width: u16, height: u16, index: u8) -> Self {
        let n = usize::from(width) * usize::from(height);
        Self::new(left, top, width, height, vec![index; n])
    }
}

/// Literal-only LZW with 8-bit minimum code size.
///
/// A clear code every 200 literals keeps every code 9 bits wide.
fn lzw_literals(indices: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut bits = 0u32;
    let mut nbits = 0;
    let mut emit = |code: u16, out: &mut Vec<u8>| {
        bits |= u32::from(code) << nbits;
        nbits += 9;
        while nbits >= 8 {
            out.push(bits as u8);
            bits >>= 8;
            nbits -= 8;
        }
    };
    for chunk in indices.chunks(200) {
        emit(256, &mut out);
        for &i in chunk {
            emit(u16::from(i), &mut out);
        }
    }
    emit(257, &mut out);
    if nbits > 0 {
        out.push(bits as u8);
    }
    out
}

fn interlace_order(height: usize) -> Vec<usize> {
    let mut rows = Vec::with_capacity(height);
    for (start, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        rows.extend((start..height).step_by(step));
    }
    rows
}

fn sub_blocks(data: &[u8], out: &mut Vec<u8>) {
    for block in data.chunks(255) {
        out.push(block.len() as u8);
        out.extend_from_slice(block);
    }
    out.push(0);
}

/// Assemble a GIF89a with a global palette.
pub fn gif(
    width: u16,
    height: u16,
    palette: &[[u8; 3]],
    loop_count: Option<u16>,
    frames: &[GifFrame],
) -> Vec<u8> {
    let mut size_bits = 0u8;
    while (2usize << size_bits) < palette.len() {
        size_bits += 1;
    }
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&[0x80 | size_bits, 0, 0]);
    for i in 0..(2usize << size_bits) {
        out.extend_from_slice(palette.get(i).unwrap_or(&[0, 0, 0]));
    }
    if let Some(n) = loop_count {
        out.extend_from_slice(&[0x21, 0xFF, 11]);
        out.extend_from_slice(b"NETSCAPE2.0");
        out.extend_from_slice(&[3, 1]);
        out.extend_from_slice(&n.to_le_bytes());
        out.push(0);
    }
    for f in frames {
        let packed = (f.disposal << 2) | u8::from(f.transparent.is_some());
        out.extend_from_slice(&[0x21, 0xF9, 4, packed]);
        out.extend_from_slice(&f.delay_cs.to_le_bytes());
        out.extend_from_slice(&[f.transparent.unwrap_or(0), 0]);

        out.push(0x2C);
        for v in [f.left, f.top, f.width, f.height] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.push(if f.interlaced { 0x40 } else { 0 });

        let w = usize::from(f.width);
        let indices: Vec<u8> = if f.interlaced {
            interlace_order(usize::from(f.height))
                .into_iter()
                .flat_map(|y| f.indices[y * w..(y + 1) * w].iter().copied())
                .collect()
        } else {
            f.indices.clone()
        };
        out.push(8);
        sub_blocks(&lzw_literals(&indices), &mut out);
    }
    out.push(0x3B);
    out
}

/// 24-bit BMP from top-down RGB rows.
pub fn bmp_24(width: u32, height: u32, rgb: &[u8], top_down: bool) -> Vec<u8> {
    let stride = (width as usize * 3).div_ceil(4) * 4;
    let mut pixels = vec![0u8; stride * height as usize];
    for y in 0..height as usize {
        let row = if top_down { y } else { height as usize - 1 - y };
        for x in 0..width as usize {
            let s = (y * width as usize + x) * 3;
            let d = row * stride + x * 3;
            pixels[d..d + 3].copy_from_slice(&[rgb[s + 2], rgb[s + 1], rgb[s]]);
        }
    }
    bmp_file(width, height, 24, top_down, &[], &pixels)
}

/// 8-bit palette BMP from top-down index rows.
pub fn bmp_8(
    width: u32,
    height: u32,
    palette: &[[u8; 3]],
    indices: &[u8],
    top_down: bool,
) -> Vec<u8> {
    let stride = (width as usize).div_ceil(4) * 4;
    let mut pixels = vec![0u8; stride * height as usize];
    for y in 0..height as usize {
        let row = if top_down { y } else { height as usize - 1 - y };
        let w = width as usize;
        pixels[row * stride..row * stride + w].copy_from_slice(&indices[y * w..(y + 1) * w]);
    }
    bmp_file(width, height, 8, top_down, palette, &pixels)
}

fn bmp_file(
    width: u32,
    height: u32,
    bits: u16,
    top_down: bool,
    palette: &[[u8; 3]],
    pixels: &[u8],
) -> Vec<u8> {
    let offset = 14 + 40 + palette.len() * 4;
    let mut v = Vec::new();
    v.extend_from_slice(b"BM");
    v.extend_from_slice(&((offset + pixels.len()) as u32).to_le_bytes());
    v.extend_from_slice(&[0; 4]);
    v.extend_from_slice(&(offset as u32).to_le_bytes());
    v.extend_from_slice(&40u32.to_le_bytes());
    v.extend_from_slice(&(width as i32).to_le_bytes());
    let h = if top_down { -(height as i32) } else { height as i32 };
    v.extend_from_slice(&h.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&bits.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    v.extend_from_slice(&2835u32.to_le_bytes());
    v.extend_from_slice(&2835u32.to_le_bytes());
    v.extend_from_slice(&(palette.len() as u32).to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    for c in palette {
        v.extend_from_slice(&[c[2], c[1], c[0], 0]);
    }
    v.extend_from_slice(pixels);
    v
}

/// Move a BMP's pixel array `gap` bytes further from its headers.
pub fn with_pixel_gap(bmp: &[u8], gap: usize) -> Vec<u8> {
    let offset = u32::from_le_bytes([bmp[10], bmp[11], bmp[12], bmp[13]]) as usize;
    let mut v = bmp[..offset].to_vec();
    v.resize(offset + gap, 0);
    v.extend_from_slice(&bmp[offset..]);
    let len = v.len() as u32;
    v[2..6].copy_from_slice(&len.to_le_bytes());
    v[10..14].copy_from_slice(&((offset + gap) as u32).to_le_bytes());
    v
}

/// Binary PPM (P6) with maxval 255.
pub fn ppm(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    let mut v = format!("P6\n# test\n{width} {height}\n255\n").into_bytes();
    v.extend_from_slice(rgb);
    v
}

/// Binary PGM (P5) with the given maxval; 16-bit samples above 255.
pub fn pgm(width: u32, height: u32, maxval: u16, samples: &[u16]) -> Vec<u8> {
    let mut v = format!("P5 {width} {height} {maxval}\n").into_bytes();
    for &s in samples {
        if maxval > 255 {
            v.extend_from_slice(&s.to_be_bytes());
        } else {
            v.push(s as u8);
        }
    }
    v
}

/// Shortest prefix of `bytes` a codec can be created from.
pub fn codec_from_prefix(bytes: &[u8]) -> (Codec<GrowingStream>, usize) {
    for n in 1..=bytes.len() {
        if let Ok(codec) = Codec::new(GrowingStream::with_prefix(&bytes[..n])) {
            return (codec, n);
        }
    }
    panic!("no prefix of the image yields a codec");
}
