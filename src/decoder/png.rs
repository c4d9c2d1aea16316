//! PNG decoder (non-interlaced, bit depths 1-16)

use std::io::{Read, Seek};

use miniz_oxide::inflate::stream::{InflateState, inflate};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};
use rgb::Rgba;
use whereat::at;

use super::{Header, RowStep, corrupt, header_bytes, scale_to_8};
use crate::convert::RowLayout;
use crate::error::{Error, Result};
use crate::image::{ColorSpace, EncodedAlpha, EncodedColor, EncodedInfo};
use crate::origin::{Origin, origin_from_exif};
use crate::stream::Source;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// gAMA value meaning linear light
const GAMA_LINEAR: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorKind {
    Gray,
    Rgb,
    Palette,
    GrayAlpha,
    Rgba,
}

impl ColorKind {
    fn from_png(code: u8) -> Option<Self> {
        Some(match code {
            0 => ColorKind::Gray,
            2 => ColorKind::Rgb,
            3 => ColorKind::Palette,
            4 => ColorKind::GrayAlpha,
            6 => ColorKind::Rgba,
            _ => return None,
        })
    }

    fn channels(self) -> usize {
        match self {
            ColorKind::Gray | ColorKind::Palette => 1,
            ColorKind::GrayAlpha => 2,
            ColorKind::Rgb => 3,
            ColorKind::Rgba => 4,
        }
    }

    fn allows_depth(self, depth: u8) -> bool {
        match self {
            ColorKind::Gray => matches!(depth, 1 | 2 | 4 | 8 | 16),
            ColorKind::Palette => matches!(depth, 1 | 2 | 4 | 8),
            _ => matches!(depth, 8 | 16),
        }
    }
}

/// Transparent color key from `tRNS` for gray and RGB images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorKey {
    Gray(u16),
    Rgb(u16, u16, u16),
}

pub(crate) struct PngDecoder {
    width: u32,
    height: u32,
    kind: ColorKind,
    depth: u8,
    interlaced: bool,
    palette: Vec<Rgba<u8>>,
    key: Option<ColorKey>,
    layout: RowLayout,
    /// Offset of the first IDAT chunk
    data_offset: u64,

    inflater: Box<InflateState>,
    /// Compressed bytes left in the current IDAT
    chunk_left: u32,
    /// A CRC precedes the next chunk header
    after_chunk: bool,
    stream_end: bool,
    /// Filter byte plus packed samples
    cur: Vec<u8>,
    prev: Vec<u8>,
    filled: usize,
    row: u32,
}

impl PngDecoder {
    pub(crate) fn read_header<S: Read + Seek>(src: &mut Source<S>) -> Result<(Self, Header)> {
        if header_bytes(src, 8)? != SIGNATURE {
            return Err(at(Error::InvalidInput("bad PNG signature")));
        }

        let mut ihdr: Option<(u32, u32, ColorKind, u8, bool)> = None;
        let mut palette = Vec::new();
        let mut trns: Option<Vec<u8>> = None;
        let mut color_space = ColorSpace::Srgb;
        let mut origin = Origin::TopLeft;

        let data_offset = loop {
            let offset = src.offset();
            let head = header_bytes(src, 8)?;
            let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
            let kind = [head[4], head[5], head[6], head[7]];
            if len > MAX_CHUNK_LEN {
                return Err(at(Error::InvalidInput("PNG chunk too long")));
            }
            if ihdr.is_none() && &kind != b"IHDR" {
                return Err(at(Error::InvalidInput("first PNG chunk is not IHDR")));
            }
            if &kind == b"IDAT" {
                break offset;
            }
            let body = header_bytes(src, len as usize + 4)?;
            let body = &body[..len as usize];
            match &kind {
                b"IHDR" => {
                    if ihdr.is_some() || body.len() != 13 {
                        return Err(at(Error::InvalidInput("malformed IHDR")));
                    }
                    let width = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                    let height = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
                    let depth = body[8];
                    let kind = ColorKind::from_png(body[9])
                        .ok_or_else(|| at(Error::InvalidInput("unknown PNG color type")))?;
                    if !kind.allows_depth(depth) {
                        return Err(at(Error::InvalidInput("invalid PNG bit depth")));
                    }
                    if body[10] != 0 || body[11] != 0 || body[12] > 1 {
                        return Err(at(Error::InvalidInput("unknown PNG method")));
                    }
                    if width > MAX_CHUNK_LEN || height > MAX_CHUNK_LEN {
                        return Err(at(Error::InvalidInput("PNG dimensions out of range")));
                    }
                    ihdr = Some((width, height, kind, depth, body[12] == 1));
                }
                b"PLTE" => {
                    if body.len() % 3 != 0 || body.len() > 256 * 3 {
                        return Err(at(Error::InvalidInput("malformed PLTE")));
                    }
                    palette = body
                        .chunks_exact(3)
                        .map(|c| Rgba::new(c[0], c[1], c[2], 255))
                        .collect();
                }
                b"tRNS" => trns = Some(body.to_vec()),
                b"gAMA" if body.len() == 4 => {
                    let gamma = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                    if gamma == GAMA_LINEAR {
                        color_space = ColorSpace::Linear;
                    }
                }
                b"sRGB" => color_space = ColorSpace::Srgb,
                b"eXIf" => {
                    if let Some(o) = origin_from_exif(body) {
                        origin = o;
                    }
                }
                b"IEND" => return Err(at(Error::InvalidInput("PNG has no image data"))),
                _ => {}
            }
            src.discard_consumed();
        };

        let Some((width, height, kind, depth, interlaced)) = ihdr else {
            return Err(at(Error::InvalidInput("missing IHDR")));
        };
        if kind == ColorKind::Palette && palette.is_empty() {
            return Err(at(Error::InvalidInput("palette image without PLTE")));
        }

        let mut key = None;
        if let Some(t) = &trns {
            match kind {
                ColorKind::Palette => {
                    for (entry, &a) in palette.iter_mut().zip(t.iter()) {
                        entry.a = a;
                    }
                }
                ColorKind::Gray if t.len() >= 2 => {
                    key = Some(ColorKey::Gray(u16::from_be_bytes([t[0], t[1]])));
                }
                ColorKind::Rgb if t.len() >= 6 => {
                    key = Some(ColorKey::Rgb(
                        u16::from_be_bytes([t[0], t[1]]),
                        u16::from_be_bytes([t[2], t[3]]),
                        u16::from_be_bytes([t[4], t[5]]),
                    ));
                }
                _ => log::debug!("ignoring tRNS for PNG color type {kind:?}"),
            }
        }

        let (color, alpha, layout) = match kind {
            ColorKind::Gray if key.is_some() => {
                (EncodedColor::Gray, EncodedAlpha::Binary, RowLayout::GrayAlpha8)
            }
            ColorKind::Gray => (EncodedColor::Gray, EncodedAlpha::Opaque, RowLayout::Gray8),
            ColorKind::Rgb if key.is_some() => {
                (EncodedColor::Rgb, EncodedAlpha::Binary, RowLayout::Rgba8)
            }
            ColorKind::Rgb => (EncodedColor::Rgb, EncodedAlpha::Opaque, RowLayout::Rgb8),
            ColorKind::Palette => {
                let alpha = if palette.iter().all(|c| c.a == 255) {
                    EncodedAlpha::Opaque
                } else if palette.iter().all(|c| c.a == 0 || c.a == 255) {
                    EncodedAlpha::Binary
                } else {
                    EncodedAlpha::Unpremul
                };
                (EncodedColor::Palette, alpha, RowLayout::Index8)
            }
            ColorKind::GrayAlpha => (
                EncodedColor::GrayAlpha,
                EncodedAlpha::Unpremul,
                RowLayout::GrayAlpha8,
            ),
            ColorKind::Rgba => (EncodedColor::Rgba, EncodedAlpha::Unpremul, RowLayout::Rgba8),
        };
        let encoded = EncodedInfo {
            color,
            alpha,
            bits_per_component: depth,
        };
        let header = Header {
            width,
            height,
            encoded,
            layout,
            color_space,
            origin,
            has_alpha: encoded.has_alpha(),
        };
        log::debug!("PNG {width}x{height} {kind:?} depth {depth}, interlaced: {interlaced}");

        let stride = 1 + (width as usize * kind.channels() * usize::from(depth)).div_ceil(8);
        let decoder = Self {
            width,
            height,
            kind,
            depth,
            interlaced,
            palette,
            key,
            layout,
            data_offset,
            inflater: InflateState::new_boxed(DataFormat::Zlib),
            chunk_left: 0,
            after_chunk: false,
            stream_end: false,
            cur: vec![0; stride],
            prev: vec![0; stride],
            filled: 0,
            row: 0,
        };
        Ok((decoder, header))
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn palette(&self) -> &[Rgba<u8>] {
        &self.palette
    }

    pub(crate) fn start<S: Read + Seek>(&mut self, src: &mut Source<S>) -> Result<()> {
        if self.interlaced {
            return Err(at(Error::Unsupported("interlaced PNG")));
        }
        src.seek_to(self.data_offset)?;
        self.inflater = InflateState::new_boxed(DataFormat::Zlib);
        self.chunk_left = 0;
        self.after_chunk = false;
        self.stream_end = false;
        self.prev.fill(0);
        self.filled = 0;
        self.row = 0;
        Ok(())
    }

    pub(crate) fn next_row<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        out: &mut [u8],
    ) -> Result<RowStep> {
        if self.row >= self.height {
            return Ok(RowStep::Done);
        }
        while self.filled < self.cur.len() {
            let take = src.available().min(self.chunk_left as usize);
            let res = inflate(
                &mut self.inflater,
                &src.bytes()[..take],
                &mut self.cur[self.filled..],
                MZFlush::None,
            );
            src.consume(res.bytes_consumed);
            self.chunk_left -= res.bytes_consumed as u32;
            self.filled += res.bytes_written;
            match res.status {
                Ok(MZStatus::StreamEnd) => self.stream_end = true,
                Ok(_) | Err(MZError::Buf) => {}
                Err(_) => return Err(corrupt("corrupt deflate stream")),
            }
            if res.bytes_consumed > 0 || res.bytes_written > 0 {
                continue;
            }
            if self.stream_end {
                return Err(corrupt("image data ended early"));
            }
            if self.chunk_left > 0 {
                if !src.fill(1)? {
                    return Ok(RowStep::NeedData);
                }
                continue;
            }
            if !self.next_chunk(src)? {
                return Ok(RowStep::NeedData);
            }
        }

        self.unfilter()?;
        self.expand(out);
        std::mem::swap(&mut self.cur, &mut self.prev);
        self.filled = 0;
        src.discard_consumed();
        let y = self.row;
        self.row += 1;
        Ok(RowStep::Row(y))
    }

    /// Step over a CRC and into the next IDAT; `false` when starved.
    fn next_chunk<S: Read + Seek>(&mut self, src: &mut Source<S>) -> Result<bool> {
        let crc = if self.after_chunk { 4 } else { 0 };
        if !src.fill(crc + 8)? {
            return Ok(false);
        }
        let head = &src.bytes()[crc..crc + 8];
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        if &head[4..8] != b"IDAT" {
            return Err(corrupt("image data ended early"));
        }
        if len > MAX_CHUNK_LEN {
            return Err(corrupt("PNG chunk too long"));
        }
        src.consume(crc + 8);
        self.chunk_left = len;
        self.after_chunk = true;
        Ok(true)
    }

    fn filter_bpp(&self) -> usize {
        (self.kind.channels() * usize::from(self.depth) / 8).max(1)
    }

    fn unfilter(&mut self) -> Result<()> {
        let bpp = self.filter_bpp();
        let filter = self.cur[0];
        let cur = &mut self.cur[1..];
        let prev = &self.prev[1..];
        match filter {
            0 => {}
            1 => {
                for i in bpp..cur.len() {
                    cur[i] = cur[i].wrapping_add(cur[i - bpp]);
                }
            }
            2 => {
                for (c, &p) in cur.iter_mut().zip(prev) {
                    *c = c.wrapping_add(p);
                }
            }
            3 => {
                for i in 0..cur.len() {
                    let left = if i >= bpp { u16::from(cur[i - bpp]) } else { 0 };
                    cur[i] = cur[i].wrapping_add(((left + u16::from(prev[i])) / 2) as u8);
                }
            }
            4 => {
                for i in 0..cur.len() {
                    let (a, c) = if i >= bpp {
                        (cur[i - bpp], prev[i - bpp])
                    } else {
                        (0, 0)
                    };
                    cur[i] = cur[i].wrapping_add(paeth(a, prev[i], c));
                }
            }
            _ => return Err(corrupt("unknown PNG filter type")),
        }
        Ok(())
    }

    /// Sample `i` of the unfiltered row at the source bit depth.
    #[inline]
    fn sample(&self, i: usize) -> u16 {
        let raw = &self.cur[1..];
        match self.depth {
            16 => u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]),
            8 => u16::from(raw[i]),
            d => {
                let per_byte = 8 / usize::from(d);
                let byte = raw[i / per_byte];
                let shift = 8 - usize::from(d) * (i % per_byte + 1);
                u16::from((byte >> shift) & ((1u8 << d) - 1))
            }
        }
    }

    #[inline]
    fn sample8(&self, i: usize) -> u8 {
        let v = self.sample(i);
        match self.depth {
            16 => (v >> 8) as u8,
            8 => v as u8,
            d => scale_to_8(u32::from(v), (1u32 << d) - 1),
        }
    }

    /// Convert the unfiltered row into the native layout.
    fn expand(&self, out: &mut [u8]) {
        let w = self.width as usize;
        let bpp = self.layout.bytes_per_pixel();
        for x in 0..w {
            let px = &mut out[x * bpp..(x + 1) * bpp];
            match self.kind {
                ColorKind::Palette => px[0] = self.sample(x) as u8,
                ColorKind::Gray => {
                    px[0] = self.sample8(x);
                    if let Some(ColorKey::Gray(k)) = self.key {
                        px[1] = if self.sample(x) == k { 0 } else { 255 };
                    }
                }
                ColorKind::GrayAlpha => {
                    px[0] = self.sample8(2 * x);
                    px[1] = self.sample8(2 * x + 1);
                }
                ColorKind::Rgb => {
                    for c in 0..3 {
                        px[c] = self.sample8(3 * x + c);
                    }
                    if let Some(ColorKey::Rgb(r, g, b)) = self.key {
                        let color = (
                            self.sample(3 * x),
                            self.sample(3 * x + 1),
                            self.sample(3 * x + 2),
                        );
                        let hit = color == (r, g, b);
                        px[3] = if hit { 0 } else { 255 };
                    }
                }
                ColorKind::Rgba => {
                    for c in 0..4 {
                        px[c] = self.sample8(4 * x + c);
                    }
                }
            }
        }
    }
}

#[inline]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
