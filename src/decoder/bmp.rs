//! BMP decoder (uncompressed 1/4/8/24/32 bpp)

use std::io::{Read, Seek};

use rgb::Rgba;
use whereat::at;

use super::{Header, RowStep, ScanlineOrder, header_bytes};
use crate::convert::RowLayout;
use crate::error::{Error, Result};
use crate::image::{ColorSpace, EncodedAlpha, EncodedColor, EncodedInfo};
use crate::origin::Origin;
use crate::stream::Source;

const FILE_HEADER_LEN: usize = 14;

const BI_RGB: u32 = 0;
const BI_BITFIELDS: u32 = 3;
const BI_ALPHABITFIELDS: u32 = 6;

const MASK_R: u32 = 0x00FF_0000;
const MASK_G: u32 = 0x0000_FF00;
const MASK_B: u32 = 0x0000_00FF;
const MASK_A: u32 = 0xFF00_0000;

pub(crate) struct BmpDecoder {
    width: u32,
    height: u32,
    bits: u16,
    top_down: bool,
    palette: Vec<Rgba<u8>>,
    layout: RowLayout,
    data_offset: u64,
    stride: usize,
    row: u32,
    /// The cursor sits at the next row's bytes
    positioned: bool,
}

impl BmpDecoder {
    pub(crate) fn read_header<S: Read + Seek>(src: &mut Source<S>) -> Result<(Self, Header)> {
        let file = header_bytes(src, FILE_HEADER_LEN)?;
        if &file[..2] != b"BM" {
            return Err(at(Error::InvalidInput("bad BMP signature")));
        }
        let data_offset = u64::from(le32(&file[10..]));

        let dib_len = le32(header_bytes(src, 4)?) as usize;
        if !matches!(dib_len, 40 | 52 | 56 | 108 | 124) {
            return Err(at(Error::InvalidInput("unsupported BMP header size")));
        }
        let dib = header_bytes(src, dib_len - 4)?.to_vec();
        let width = le32(&dib[0..]) as i32;
        let height = le32(&dib[4..]) as i32;
        let planes = u16::from_le_bytes([dib[8], dib[9]]);
        let bits = u16::from_le_bytes([dib[10], dib[11]]);
        let compression = le32(&dib[12..]);
        let colors_used = le32(&dib[28..]);

        if width <= 0 || height == 0 || height == i32::MIN {
            return Err(at(Error::InvalidInput("bad BMP dimensions")));
        }
        if planes != 1 {
            return Err(at(Error::InvalidInput("BMP plane count is not 1")));
        }
        if !matches!(bits, 1 | 4 | 8 | 24 | 32) {
            return Err(at(Error::UnsupportedColorType("BMP bit depth")));
        }

        let bitfields = matches!(compression, BI_BITFIELDS | BI_ALPHABITFIELDS);
        if compression != BI_RGB && !bitfields {
            return Err(at(Error::Unsupported("compressed BMP")));
        }
        let mut alpha_mask = 0;
        if bitfields {
            if bits != 32 {
                return Err(at(Error::UnsupportedColorType("BMP bitfields below 32 bpp")));
            }
            // masks live in the header from V2 on, after it for the 40-byte one
            let mut masks = if dib_len >= 52 {
                dib[36..dib.len().min(52)].to_vec()
            } else {
                let n = if compression == BI_ALPHABITFIELDS { 16 } else { 12 };
                header_bytes(src, n)?.to_vec()
            };
            masks.resize(16, 0);
            if (le32(&masks[0..]), le32(&masks[4..]), le32(&masks[8..])) != (MASK_R, MASK_G, MASK_B)
            {
                return Err(at(Error::UnsupportedColorType("non-standard BMP channel masks")));
            }
            alpha_mask = le32(&masks[12..]);
            if alpha_mask != 0 && alpha_mask != MASK_A {
                return Err(at(Error::UnsupportedColorType("non-standard BMP alpha mask")));
            }
        }

        let mut palette = Vec::new();
        if bits <= 8 {
            let max = 1u32 << bits;
            let n = if colors_used == 0 { max } else { colors_used.min(max) };
            let entries = header_bytes(src, n as usize * 4)?;
            palette = entries
                .chunks_exact(4)
                .map(|c| Rgba::new(c[2], c[1], c[0], 255))
                .collect();
        }
        if data_offset < src.offset() {
            return Err(at(Error::InvalidInput("BMP pixel data overlaps header")));
        }

        let (color, alpha, layout) = match bits {
            24 => (EncodedColor::Bgr, EncodedAlpha::Opaque, RowLayout::Bgr8),
            32 if alpha_mask == MASK_A => {
                (EncodedColor::Bgra, EncodedAlpha::Unpremul, RowLayout::Bgra8)
            }
            32 => (EncodedColor::Bgrx, EncodedAlpha::Opaque, RowLayout::Bgrx8),
            _ => (EncodedColor::Palette, EncodedAlpha::Opaque, RowLayout::Index8),
        };
        let width = width as u32;
        let top_down = height < 0;
        let height = height.unsigned_abs();
        let encoded = EncodedInfo {
            color,
            alpha,
            bits_per_component: if bits <= 8 { bits as u8 } else { 8 },
        };
        let header = Header {
            width,
            height,
            encoded,
            layout,
            color_space: ColorSpace::Srgb,
            origin: Origin::TopLeft,
            has_alpha: encoded.has_alpha(),
        };
        log::debug!("BMP {width}x{height} {bits} bpp, top-down: {top_down}");

        let stride = (width as usize * usize::from(bits)).div_ceil(32) * 4;
        let decoder = Self {
            width,
            height,
            bits,
            top_down,
            palette,
            layout,
            data_offset,
            stride,
            row: 0,
            positioned: false,
        };
        Ok((decoder, header))
    }

    pub(crate) fn palette(&self) -> &[Rgba<u8>] {
        &self.palette
    }

    pub(crate) fn scanline_order(&self) -> ScanlineOrder {
        if self.top_down {
            ScanlineOrder::TopDown
        } else {
            ScanlineOrder::BottomUp
        }
    }

    pub(crate) fn row_at_decode_index(&self, k: u32) -> Option<u32> {
        if k >= self.height {
            return None;
        }
        Some(if self.top_down { k } else { self.height - 1 - k })
    }

    /// Pixel data may start past the received bytes; `next_row` finishes
    /// the seek once they arrive.
    pub(crate) fn start<S: Read + Seek>(&mut self, src: &mut Source<S>) -> Result<()> {
        self.positioned = src.try_seek_to(self.data_offset)?;
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
        if !self.positioned {
            if !src.try_seek_to(self.data_offset)? {
                return Ok(RowStep::NeedData);
            }
            self.positioned = true;
        }
        if !src.fill(self.stride)? {
            return Ok(RowStep::NeedData);
        }
        let raw = &src.bytes()[..self.stride];
        let w = self.width as usize;
        match self.bits {
            1 | 4 | 8 => {
                let bits = usize::from(self.bits);
                let per_byte = 8 / bits;
                let mask = ((1u16 << bits) - 1) as u8;
                for (x, px) in out[..w].iter_mut().enumerate() {
                    let shift = 8 - bits * (x % per_byte + 1);
                    *px = (raw[x / per_byte] >> shift) & mask;
                }
            }
            _ => {
                let n = w * self.layout.bytes_per_pixel();
                out[..n].copy_from_slice(&raw[..n]);
            }
        }
        src.consume(self.stride);
        src.discard_consumed();
        let y = self.row_at_decode_index(self.row).unwrap_or(0);
        self.row += 1;
        Ok(RowStep::Row(y))
    }
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
