//! Binary PNM decoder (P4, P5, P6 and P7 PAM)

use std::io::{Read, Seek};

use whereat::at;

use super::{Header, RowStep, scale_to_8};
use crate::convert::RowLayout;
use crate::error::{Error, Result};
use crate::image::{ColorSpace, EncodedAlpha, EncodedColor, EncodedInfo};
use crate::origin::Origin;
use crate::stream::Source;

/// Headers longer than this are rejected rather than buffered forever
const MAX_HEADER_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// P4, one bit per pixel, 1 is black
    Bitmap,
    /// P5, P6 and P7
    Samples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PnmHeader {
    kind: Kind,
    width: u32,
    height: u32,
    depth: u32,
    maxval: u32,
}

pub(crate) struct PnmDecoder {
    header: PnmHeader,
    data_offset: u64,
    stride: usize,
    row: u32,
}

impl PnmDecoder {
    pub(crate) fn read_header<S: Read + Seek>(src: &mut Source<S>) -> Result<(Self, Header)> {
        let (pnm, len) = loop {
            if let Some(parsed) = parse_header(src.bytes())? {
                break parsed;
            }
            if src.available() > MAX_HEADER_LEN {
                return Err(at(Error::InvalidInput("PNM header too long")));
            }
            let want = src.available() + 1;
            if !src.fill(want)? {
                return Err(at(Error::IncompleteInput));
            }
        };
        src.consume(len);

        let (color, alpha, layout) = match pnm.depth {
            1 => (EncodedColor::Gray, EncodedAlpha::Opaque, RowLayout::Gray8),
            2 => (EncodedColor::GrayAlpha, EncodedAlpha::Unpremul, RowLayout::GrayAlpha8),
            3 => (EncodedColor::Rgb, EncodedAlpha::Opaque, RowLayout::Rgb8),
            4 => (EncodedColor::Rgba, EncodedAlpha::Unpremul, RowLayout::Rgba8),
            _ => return Err(at(Error::UnsupportedColorType("PAM depth"))),
        };
        let bits_per_component = match (pnm.kind, pnm.maxval) {
            (Kind::Bitmap, _) => 1,
            (_, m) if m > 255 => 16,
            _ => 8,
        };
        let encoded = EncodedInfo {
            color,
            alpha,
            bits_per_component,
        };
        let header = Header {
            width: pnm.width,
            height: pnm.height,
            encoded,
            layout,
            color_space: ColorSpace::Srgb,
            origin: Origin::TopLeft,
            has_alpha: encoded.has_alpha(),
        };
        log::debug!(
            "PNM {}x{} depth {} maxval {}",
            pnm.width,
            pnm.height,
            pnm.depth,
            pnm.maxval
        );

        let stride = match pnm.kind {
            Kind::Bitmap => (pnm.width as usize).div_ceil(8),
            Kind::Samples => {
                let bytes = if pnm.maxval > 255 { 2 } else { 1 };
                pnm.width as usize * pnm.depth as usize * bytes
            }
        };
        let decoder = Self {
            header: pnm,
            data_offset: src.offset(),
            stride,
            row: 0,
        };
        Ok((decoder, header))
    }

    pub(crate) fn height(&self) -> u32 {
        self.header.height
    }

    pub(crate) fn start<S: Read + Seek>(&mut self, src: &mut Source<S>) -> Result<()> {
        src.seek_to(self.data_offset)?;
        self.row = 0;
        Ok(())
    }

    pub(crate) fn next_row<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        out: &mut [u8],
    ) -> Result<RowStep> {
        if self.row >= self.header.height {
            return Ok(RowStep::Done);
        }
        if !src.fill(self.stride)? {
            return Ok(RowStep::NeedData);
        }
        let raw = &src.bytes()[..self.stride];
        let h = &self.header;
        match h.kind {
            Kind::Bitmap => {
                for (x, px) in out[..h.width as usize].iter_mut().enumerate() {
                    let bit = (raw[x / 8] >> (7 - x % 8)) & 1;
                    *px = if bit == 1 { 0 } else { 255 };
                }
            }
            Kind::Samples if h.maxval > 255 => {
                for (px, s) in out.iter_mut().zip(raw.chunks_exact(2)) {
                    *px = scale_to_8(u32::from(u16::from_be_bytes([s[0], s[1]])), h.maxval);
                }
            }
            Kind::Samples => {
                for (px, &s) in out.iter_mut().zip(raw) {
                    *px = scale_to_8(u32::from(s), h.maxval);
                }
            }
        }
        src.consume(self.stride);
        src.discard_consumed();
        let y = self.row;
        self.row += 1;
        Ok(RowStep::Row(y))
    }
}

/// Parse a complete header from the front of `bytes`.
///
/// Returns the header and its length, or `None` when more bytes are needed.
fn parse_header(bytes: &[u8]) -> Result<Option<(PnmHeader, usize)>> {
    if bytes.len() < 3 {
        return Ok(None);
    }
    match &bytes[..2] {
        b"P1" | b"P2" | b"P3" => Err(at(Error::Unsupported("ASCII PNM"))),
        b"P4" | b"P5" | b"P6" => parse_netpbm(bytes),
        b"P7" => parse_pam(bytes),
        _ => Err(at(Error::InvalidInput("bad PNM magic"))),
    }
}

fn parse_netpbm(bytes: &[u8]) -> Result<Option<(PnmHeader, usize)>> {
    let magic = bytes[1];
    let fields = if magic == b'4' { 2 } else { 3 };
    let mut pos = 2;
    let mut values = [0u32; 3];
    for value in values.iter_mut().take(fields) {
        match next_token(bytes, &mut pos)? {
            Some(v) => *value = v,
            None => return Ok(None),
        }
    }
    // one whitespace byte separates the header from the raster
    let Some(&sep) = bytes.get(pos) else {
        return Ok(None);
    };
    if !sep.is_ascii_whitespace() {
        return Err(at(Error::InvalidInput("PNM header not followed by whitespace")));
    }
    let (kind, depth, maxval) = match magic {
        b'4' => (Kind::Bitmap, 1, 1),
        b'5' => (Kind::Samples, 1, values[2]),
        _ => (Kind::Samples, 3, values[2]),
    };
    let header = validate(PnmHeader {
        kind,
        width: values[0],
        height: values[1],
        depth,
        maxval,
    })?;
    Ok(Some((header, pos + 1)))
}

/// Next decimal token after whitespace and comments.
fn next_token(bytes: &[u8], pos: &mut usize) -> Result<Option<u32>> {
    loop {
        let Some(&b) = bytes.get(*pos) else {
            return Ok(None);
        };
        if b == b'#' {
            let Some(nl) = bytes[*pos..].iter().position(|&c| c == b'\n' || c == b'\r') else {
                return Ok(None);
            };
            *pos += nl;
        } else if b.is_ascii_whitespace() {
            *pos += 1;
        } else {
            break;
        }
    }
    let start = *pos;
    let mut value: u32 = 0;
    while let Some(&b) = bytes.get(*pos) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(b - b'0')))
            .ok_or_else(|| at(Error::InvalidInput("PNM header value overflows")))?;
        *pos += 1;
    }
    if *pos == bytes.len() {
        // the token may continue in bytes not yet received
        return Ok(None);
    }
    if *pos == start {
        return Err(at(Error::InvalidInput("bad PNM header token")));
    }
    Ok(Some(value))
}

fn parse_pam(bytes: &[u8]) -> Result<Option<(PnmHeader, usize)>> {
    let mut width = None;
    let mut height = None;
    let mut depth = None;
    let mut maxval = None;
    let mut tuple_depth = None;
    let mut pos = 2;
    loop {
        let Some(nl) = bytes[pos..].iter().position(|&c| c == b'\n') else {
            return Ok(None);
        };
        let line = &bytes[pos..pos + nl];
        pos += nl + 1;
        let line = line.trim_ascii();
        if line.is_empty() || line[0] == b'#' {
            continue;
        }
        let mut words = line
            .split(|c| c.is_ascii_whitespace())
            .filter(|w| !w.is_empty());
        let key = words.next().unwrap_or_default();
        let value = words.next().unwrap_or_default();
        let number = || -> Result<u32> {
            std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| at(Error::InvalidInput("bad PAM header value")))
        };
        match key {
            b"ENDHDR" => break,
            b"WIDTH" => width = Some(number()?),
            b"HEIGHT" => height = Some(number()?),
            b"DEPTH" => depth = Some(number()?),
            b"MAXVAL" => maxval = Some(number()?),
            b"TUPLTYPE" => {
                tuple_depth = match value {
                    b"BLACKANDWHITE" | b"GRAYSCALE" => Some(1),
                    b"BLACKANDWHITE_ALPHA" | b"GRAYSCALE_ALPHA" => Some(2),
                    b"RGB" => Some(3),
                    b"RGB_ALPHA" => Some(4),
                    _ => return Err(at(Error::UnsupportedColorType("PAM tuple type"))),
                }
            }
            _ => return Err(at(Error::InvalidInput("unknown PAM header line"))),
        }
    }
    let (Some(width), Some(height), Some(depth), Some(maxval)) = (width, height, depth, maxval)
    else {
        return Err(at(Error::InvalidInput("incomplete PAM header")));
    };
    if tuple_depth.is_some_and(|t| t != depth) {
        return Err(at(Error::InvalidInput("PAM depth does not match tuple type")));
    }
    let header = validate(PnmHeader {
        kind: Kind::Samples,
        width,
        height,
        depth,
        maxval,
    })?;
    Ok(Some((header, pos)))
}

fn validate(h: PnmHeader) -> Result<PnmHeader> {
    if h.width == 0 || h.height == 0 {
        return Err(at(Error::InvalidInput("zero PNM dimension")));
    }
    if h.maxval == 0 || h.maxval > 65535 {
        return Err(at(Error::InvalidInput("PNM maxval out of range")));
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netpbm_header_with_comment() {
        let (h, len) = parse_header(b"P6\n# made by hand\n3 2\n255\nxyz")
            .unwrap()
            .unwrap();
        assert_eq!((h.width, h.height, h.depth, h.maxval), (3, 2, 3, 255));
        assert_eq!(len, 26);
    }

    #[test]
    fn netpbm_header_needs_separator() {
        assert_eq!(parse_header(b"P5 4 4 255").unwrap(), None);
        assert_eq!(parse_header(b"P5 4 4 25").unwrap(), None);
        assert!(parse_header(b"P5 4 4 255 ").unwrap().is_some());
    }

    #[test]
    fn bitmap_header_has_no_maxval() {
        let (h, len) = parse_header(b"P4\n8 1\n\xff").unwrap().unwrap();
        assert_eq!(h.kind, Kind::Bitmap);
        assert_eq!(len, 7);
    }

    #[test]
    fn pam_header() {
        let hdr = b"P7\nWIDTH 2\nHEIGHT 1\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n";
        let (h, len) = parse_header(hdr).unwrap().unwrap();
        assert_eq!((h.width, h.height, h.depth), (2, 1, 4));
        assert_eq!(len, hdr.len());
        assert_eq!(parse_header(&hdr[..20]).unwrap(), None);
    }

    #[test]
    fn ascii_variants_are_unsupported() {
        let err = parse_header(b"P3\n1 1\n255\n").unwrap_err().into_inner();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
