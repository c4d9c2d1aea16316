//! Row conversion, alpha handling, and sampling into destination buffers

use rgb::Rgba;
use whereat::at;

use crate::error::{Error, Result};
use crate::image::{AlphaType, ColorSpace, ColorType, EncodedInfo, ImageInfo};

/// Pixel layout of the rows a decoder produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowLayout {
    Gray8,
    GrayAlpha8,
    Rgb8,
    Rgba8,
    Bgr8,
    Bgrx8,
    Bgra8,
    Index8,
}

impl RowLayout {
    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            RowLayout::Gray8 | RowLayout::Index8 => 1,
            RowLayout::GrayAlpha8 => 2,
            RowLayout::Rgb8 | RowLayout::Bgr8 => 3,
            RowLayout::Rgba8 | RowLayout::Bgrx8 | RowLayout::Bgra8 => 4,
        }
    }
}

/// Multiply color channels by alpha, rounding to nearest.
#[inline]
pub(crate) fn premultiply(c: Rgba<u8>) -> Rgba<u8> {
    if c.a == 255 {
        return c;
    }
    let mul = |v: u8| ((u32::from(v) * u32::from(c.a) + 127) / 255) as u8;
    Rgba::new(mul(c.r), mul(c.g), mul(c.b), c.a)
}

/// Pack 8-bit RGB into 5-6-5.
#[inline]
fn pack_565(c: Rgba<u8>) -> u16 {
    (u16::from(c.r >> 3) << 11) | (u16::from(c.g >> 2) << 5) | u16::from(c.b >> 3)
}

/// Check that `dst` can be produced from the encoded source.
///
/// `source_has_alpha` is the alpha of what will actually be decoded, which
/// for animations can differ from the encoded info.
pub(crate) fn check_conversion(
    encoded: &EncodedInfo,
    layout: RowLayout,
    source_space: ColorSpace,
    source_has_alpha: bool,
    dst: &ImageInfo,
) -> Result<()> {
    let invalid = || {
        at(Error::InvalidConversion {
            from: encoded.color.name(),
            to: dst.color_type,
        })
    };
    if dst.color_space != source_space {
        return Err(invalid());
    }
    match dst.color_type {
        ColorType::Index8 if layout != RowLayout::Index8 => return Err(invalid()),
        ColorType::Gray8 if layout != RowLayout::Gray8 => return Err(invalid()),
        ColorType::Rgb565 if source_has_alpha => return Err(invalid()),
        _ => {}
    }
    if dst.alpha_type == AlphaType::Opaque && source_has_alpha && !dst.color_type.is_always_opaque()
    {
        return Err(invalid());
    }
    Ok(())
}

/// One-dimensional point sampler over a subset of the source.
///
/// Output pixel `i` reads source coordinate `offset + start + i * step`,
/// with `start = step / 2` clamped into the subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sampler {
    offset: u32,
    start: u32,
    step: u32,
    count: u32,
}

impl Sampler {
    pub(crate) fn new(offset: u32, extent: u32, step: u32) -> Self {
        let step = step.max(1);
        let count = (extent / step).max(1);
        let start = (step / 2).min(extent.saturating_sub(1));
        Self {
            offset,
            start,
            step,
            count,
        }
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Source coordinate of output index `i`.
    pub(crate) fn source(&self, i: u32) -> u32 {
        self.offset + self.start + i * self.step
    }

    /// Output index that reads source coordinate `src`, if any.
    pub(crate) fn output(&self, src: u32) -> Option<u32> {
        let rel = src.checked_sub(self.offset + self.start)?;
        if rel % self.step != 0 {
            return None;
        }
        let i = rel / self.step;
        (i < self.count).then_some(i)
    }
}

/// Converts native decoder rows into destination rows.
pub(crate) struct RowWriter {
    layout: RowLayout,
    palette: Vec<Rgba<u8>>,
    color_type: ColorType,
    premul: bool,
    x: Sampler,
    /// Leave the destination untouched under transparent source pixels
    blend: bool,
}

impl RowWriter {
    pub(crate) fn new(
        layout: RowLayout,
        palette: &[Rgba<u8>],
        dst: &ImageInfo,
        x: Sampler,
        blend: bool,
    ) -> Self {
        let mut palette = palette.to_vec();
        // out-of-range indices read opaque black instead of past the table
        palette.resize(256, Rgba::new(0, 0, 0, 255));
        Self {
            layout,
            palette,
            color_type: dst.color_type,
            premul: dst.alpha_type == AlphaType::Premul,
            x,
            blend,
        }
    }

    #[inline]
    fn fetch(&self, src: &[u8], x: usize) -> Rgba<u8> {
        let bpp = self.layout.bytes_per_pixel();
        let p = &src[x * bpp..x * bpp + bpp];
        match self.layout {
            RowLayout::Gray8 => Rgba::new(p[0], p[0], p[0], 255),
            RowLayout::GrayAlpha8 => Rgba::new(p[0], p[0], p[0], p[1]),
            RowLayout::Rgb8 => Rgba::new(p[0], p[1], p[2], 255),
            RowLayout::Rgba8 => Rgba::new(p[0], p[1], p[2], p[3]),
            RowLayout::Bgr8 | RowLayout::Bgrx8 => Rgba::new(p[2], p[1], p[0], 255),
            RowLayout::Bgra8 => Rgba::new(p[2], p[1], p[0], p[3]),
            RowLayout::Index8 => self.palette[usize::from(p[0])],
        }
    }

    /// Write one destination row from one native source row.
    pub(crate) fn write(&self, src: &[u8], dst: &mut [u8]) {
        let bpp = self.color_type.bytes_per_pixel();
        for i in 0..self.x.count() {
            let sx = self.x.source(i) as usize;
            let c = self.fetch(src, sx);
            if self.blend && c.a == 0 {
                continue;
            }
            let out = &mut dst[i as usize * bpp..(i as usize + 1) * bpp];
            match self.color_type {
                ColorType::Index8 => out[0] = src[sx],
                ColorType::Gray8 => out[0] = c.r,
                ColorType::Alpha8 => out[0] = c.a,
                ColorType::Rgb565 => out.copy_from_slice(&pack_565(c).to_ne_bytes()),
                ColorType::Rgba8888 | ColorType::Bgra8888 => {
                    let c = if self.premul { premultiply(c) } else { c };
                    let px = if self.color_type == ColorType::Rgba8888 {
                        [c.r, c.g, c.b, c.a]
                    } else {
                        [c.b, c.g, c.r, c.a]
                    };
                    out.copy_from_slice(&px);
                }
            }
        }
    }
}

/// Zero `rows` destination rows starting at `first`.
pub(crate) fn zero_rows(
    dst: &mut [u8],
    row_bytes: usize,
    min_row_bytes: usize,
    first: u32,
    rows: u32,
) {
    for y in first..first + rows {
        let start = y as usize * row_bytes;
        if let Some(row) = dst.get_mut(start..start + min_row_bytes) {
            row.fill(0);
        }
    }
}
