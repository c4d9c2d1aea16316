//! Format decoders behind a single dispatch enum
//!
//! Every decoder reads from the codec's [`Source`] and emits rows in its own
//! native [`RowLayout`], full canvas width, in its own decode order. The
//! codec owns conversion, subsetting and sampling.

mod bmp;
mod gif;
mod png;
mod pnm;

use std::io::{Read, Seek};

use rgb::Rgba;
use whereat::at;

use crate::config::DecoderConfig;
use crate::convert::RowLayout;
use crate::error::{Error, Result};
use crate::format::ImageFormat;
use crate::frame::{FrameTable, RepetitionCount};
use crate::image::{ColorSpace, EncodedInfo};
use crate::origin::Origin;
use crate::stream::Source;

/// Order in which a scanline decode emits rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanlineOrder {
    /// First row first
    TopDown,
    /// Last row first
    BottomUp,
    /// Rows arrive in passes; see [`Codec::output_scanline`](crate::Codec::output_scanline)
    OutOfOrder,
}

/// Result of asking a decoder for its next row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowStep {
    /// The row buffer now holds canvas row `y`
    Row(u32),
    /// The stream is starved; call again after more bytes arrive
    NeedData,
    /// Every row of the frame was emitted
    Done,
}

/// Everything the codec learns from a header
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) encoded: EncodedInfo,
    pub(crate) layout: RowLayout,
    pub(crate) color_space: ColorSpace,
    pub(crate) origin: Origin,
    /// Whether the first frame may decode to non-opaque pixels
    pub(crate) has_alpha: bool,
}

pub(crate) enum Decoder {
    Png(png::PngDecoder),
    Gif(gif::GifDecoder),
    Bmp(bmp::BmpDecoder),
    Pnm(pnm::PnmDecoder),
}

impl Decoder {
    /// Parse the header of a sniffed stream.
    ///
    /// The source cursor is at offset 0 with the sniffed bytes buffered.
    pub(crate) fn read_header<S: Read + Seek>(
        format: ImageFormat,
        src: &mut Source<S>,
        config: &DecoderConfig,
    ) -> Result<(Self, Header)> {
        let (decoder, header) = match format {
            ImageFormat::Png => {
                let (d, h) = png::PngDecoder::read_header(src)?;
                (Decoder::Png(d), h)
            }
            ImageFormat::Gif => {
                let (d, h) = gif::GifDecoder::read_header(src, config)?;
                (Decoder::Gif(d), h)
            }
            ImageFormat::Bmp => {
                let (d, h) = bmp::BmpDecoder::read_header(src)?;
                (Decoder::Bmp(d), h)
            }
            ImageFormat::Pnm => {
                let (d, h) = pnm::PnmDecoder::read_header(src)?;
                (Decoder::Pnm(d), h)
            }
            other => {
                log::debug!("{other} is recognized but has no decoder");
                return Err(at(Error::UnrecognizedFormat));
            }
        };
        if header.width == 0 || header.height == 0 {
            return Err(at(Error::InvalidInput("zero image dimension")));
        }
        Ok((decoder, header))
    }

    /// Position the source at the pixel data of frame `index` and reset
    /// row state. The codec has already checked that the frame exists.
    pub(crate) fn start_frame<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        index: usize,
    ) -> Result<()> {
        match self {
            Decoder::Png(d) => d.start(src),
            Decoder::Gif(d) => d.start_frame(src, index),
            Decoder::Bmp(d) => d.start(src),
            Decoder::Pnm(d) => d.start(src),
        }
    }

    /// Decode the next row into `row`, which is canvas width in the
    /// decoder's layout.
    pub(crate) fn next_row<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        row: &mut [u8],
    ) -> Result<RowStep> {
        match self {
            Decoder::Png(d) => d.next_row(src, row),
            Decoder::Gif(d) => d.next_row(src, row),
            Decoder::Bmp(d) => d.next_row(src, row),
            Decoder::Pnm(d) => d.next_row(src, row),
        }
    }

    /// Canvas row emitted `k`-th by the current frame, if there is one.
    pub(crate) fn row_at_decode_index(&self, k: u32) -> Option<u32> {
        match self {
            Decoder::Png(d) => (k < d.height()).then_some(k),
            Decoder::Pnm(d) => (k < d.height()).then_some(k),
            Decoder::Bmp(d) => d.row_at_decode_index(k),
            Decoder::Gif(d) => d.row_at_decode_index(k),
        }
    }

    pub(crate) fn scanline_order(&self) -> ScanlineOrder {
        match self {
            Decoder::Png(_) | Decoder::Pnm(_) => ScanlineOrder::TopDown,
            Decoder::Bmp(d) => d.scanline_order(),
            Decoder::Gif(d) => d.scanline_order(),
        }
    }

    /// Palette behind [`RowLayout::Index8`] rows; empty otherwise.
    pub(crate) fn palette(&self) -> &[Rgba<u8>] {
        match self {
            Decoder::Png(d) => d.palette(),
            Decoder::Bmp(d) => d.palette(),
            Decoder::Gif(_) | Decoder::Pnm(_) => &[],
        }
    }

    /// Whether rows can be decoded for a rectangle of the image.
    pub(crate) fn supports_subset(&self) -> bool {
        !matches!(self, Decoder::Gif(_))
    }

    /// Frame table of a multi-frame source; `None` for still images.
    pub(crate) fn frames(&self) -> Option<&FrameTable> {
        match self {
            Decoder::Gif(d) => Some(d.frames()),
            _ => None,
        }
    }

    /// Record frames from whatever bytes the stream can deliver.
    pub(crate) fn scan_frames<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        config: &DecoderConfig,
    ) -> Result<()> {
        match self {
            Decoder::Gif(d) => d.scan(src, config, None),
            _ => Ok(()),
        }
    }

    pub(crate) fn repetition_count(&self) -> RepetitionCount {
        match self {
            Decoder::Gif(d) => d.repetition_count(),
            _ => RepetitionCount::Finite(0),
        }
    }
}

/// Corrupt pixel data; the codec fills in the row count.
pub(crate) fn corrupt(reason: &'static str) -> whereat::At<Error> {
    at(Error::ErrorInInput {
        rows_decoded: 0,
        reason,
    })
}

/// Buffer exactly `n` header bytes or report a truncated header.
pub(crate) fn header_bytes<S: Read + Seek>(src: &mut Source<S>, n: usize) -> Result<&[u8]> {
    src.take(n)?.ok_or_else(|| at(Error::IncompleteInput))
}

/// Scale a sample of `maxval` range to 8 bits.
#[inline]
pub(crate) fn scale_to_8(v: u32, maxval: u32) -> u8 {
    if maxval == 255 {
        return v.min(255) as u8;
    }
    ((v.min(maxval) * 255 + maxval / 2) / maxval) as u8
}
