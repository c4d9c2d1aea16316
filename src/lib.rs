//! # zenscan
//!
//! Pure Rust decoding of PNG, GIF, BMP and PNM images from streams that
//! may still be arriving.
//!
//! A [`Codec`] sniffs the format from the first bytes of a stream, parses
//! the header, and then decodes into caller-owned memory in one of three
//! ways:
//!
//! - **Whole image**: [`Codec::get_pixels`] decodes every row at once.
//! - **Incremental**: [`Codec::start_incremental_decode`] followed by
//!   repeated [`Codec::incremental_decode`] calls, each decoding as many
//!   rows as the stream can currently deliver.
//! - **Scanline**: [`Codec::start_scanline_decode`] followed by
//!   [`Codec::get_scanlines`] and [`Codec::skip_scanlines`].
//!
//! Output can be converted to another color type, premultiplied, cropped
//! to a subset, and downsampled by 2, 4 or 8. Animated GIFs expose a frame
//! table and any frame can be decoded, composed over the frames it
//! depends on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use zenscan::{decode, DecodedImage};
//!
//! let data = std::fs::read("image.png").unwrap();
//! let image = decode(&data).unwrap();
//!
//! match image {
//!     DecodedImage::Rgba8(img) => {
//!         println!("RGBA8 image: {}x{}", img.width(), img.height());
//!     }
//!     DecodedImage::Gray8(img) => {
//!         println!("Gray8 image: {}x{}", img.width(), img.height());
//!     }
//!     _ => {}
//! }
//! ```
//!
//! ## Incremental decoding
//!
//! ```no_run
//! use zenscan::{Codec, DecodeOptions, GrowingStream};
//!
//! let data = std::fs::read("image.png").unwrap();
//! let (head, tail) = data.split_at(data.len() / 2);
//!
//! let mut codec = Codec::new(GrowingStream::with_prefix(head)).unwrap();
//! let info = codec.info();
//! let row_bytes = info.min_row_bytes();
//! let mut pixels = vec![0u8; info.compute_byte_size(row_bytes)];
//! codec
//!     .start_incremental_decode(&info, &mut pixels, row_bytes, &DecodeOptions::new(), None)
//!     .unwrap();
//! let partial = codec.incremental_decode(&mut pixels).unwrap();
//! println!("{} rows so far", partial.rows_decoded);
//!
//! codec.stream_mut().push(tail);
//! codec.stream_mut().finish();
//! assert!(codec.incremental_decode(&mut pixels).unwrap().is_complete());
//! ```
//!
//! ## Configuration
//!
//! ```no_run
//! use zenscan::{decode_with, DecoderConfig};
//!
//! let config = DecoderConfig::new()
//!     .frame_size_limit(8192 * 8192)
//!     .max_frames(1000);
//!
//! let data = std::fs::read("image.gif").unwrap();
//! let image = decode_with(&data, &config).unwrap();
//! ```

#![forbid(unsafe_code)]

mod codec;
mod config;
mod convert;
mod decoder;
mod error;
mod format;
mod frame;
mod image;
mod origin;
mod stream;

use std::io::Cursor;

pub use codec::{Codec, DecodeMode, DecodeReport, DecodeStatus};
pub use config::{DEFAULT_READ_CHUNK_SIZE, DecodeOptions, DecoderConfig};
pub use decoder::ScanlineOrder;
pub use error::{Error, Result, ResultCode};
pub use format::{ImageFormat, MIN_BUFFERED_BYTES_NEEDED};
pub use frame::{BlendMode, DisposalMethod, FrameInfo, RepetitionCount};
pub use image::{
    AlphaType, ColorSpace, ColorTable, ColorType, DecodedImage, EncodedAlpha, EncodedColor,
    EncodedInfo, IRect, ImageInfo,
};
pub use origin::Origin;
pub use stream::{Data, GrowingStream};

/// Decode the first frame of an image with default settings
///
/// # Example
///
/// ```no_run
/// let data = std::fs::read("image.bmp").unwrap();
/// let image = zenscan::decode(&data).unwrap();
/// ```
pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    decode_with(data, &DecoderConfig::default())
}

/// Decode the first frame of an image with custom settings
///
/// # Arguments
///
/// * `data` - Complete encoded file
/// * `config` - Decoder configuration
///
/// # Example
///
/// ```no_run
/// use zenscan::{decode_with, DecoderConfig};
///
/// let config = DecoderConfig::new().frame_size_limit(4096 * 4096);
/// let data = std::fs::read("image.pnm").unwrap();
/// let image = decode_with(&data, &config).unwrap();
/// ```
pub fn decode_with(data: &[u8], config: &DecoderConfig) -> Result<DecodedImage> {
    Codec::with_config(Cursor::new(data), config)?.decode_image()
}
