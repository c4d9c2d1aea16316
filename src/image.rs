//! Image metadata, pixel layouts and decoded image types

use imgref::ImgVec;
use rgb::Rgba;

/// Pixel layout of a destination buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// Coverage only, one byte per pixel
    Alpha8,
    /// Luminance, one byte per pixel
    Gray8,
    /// 5-6-5 packed RGB, native-endian `u16`
    Rgb565,
    /// R, G, B, A bytes
    Rgba8888,
    /// B, G, R, A bytes
    Bgra8888,
    /// Palette index, one byte per pixel; needs a [`ColorTable`]
    Index8,
}

impl ColorType {
    /// Bytes used by one pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Alpha8 | ColorType::Gray8 | ColorType::Index8 => 1,
            ColorType::Rgb565 => 2,
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
        }
    }

    /// Whether this layout can only represent opaque pixels.
    pub const fn is_always_opaque(self) -> bool {
        matches!(self, ColorType::Gray8 | ColorType::Rgb565)
    }
}

/// How alpha is stored in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaType {
    /// Every pixel is opaque
    Opaque,
    /// Color channels are multiplied by alpha
    #[default]
    Premul,
    /// Color channels are independent of alpha
    Unpremul,
}

/// Color space tag. Pixels are never converted between spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// sRGB transfer curve
    #[default]
    Srgb,
    /// Linear light (PNG `gAMA` of 1.0)
    Linear,
}

/// Dimensions and pixel layout of an image or a decode target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub color_type: ColorType,
    /// Alpha interpretation
    pub alpha_type: AlphaType,
    /// Color space tag
    pub color_space: ColorSpace,
}

impl ImageInfo {
    /// Create an sRGB image info.
    pub fn new(width: u32, height: u32, color_type: ColorType, alpha_type: AlphaType) -> Self {
        Self {
            width,
            height,
            color_type,
            alpha_type,
            color_space: ColorSpace::Srgb,
        }
    }

    /// Same layout, different dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Same dimensions, different color type.
    #[must_use]
    pub fn with_color_type(mut self, color_type: ColorType) -> Self {
        self.color_type = color_type;
        self
    }

    /// Same dimensions, different alpha type.
    #[must_use]
    pub fn with_alpha_type(mut self, alpha_type: AlphaType) -> Self {
        self.alpha_type = alpha_type;
        self
    }

    /// Same dimensions, different color space tag.
    #[must_use]
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Bytes per pixel of the color type.
    pub fn bytes_per_pixel(&self) -> usize {
        self.color_type.bytes_per_pixel()
    }

    /// Smallest legal row stride.
    pub fn min_row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    /// Bytes needed to hold the image at `row_bytes` stride.
    ///
    /// The last row only needs `min_row_bytes`, so a tightly sized buffer
    /// for a padded stride is accepted.
    pub fn compute_byte_size(&self, row_bytes: usize) -> usize {
        if self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * row_bytes + self.min_row_bytes()
    }

    /// Whether both dimensions are non-zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Color model stored in the encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedColor {
    /// Single luminance channel
    Gray,
    /// Luminance + alpha
    GrayAlpha,
    /// Palette indices
    Palette,
    /// Red, green, blue
    Rgb,
    /// Red, green, blue, alpha
    Rgba,
    /// Blue, green, red (BMP order)
    Bgr,
    /// Blue, green, red, unused byte
    Bgrx,
    /// Blue, green, red, alpha
    Bgra,
}

impl EncodedColor {
    /// Channels stored per pixel.
    pub fn channel_count(self) -> u8 {
        match self {
            EncodedColor::Gray | EncodedColor::Palette => 1,
            EncodedColor::GrayAlpha => 2,
            EncodedColor::Rgb | EncodedColor::Bgr => 3,
            EncodedColor::Rgba | EncodedColor::Bgrx | EncodedColor::Bgra => 4,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            EncodedColor::Gray => "gray",
            EncodedColor::GrayAlpha => "gray+alpha",
            EncodedColor::Palette => "palette",
            EncodedColor::Rgb => "RGB",
            EncodedColor::Rgba => "RGBA",
            EncodedColor::Bgr => "BGR",
            EncodedColor::Bgrx => "BGRX",
            EncodedColor::Bgra => "BGRA",
        }
    }
}

/// Alpha information stored in the encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedAlpha {
    /// No transparency
    Opaque,
    /// Full-range straight alpha
    Unpremul,
    /// Only fully transparent or fully opaque pixels
    Binary,
}

/// Low-level description of the encoded pixels, read from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedInfo {
    /// Color model
    pub color: EncodedColor,
    /// Transparency model
    pub alpha: EncodedAlpha,
    /// Bits stored per component (1, 2, 4, 8 or 16)
    pub bits_per_component: u8,
}

impl EncodedInfo {
    /// Channels stored per pixel.
    pub fn channel_count(&self) -> u8 {
        self.color.channel_count()
    }

    /// Whether the encoded pixels may be non-opaque.
    pub fn has_alpha(&self) -> bool {
        self.alpha != EncodedAlpha::Opaque
    }
}

/// Integer rectangle used for subsets and frame bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    /// Left edge
    pub left: u32,
    /// Top edge
    pub top: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl IRect {
    /// Rectangle from origin and size.
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Whether the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two rectangles, `None` when they do not intersect.
    pub fn intersect(&self, other: &IRect) -> Option<IRect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > left && bottom > top).then(|| IRect::new(left, top, right - left, bottom - top))
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &IRect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Palette filled by the codec for [`ColorType::Index8`] output
///
/// The caller owns the table; the codec overwrites its entries with the
/// source palette (premultiplied when the target is [`AlphaType::Premul`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColorTable {
    colors: Vec<Rgba<u8>>,
}

impl ColorTable {
    /// Largest palette an indexed image can carry.
    pub const MAX_COLORS: usize = 256;

    /// Empty table ready to be filled by a decode call.
    pub fn new() -> Self {
        Self {
            colors: Vec::with_capacity(Self::MAX_COLORS),
        }
    }

    /// Table from explicit entries; extra entries beyond 256 are dropped.
    pub fn from_colors(colors: &[Rgba<u8>]) -> Self {
        let n = colors.len().min(Self::MAX_COLORS);
        Self {
            colors: colors[..n].to_vec(),
        }
    }

    /// Palette entries.
    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Copy `palette`, padded with opaque black to every index a
    /// `bit_depth` image can address.
    pub(crate) fn fill(
        &mut self,
        palette: &[Rgba<u8>],
        bit_depth: u8,
        premultiply: bool,
    ) -> usize {
        let addressable = 1usize << bit_depth.min(8);
        let len = palette.len().max(addressable).min(Self::MAX_COLORS);
        self.colors.clear();
        self.colors.extend(palette.iter().take(len).map(|&c| {
            if premultiply {
                crate::convert::premultiply(c)
            } else {
                c
            }
        }));
        self.colors.resize(len, Rgba::new(0, 0, 0, 255));
        self.colors.len()
    }
}

/// A fully decoded image owned by the caller
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodedImage {
    /// 8-bit RGBA image with straight alpha
    Rgba8(ImgVec<Rgba<u8>>),
    /// 8-bit grayscale image
    Gray8(ImgVec<u8>),
}

impl DecodedImage {
    /// Get the width of the decoded image
    pub fn width(&self) -> usize {
        match self {
            DecodedImage::Rgba8(img) => img.width(),
            DecodedImage::Gray8(img) => img.width(),
        }
    }

    /// Get the height of the decoded image
    pub fn height(&self) -> usize {
        match self {
            DecodedImage::Rgba8(img) => img.height(),
            DecodedImage::Gray8(img) => img.height(),
        }
    }

    /// Returns true if the image has an alpha channel
    pub fn has_alpha(&self) -> bool {
        matches!(self, DecodedImage::Rgba8(_))
    }

    /// Returns true if the image is grayscale (monochrome)
    pub fn is_grayscale(&self) -> bool {
        matches!(self, DecodedImage::Gray8(_))
    }
}
