//! EXIF orientation support.

/// Stored orientation of the encoded pixels.
///
/// Describes how the stored pixels should be transformed for display.
/// Values match the EXIF Orientation tag (TIFF tag 274). Codecs report it
/// from [`Codec::origin`](crate::Codec::origin); decoding applies it only
/// when [`DecodeOptions::apply_origin`](crate::DecodeOptions) is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Origin {
    /// No rotation or flip needed.
    #[default]
    TopLeft = 1,
    /// Flip horizontally (mirror left-right).
    TopRight = 2,
    /// Rotate 180 degrees.
    BottomRight = 3,
    /// Flip vertically (mirror top-bottom).
    BottomLeft = 4,
    /// Transpose (rotate 90 CW then flip horizontally).
    LeftTop = 5,
    /// Rotate 90 degrees clockwise.
    RightTop = 6,
    /// Transverse (rotate 90 CCW then flip horizontally).
    RightBottom = 7,
    /// Rotate 270 degrees clockwise (= 90 CCW).
    LeftBottom = 8,
}

impl Origin {
    /// Create from EXIF orientation value (1-8).
    ///
    /// Returns [`TopLeft`](Origin::TopLeft) for out-of-range values.
    pub fn from_exif(value: u16) -> Self {
        match value {
            2 => Self::TopRight,
            3 => Self::BottomRight,
            4 => Self::BottomLeft,
            5 => Self::LeftTop,
            6 => Self::RightTop,
            7 => Self::RightBottom,
            8 => Self::LeftBottom,
            _ => Self::TopLeft,
        }
    }

    /// EXIF tag value (1-8).
    pub fn exif_value(self) -> u16 {
        self as u16
    }

    /// Whether this orientation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::LeftTop | Self::RightTop | Self::RightBottom | Self::LeftBottom
        )
    }

    /// Compute display dimensions for the given stored dimensions.
    pub fn display_dimensions(self, stored_width: u32, stored_height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (stored_height, stored_width)
        } else {
            (stored_width, stored_height)
        }
    }

    /// Whether any transformation is needed.
    pub fn is_identity(self) -> bool {
        matches!(self, Self::TopLeft)
    }

    /// Display position of stored pixel `(x, y)` in a `w`×`h` stored image.
    fn map(self, x: u32, y: u32, w: u32, h: u32) -> (u32, u32) {
        match self {
            Self::TopLeft => (x, y),
            Self::TopRight => (w - 1 - x, y),
            Self::BottomRight => (w - 1 - x, h - 1 - y),
            Self::BottomLeft => (x, h - 1 - y),
            Self::LeftTop => (y, x),
            Self::RightTop => (h - 1 - y, x),
            Self::RightBottom => (h - 1 - y, w - 1 - x),
            Self::LeftBottom => (y, w - 1 - x),
        }
    }

    /// Copy stored pixels into `dst` in display orientation.
    ///
    /// `src` holds a `width`×`height` image at `src_stride`; `dst` receives
    /// the display-oriented image at `dst_stride`.
    pub(crate) fn transform(
        self,
        src: &[u8],
        src_stride: usize,
        width: u32,
        height: u32,
        bytes_per_pixel: usize,
        dst: &mut [u8],
        dst_stride: usize,
    ) {
        for y in 0..height {
            let row = &src[y as usize * src_stride..];
            for x in 0..width {
                let (dx, dy) = self.map(x, y, width, height);
                let s = x as usize * bytes_per_pixel;
                let d = dy as usize * dst_stride + dx as usize * bytes_per_pixel;
                dst[d..d + bytes_per_pixel].copy_from_slice(&row[s..s + bytes_per_pixel]);
            }
        }
    }
}

/// Orientation from a TIFF-structured EXIF payload (`eXIf` chunk body).
///
/// Returns `None` when the payload is malformed or has no orientation tag.
pub(crate) fn origin_from_exif(exif: &[u8]) -> Option<Origin> {
    let exif = exif.strip_prefix(b"Exif\0\0").unwrap_or(exif);
    if exif.len() < 8 {
        return None;
    }
    let little = match &exif[..4] {
        b"II*\0" => true,
        b"MM\0*" => false,
        _ => return None,
    };
    let u16_at = |off: usize| -> Option<u16> {
        let b = exif.get(off..off + 2)?;
        Some(if little {
            u16::from_le_bytes([b[0], b[1]])
        } else {
            u16::from_be_bytes([b[0], b[1]])
        })
    };
    let u32_at = |off: usize| -> Option<u32> {
        let b = exif.get(off..off + 4)?;
        Some(if little {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        })
    };
    let ifd = u32_at(4)? as usize;
    let count = u16_at(ifd)? as usize;
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        // tag 274, type SHORT
        if u16_at(entry)? == 0x0112 && u16_at(entry + 2)? == 3 {
            return Some(Origin::from_exif(u16_at(entry + 8)?));
        }
    }
    None
}
