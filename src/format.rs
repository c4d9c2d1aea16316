//! Image format detection.

/// Bytes a caller must buffer before any format can be sniffed reliably.
///
/// Upper bound of [`ImageFormat::min_sniff_bytes`] across all formats.
pub const MIN_BUFFERED_BYTES_NEEDED: usize = max_sniff_bytes();

const ALL_FORMATS: [ImageFormat; 8] = [
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Pnm,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Avif,
    ImageFormat::Jxl,
];

const fn max_sniff_bytes() -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < ALL_FORMATS.len() {
        let n = ALL_FORMATS[i].min_sniff_bytes();
        if n > max {
            max = n;
        }
        i += 1;
    }
    max
}

/// Encoded image formats this crate can recognize.
///
/// Detection is broader than decoding: JPEG, WebP, AVIF and JPEG XL are
/// recognized but no decoder claims them.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Gif,
    Bmp,
    Pnm,
    Jpeg,
    WebP,
    Avif,
    Jxl,
}

impl ImageFormat {
    /// Detect format from magic bytes. Returns `None` if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.len() >= 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some(ImageFormat::Png);
        }

        // GIF: "GIF87a" or "GIF89a"
        if data.len() >= 6
            && data[..3] == *b"GIF"
            && data[3] == b'8'
            && (data[4] == b'7' || data[4] == b'9')
            && data[5] == b'a'
        {
            return Some(ImageFormat::Gif);
        }

        // BMP: "BM" followed by a known DIB header size at offset 14
        if data.len() >= 18 && data[..2] == *b"BM" {
            let dib = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);
            if matches!(dib, 40 | 52 | 56 | 108 | 124) {
                return Some(ImageFormat::Bmp);
            }
        }

        // JPEG: FF D8 FF
        if data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
            return Some(ImageFormat::Jpeg);
        }

        // WebP: "RIFF....WEBP"
        if data.len() >= 12 && data[..4] == *b"RIFF" && data[8..12] == *b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        // AVIF: ftyp box with avif/avis brand
        if data.len() >= 12 && &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if brand == b"avif" || brand == b"avis" {
                return Some(ImageFormat::Avif);
            }
        }

        // JPEG XL codestream: FF 0A
        if data.len() >= 2 && data[0] == 0xFF && data[1] == 0x0A {
            return Some(ImageFormat::Jxl);
        }

        // JPEG XL container: 00 00 00 0C 4A 58 4C 20 0D 0A 87 0A
        if data.len() >= 12
            && data[..4] == [0x00, 0x00, 0x00, 0x0C]
            && data[4..8] == [b'J', b'X', b'L', b' ']
            && data[8..12] == [0x0D, 0x0A, 0x87, 0x0A]
        {
            return Some(ImageFormat::Jxl);
        }

        // PNM family: P1-P7 followed by whitespace
        if data.len() >= 3
            && data[0] == b'P'
            && matches!(data[1], b'1'..=b'7')
            && data[2].is_ascii_whitespace()
        {
            return Some(ImageFormat::Pnm);
        }

        None
    }

    /// Whether `data` is a non-empty, cut-short start of a signature that
    /// a decodable format begins with.
    pub(crate) fn is_truncated_signature(data: &[u8]) -> bool {
        const SIGNATURES: [&[u8]; 7] = [
            &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            b"GIF8",
            b"BM",
            b"P4",
            b"P5",
            b"P6",
            b"P7",
        ];
        !data.is_empty()
            && SIGNATURES.iter().any(|sig| {
                let n = data.len().min(sig.len());
                data[..n] == sig[..n]
            })
    }

    /// Minimum prefix length [`detect`](Self::detect) needs for this format.
    pub const fn min_sniff_bytes(self) -> usize {
        match self {
            ImageFormat::Png => 8,
            ImageFormat::Gif => 6,
            ImageFormat::Bmp => 18, // file header + DIB size
            ImageFormat::Pnm => 3,
            ImageFormat::Jpeg => 3,
            ImageFormat::WebP => 12,
            ImageFormat::Avif => 12,
            ImageFormat::Jxl => 12,
        }
    }

    /// Whether this crate ships a decoder for the format.
    pub fn is_decodable(self) -> bool {
        matches!(
            self,
            ImageFormat::Png | ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Pnm
        )
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Pnm => "image/x-portable-anymap",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Jxl => "image/jxl",
        }
    }

    /// Whether this format supports animation.
    pub fn supports_animation(self) -> bool {
        matches!(self, ImageFormat::Gif | ImageFormat::WebP | ImageFormat::Jxl)
    }
}

impl core::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Pnm => "PNM",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::WebP => "WebP",
            ImageFormat::Avif => "AVIF",
            ImageFormat::Jxl => "JPEG XL",
        })
    }
}
