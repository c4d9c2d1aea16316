//! Error types for zenscan

use crate::image::ColorType;

/// Error type for zenscan codec operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No decoder recognizes the leading bytes of the stream
    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    /// The stream ran dry before the header or a required frame was available
    #[error("More input is needed before this operation can proceed")]
    IncompleteInput,

    /// The header or container structure is corrupt
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    /// Pixel data is corrupt; rows before the failure were written
    #[error("Error in input after {rows_decoded} rows: {reason}")]
    ErrorInInput {
        /// Destination rows that hold decoded pixels
        rows_decoded: u32,
        /// What went wrong
        reason: &'static str,
    },

    /// The requested output cannot be produced from this source
    #[error("Cannot convert {from} source to {to:?}")]
    InvalidConversion {
        /// Encoded color model
        from: &'static str,
        /// Requested color type
        to: ColorType,
    },

    /// Requested dimensions are not a supported scale of the source
    #[error("Unsupported output size: {width}x{height}")]
    InvalidScale {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// A caller-supplied argument is malformed
    #[error("Invalid parameters: {0}")]
    InvalidParameters(&'static str),

    /// An indexed target was requested without a color table to fill
    #[error("Index8 output requires a color table")]
    MissingColorTable,

    /// The stream cannot seek back to re-read pixel data
    #[error("Could not rewind the stream")]
    CouldNotRewind,

    /// The format or decode mode is not supported by this decoder
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// The encoded color model is recognized but cannot be decoded
    #[error("Unsupported color type: {0}")]
    UnsupportedColorType(&'static str),

    /// Image dimensions exceed configured limit
    #[error("Image too large: {width}x{height}")]
    ImageTooLarge {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// Reading the underlying stream failed
    #[error("Stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Result code this error reports under.
    pub fn code(&self) -> ResultCode {
        match self {
            Error::UnrecognizedFormat | Error::InvalidInput(_) | Error::ImageTooLarge { .. } => {
                ResultCode::InvalidInput
            }
            Error::IncompleteInput => ResultCode::IncompleteInput,
            Error::ErrorInInput { .. } | Error::Io(_) => ResultCode::ErrorInInput,
            Error::InvalidConversion { .. } => ResultCode::InvalidConversion,
            Error::InvalidScale { .. } => ResultCode::InvalidScale,
            Error::InvalidParameters(_) | Error::MissingColorTable => {
                ResultCode::InvalidParameters
            }
            Error::CouldNotRewind => ResultCode::CouldNotRewind,
            Error::Unsupported(_) => ResultCode::Unimplemented,
            Error::UnsupportedColorType(_) => ResultCode::UnsupportedColorType,
        }
    }

    /// Whether feeding more input and retrying can succeed.
    pub fn is_retryable(&self) -> bool {
        self.code() == ResultCode::IncompleteInput
    }
}

/// Outcome codes shared by every decode entry point.
///
/// `Success` and `IncompleteInput` are reported through
/// [`DecodeReport`](crate::DecodeReport); every other code comes from
/// [`Error::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// All requested rows were decoded
    Success,
    /// The stream ran dry; supply more bytes and retry
    IncompleteInput,
    /// Corrupt pixel data
    ErrorInInput,
    /// Requested color/alpha type cannot be produced
    InvalidConversion,
    /// Requested dimensions are not a supported scale
    InvalidScale,
    /// Malformed arguments
    InvalidParameters,
    /// Corrupt or unrecognized header
    InvalidInput,
    /// The stream could not be rewound for another decode
    CouldNotRewind,
    /// Operation not supported by this format
    Unimplemented,
    /// The source's encoded color model cannot be decoded
    UnsupportedColorType,
}

/// Result type for zenscan operations with location tracking
pub type Result<T, E = whereat::At<Error>> = core::result::Result<T, E>;
