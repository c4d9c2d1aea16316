//! Decoder configuration and per-call decode options

use crate::image::IRect;

/// Default number of bytes requested from the stream per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// Configuration applied for the lifetime of a [`Codec`](crate::Codec)
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum frame size limit in pixels (0 = no limit)
    pub(crate) frame_size_limit: u32,
    /// Maximum number of frames recorded in the frame table (0 = no limit)
    pub(crate) max_frames: usize,
    /// Bytes requested per stream read
    pub(crate) read_chunk_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_size_limit: 0,
            max_frames: 0,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum frame size limit in total pixels
    ///
    /// If width * height exceeds this limit, construction fails with
    /// [`Error::ImageTooLarge`](crate::Error::ImageTooLarge).
    /// 0 means no limit.
    pub fn frame_size_limit(mut self, limit: u32) -> Self {
        self.frame_size_limit = limit;
        self
    }

    /// Stop recording frames after this many
    ///
    /// Frames past the limit are ignored as if the stream ended there.
    /// 0 means no limit.
    pub fn max_frames(mut self, max: usize) -> Self {
        self.max_frames = max;
        self
    }

    /// Set how many bytes are requested from the stream per read
    ///
    /// Values below 1 are raised to 1.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub(crate) fn exceeds_size_limit(&self, width: u32, height: u32) -> bool {
        self.frame_size_limit != 0
            && u64::from(width) * u64::from(height) > u64::from(self.frame_size_limit)
    }

    pub(crate) fn frame_limit_reached(&self, frames: usize) -> bool {
        self.max_frames != 0 && frames >= self.max_frames
    }
}

/// Options for a single decode call
///
/// Every field has an explicit default: the whole image, frame 0, no prior
/// frame on the destination, and stored orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub(crate) subset: Option<IRect>,
    pub(crate) frame_index: usize,
    pub(crate) prior_frame: Option<usize>,
    pub(crate) apply_origin: bool,
}

impl DecodeOptions {
    /// Options with every default applied
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode only this rectangle of the source
    ///
    /// Use [`Codec::valid_subset`](crate::Codec::valid_subset) to clamp a
    /// rectangle first.
    pub fn subset(mut self, subset: IRect) -> Self {
        self.subset = Some(subset);
        self
    }

    /// Decode this frame of a multi-frame image
    pub fn frame_index(mut self, index: usize) -> Self {
        self.frame_index = index;
        self
    }

    /// The destination already holds this frame, fully composed
    ///
    /// It must lie between the decoded frame's required frame and the
    /// decoded frame. Without it the codec composes the required frame
    /// itself.
    pub fn prior_frame(mut self, index: usize) -> Self {
        self.prior_frame = Some(index);
        self
    }

    /// Rotate and flip whole-image output into display orientation
    ///
    /// Target dimensions are then the display dimensions. Ignored by
    /// incremental and scanline decodes.
    pub fn apply_origin(mut self, apply: bool) -> Self {
        self.apply_origin = apply;
        self
    }

    /// Requested subset, if any
    pub fn get_subset(&self) -> Option<IRect> {
        self.subset
    }

    /// Requested frame
    pub fn get_frame_index(&self) -> usize {
        self.frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unlimited() {
        let config = DecoderConfig::new();
        assert!(!config.exceeds_size_limit(u32::MAX, u32::MAX));
        assert!(!config.frame_limit_reached(usize::MAX));
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
    }

    #[test]
    fn size_limit_counts_pixels() {
        let config = DecoderConfig::new().frame_size_limit(100);
        assert!(!config.exceeds_size_limit(10, 10));
        assert!(config.exceeds_size_limit(10, 11));
        // no u32 overflow
        assert!(config.exceeds_size_limit(65536, 65536));
    }

    #[test]
    fn zero_chunk_size_is_raised() {
        assert_eq!(DecoderConfig::new().read_chunk_size(0).read_chunk_size, 1);
    }

    #[test]
    fn options_builder() {
        let opts = DecodeOptions::new()
            .subset(IRect::new(1, 2, 3, 4))
            .frame_index(2)
            .prior_frame(1);
        assert_eq!(opts.get_subset(), Some(IRect::new(1, 2, 3, 4)));
        assert_eq!(opts.get_frame_index(), 2);
        assert_eq!(opts.prior_frame, Some(1));
        assert!(!opts.apply_origin);
    }
}
