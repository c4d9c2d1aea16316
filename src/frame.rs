//! Frame table for multi-frame images

use crate::image::IRect;

/// What happens to a frame's area before the next frame is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisposalMethod {
    /// Leave the frame on the canvas
    #[default]
    Keep,
    /// Clear the frame's bounds to transparent
    RestoreBackground,
    /// Restore the canvas to its state before this frame
    RestorePrevious,
}

/// How a frame's pixels combine with the canvas beneath
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Transparent pixels leave the canvas untouched
    #[default]
    SrcOver,
    /// Frame pixels replace the canvas, transparency included
    Src,
}

/// How many times an animation repeats after the first play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepetitionCount {
    /// Repeat this many extra times; `Finite(0)` plays once
    Finite(u32),
    /// Loop forever
    Infinite,
}

impl Default for RepetitionCount {
    fn default() -> Self {
        RepetitionCount::Finite(0)
    }
}

/// Description of one frame of a multi-frame image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameInfo {
    /// Position in the frame sequence
    pub index: usize,
    /// Display time in milliseconds
    pub duration_ms: u32,
    /// Earlier frame that must be on the canvas before this one is drawn
    pub required_frame: Option<usize>,
    /// Whether the composed frame may contain transparent pixels
    pub has_alpha: bool,
    /// Disposal applied after display
    pub disposal: DisposalMethod,
    /// Blend used when drawing
    pub blend: BlendMode,
    /// Area of the canvas this frame updates
    pub bounds: IRect,
    /// Whether all of the frame's encoded bytes have been received
    pub fully_received: bool,
}

/// Header fields a decoder gathers for each frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub(crate) bounds: IRect,
    pub(crate) duration_ms: u32,
    pub(crate) disposal: DisposalMethod,
    pub(crate) blend: BlendMode,
    /// Frame pixels include a transparent entry
    pub(crate) transparent: bool,
}

/// Ordered, append-only list of frames.
#[derive(Debug, Default)]
pub(crate) struct FrameTable {
    frames: Vec<FrameInfo>,
    /// The end of the frame sequence has been seen
    pub(crate) complete: bool,
}

impl FrameTable {
    pub(crate) fn frames(&self) -> &[FrameInfo] {
        &self.frames
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&FrameInfo> {
        self.frames.get(index)
    }

    /// Append a frame, deriving its dependency and alpha from earlier frames.
    pub(crate) fn push(&mut self, header: FrameHeader, canvas: IRect, fully_received: bool) {
        let index = self.frames.len();
        let covers = header.bounds.contains(&canvas);
        let required_frame = self.required_frame(index, &header, covers, canvas);
        let has_alpha = match required_frame {
            Some(r) => {
                let under = &self.frames[r];
                under.has_alpha || under.disposal == DisposalMethod::RestoreBackground
            }
            None => header.transparent || !covers,
        };
        self.frames.push(FrameInfo {
            index,
            duration_ms: header.duration_ms,
            required_frame,
            has_alpha,
            disposal: header.disposal,
            blend: header.blend,
            bounds: header.bounds,
            fully_received,
        });
    }

    /// Mark the last frame as fully received.
    pub(crate) fn mark_received(&mut self, index: usize) {
        if let Some(f) = self.frames.get_mut(index) {
            f.fully_received = true;
        }
    }

    fn required_frame(
        &self,
        index: usize,
        header: &FrameHeader,
        covers: bool,
        canvas: IRect,
    ) -> Option<usize> {
        if index == 0 {
            return None;
        }
        if covers && (!header.transparent || header.blend == BlendMode::Src) {
            return None;
        }
        let mut prev = index - 1;
        loop {
            let p = &self.frames[prev];
            match p.disposal {
                DisposalMethod::RestorePrevious => prev = p.required_frame?,
                DisposalMethod::RestoreBackground => {
                    if p.bounds.contains(&canvas) {
                        return None;
                    }
                    return Some(prev);
                }
                DisposalMethod::Keep => return Some(prev),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: IRect = IRect::from_size(10, 10);

    fn header(bounds: IRect, disposal: DisposalMethod, transparent: bool) -> FrameHeader {
        FrameHeader {
            bounds,
            duration_ms: 100,
            disposal,
            blend: BlendMode::SrcOver,
            transparent,
        }
    }

    #[test]
    fn first_frame_is_independent() {
        let mut table = FrameTable::default();
        table.push(header(IRect::new(2, 2, 3, 3), DisposalMethod::Keep, false), CANVAS, true);
        let f = &table.frames()[0];
        assert_eq!(f.required_frame, None);
        assert!(f.has_alpha, "partial first frame leaves transparent canvas");
    }

    #[test]
    fn opaque_full_frame_needs_nothing() {
        let mut table = FrameTable::default();
        table.push(header(CANVAS, DisposalMethod::Keep, false), CANVAS, true);
        table.push(header(CANVAS, DisposalMethod::Keep, false), CANVAS, true);
        assert_eq!(table.frames()[1].required_frame, None);
        assert!(!table.frames()[1].has_alpha);
    }

    #[test]
    fn partial_frame_depends_on_previous() {
        let mut table = FrameTable::default();
        table.push(header(CANVAS, DisposalMethod::Keep, false), CANVAS, true);
        table.push(header(IRect::new(1, 1, 2, 2), DisposalMethod::Keep, true), CANVAS, true);
        assert_eq!(table.frames()[1].required_frame, Some(0));
        assert!(!table.frames()[1].has_alpha);
    }

    #[test]
    fn restore_previous_is_skipped() {
        let mut table = FrameTable::default();
        table.push(header(CANVAS, DisposalMethod::Keep, false), CANVAS, true);
        table.push(
            header(IRect::new(0, 0, 2, 2), DisposalMethod::RestorePrevious, false),
            CANVAS,
            true,
        );
        table.push(header(IRect::new(5, 5, 2, 2), DisposalMethod::Keep, false), CANVAS, true);
        assert_eq!(table.frames()[2].required_frame, Some(0));
    }

    #[test]
    fn full_canvas_background_restore_clears_dependency() {
        let mut table = FrameTable::default();
        table.push(header(CANVAS, DisposalMethod::RestoreBackground, false), CANVAS, true);
        table.push(header(IRect::new(0, 0, 2, 2), DisposalMethod::Keep, false), CANVAS, true);
        assert_eq!(table.frames()[1].required_frame, None);
    }

    #[test]
    fn required_frame_always_precedes() {
        let mut table = FrameTable::default();
        let disposals = [
            DisposalMethod::Keep,
            DisposalMethod::RestorePrevious,
            DisposalMethod::RestoreBackground,
            DisposalMethod::Keep,
            DisposalMethod::RestorePrevious,
        ];
        for (i, d) in disposals.into_iter().enumerate() {
            let bounds = IRect::new(i as u32, 0, 3, 3);
            table.push(header(bounds, d, i % 2 == 0), CANVAS, true);
        }
        for f in table.frames() {
            if let Some(r) = f.required_frame {
                assert!(r < f.index);
            }
        }
    }
}
