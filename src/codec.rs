//! The codec: one stream, one header, three decode modes

use std::io::{Cursor, Read, Seek};

use imgref::ImgVec;
use rgb::Rgba;
use whereat::{At, at};

use crate::config::{DecodeOptions, DecoderConfig};
use crate::convert::{RowLayout, RowWriter, Sampler, check_conversion, zero_rows};
use crate::decoder::{Decoder, RowStep, ScanlineOrder};
use crate::error::{Error, Result, ResultCode};
use crate::format::{ImageFormat, MIN_BUFFERED_BYTES_NEEDED};
use crate::frame::{DisposalMethod, FrameInfo, RepetitionCount};
use crate::image::{
    AlphaType, ColorTable, ColorType, DecodedImage, EncodedInfo, IRect, ImageInfo,
};
use crate::origin::Origin;
use crate::stream::{Data, Source};

/// Sample sizes a decode can scale down by
const SAMPLE_SIZES: [u32; 4] = [1, 2, 4, 8];

/// Which decode session, if any, the codec is serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeMode {
    /// No decode has started
    #[default]
    None,
    /// The last call was [`Codec::get_pixels`]
    WholeImage,
    /// [`Codec::start_incremental_decode`] opened a session
    Incremental,
    /// [`Codec::start_scanline_decode`] opened a session
    Scanline,
}

/// Whether a decode call produced every requested row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStatus {
    /// All rows were decoded
    Complete,
    /// The stream ran dry first; more bytes allow the decode to continue
    IncompleteInput,
}

/// Outcome of a whole-image or incremental decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeReport {
    /// Whether decoding finished
    pub status: DecodeStatus,
    /// Destination rows that hold decoded pixels
    pub rows_decoded: u32,
    /// Entries written to the color table for [`ColorType::Index8`] targets
    pub color_count: usize,
}

impl DecodeReport {
    /// Result code of this call.
    pub fn code(&self) -> ResultCode {
        match self.status {
            DecodeStatus::Complete => ResultCode::Success,
            DecodeStatus::IncompleteInput => ResultCode::IncompleteInput,
        }
    }

    /// Whether every row was decoded.
    pub fn is_complete(&self) -> bool {
        self.status == DecodeStatus::Complete
    }
}

/// What a decode call resolved its options to
#[derive(Debug, Clone, Copy)]
struct Plan {
    frame: usize,
    required: Option<usize>,
    subset: IRect,
    sample: u32,
}

impl Plan {
    fn columns(&self) -> Sampler {
        Sampler::new(self.subset.left, self.subset.width, self.sample)
    }

    fn rows(&self) -> Sampler {
        Sampler::new(self.subset.top, self.subset.height, self.sample)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Decoding,
    Complete,
    Failed,
}

enum Produced {
    /// The session row buffer holds destination row `y`
    Row(u32),
    Starved,
    Finished,
}

/// Per-session decode state
struct Session {
    target: ImageInfo,
    row_bytes: usize,
    writer: RowWriter,
    rows: Sampler,
    /// Native row from the decoder
    row: Vec<u8>,
    written: Vec<bool>,
    produced: u32,
    color_count: usize,
    /// Destination holds a composed prior frame
    blend: bool,
    dst_len: usize,
    state: SessionState,
}

impl Session {
    /// Decode until the next destination row is ready.
    fn next_output<S: Read + Seek>(
        &mut self,
        decoder: &mut Decoder,
        source: &mut Source<S>,
    ) -> Result<Produced> {
        loop {
            if self.produced == self.rows.count() {
                return Ok(Produced::Finished);
            }
            match decoder.next_row(source, &mut self.row)? {
                RowStep::Row(y) => {
                    if let Some(dy) = self.rows.output(y) {
                        self.produced += 1;
                        return Ok(Produced::Row(dy));
                    }
                }
                RowStep::NeedData => return Ok(Produced::Starved),
                RowStep::Done => return Ok(Produced::Finished),
            }
        }
    }

    /// Convert the current native row into destination row `dy`.
    fn write(&mut self, dy: u32, dst: &mut [u8]) {
        let start = dy as usize * self.row_bytes;
        let end = start + self.target.min_row_bytes();
        self.writer.write(&self.row, &mut dst[start..end]);
        self.written[dy as usize] = true;
    }

    fn zero_unwritten(&self, dst: &mut [u8]) {
        let min = self.target.min_row_bytes();
        for (dy, _) in self.written.iter().enumerate().filter(|(_, w)| !**w) {
            let start = dy * self.row_bytes;
            dst[start..start + min].fill(0);
        }
    }

    fn report(&self, status: DecodeStatus) -> DecodeReport {
        DecodeReport {
            status,
            rows_decoded: self.produced,
            color_count: self.color_count,
        }
    }
}

/// Decoder bound to one encoded image stream
///
/// Construction sniffs the format and parses the header. The codec then
/// serves whole-image, incremental or scanline decodes into caller-owned
/// memory, rewinding its stream between decodes as needed.
pub struct Codec<S> {
    source: Source<S>,
    decoder: Decoder,
    config: DecoderConfig,
    format: ImageFormat,
    info: ImageInfo,
    encoded: EncodedInfo,
    layout: RowLayout,
    origin: Origin,
    has_alpha: bool,
    mode: DecodeMode,
    session: Option<Session>,
}

impl Codec<Cursor<Data>> {
    /// Codec over an immutable in-memory buffer.
    pub fn from_data(data: impl Into<Data>) -> Result<Self> {
        Self::new(Cursor::new(data.into()))
    }
}

impl<S: Read + Seek> Codec<S> {
    /// Sniff and parse `stream` with default settings.
    pub fn new(stream: S) -> Result<Self> {
        Self::with_config(stream, &DecoderConfig::default())
    }

    /// Sniff and parse `stream`.
    ///
    /// Fails with [`Error::IncompleteInput`] when the header is truncated,
    /// [`Error::UnrecognizedFormat`] when no decoder claims the stream and
    /// [`Error::InvalidInput`] when the header is corrupt. The stream is
    /// dropped on failure.
    pub fn with_config(stream: S, config: &DecoderConfig) -> Result<Self> {
        let mut source = Source::new(stream, config.read_chunk_size);
        source.fill(MIN_BUFFERED_BYTES_NEEDED)?;
        let format = match ImageFormat::detect(source.bytes()) {
            Some(format) => format,
            // a short prefix is only worth retrying if more bytes can arrive
            // or it may be a signature cut off by the end of the stream
            None if source.available() < MIN_BUFFERED_BYTES_NEEDED
                && (!source.at_eof() || ImageFormat::is_truncated_signature(source.bytes())) =>
            {
                return Err(at(Error::IncompleteInput));
            }
            None => return Err(at(Error::UnrecognizedFormat)),
        };
        let (decoder, header) = Decoder::read_header(format, &mut source, config)?;
        if config.exceeds_size_limit(header.width, header.height) {
            return Err(at(Error::ImageTooLarge {
                width: header.width,
                height: header.height,
            }));
        }

        let color_type = if header.layout == RowLayout::Gray8 {
            ColorType::Gray8
        } else {
            ColorType::Rgba8888
        };
        let alpha_type = if header.has_alpha {
            AlphaType::Premul
        } else {
            AlphaType::Opaque
        };
        let info = ImageInfo::new(header.width, header.height, color_type, alpha_type)
            .with_color_space(header.color_space);
        log::debug!("{format} codec: {info:?}");

        Ok(Self {
            source,
            decoder,
            config: config.clone(),
            format,
            info,
            encoded: header.encoded,
            layout: header.layout,
            origin: header.origin,
            has_alpha: header.has_alpha,
            mode: DecodeMode::None,
            session: None,
        })
    }

    /// The owned stream, so a growable source can receive more bytes.
    pub fn stream_mut(&mut self) -> &mut S {
        self.source.stream_mut()
    }

    /// Release the stream.
    pub fn into_inner(self) -> S {
        self.source.into_inner()
    }

    /// Native dimensions and pixel layout.
    pub fn info(&self) -> ImageInfo {
        self.info
    }

    /// Color model and bit depth stored in the stream.
    pub fn encoded_info(&self) -> EncodedInfo {
        self.encoded
    }

    /// Stored orientation.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn encoded_format(&self) -> ImageFormat {
        self.format
    }

    pub fn decode_mode(&self) -> DecodeMode {
        self.mode
    }

    /// Dimensions closest to `desired_scale` that a decode can produce.
    ///
    /// Picks the largest sample size `s` in {1, 2, 4, 8} with
    /// `1 / s >= desired_scale`.
    pub fn scaled_dimensions(&self, desired_scale: f32) -> (u32, u32) {
        let sample = SAMPLE_SIZES
            .into_iter()
            .rev()
            .find(|&s| 1.0 / s as f32 >= desired_scale)
            .unwrap_or(1);
        (
            scaled(self.info.width, sample),
            scaled(self.info.height, sample),
        )
    }

    /// Clamp `desired` to the image, or `None` if it misses the image or
    /// the format cannot decode subsets.
    pub fn valid_subset(&self, desired: IRect) -> Option<IRect> {
        if !self.decoder.supports_subset() {
            return None;
        }
        desired.intersect(&IRect::from_size(self.info.width, self.info.height))
    }

    /// Number of frames found so far; 1 for still images.
    pub fn frame_count(&mut self) -> usize {
        self.scan_frames();
        self.decoder.frames().map_or(1, |t| t.len().max(1))
    }

    /// How often an animation repeats.
    pub fn repetition_count(&mut self) -> RepetitionCount {
        self.scan_frames();
        self.decoder.repetition_count()
    }

    /// Frames found so far; empty for still images.
    ///
    /// Scans whatever the stream can deliver. Once the end of the frame
    /// sequence has been seen the table no longer changes.
    pub fn frame_info(&mut self) -> &[FrameInfo] {
        self.scan_frames();
        match self.decoder.frames() {
            Some(table) => table.frames(),
            None => &[],
        }
    }

    /// One entry of [`frame_info`](Self::frame_info).
    pub fn frame_info_at(&mut self, index: usize) -> Option<FrameInfo> {
        self.frame_info().get(index).copied()
    }

    fn scan_frames(&mut self) {
        if let Err(e) = self.decoder.scan_frames(&mut self.source, &self.config) {
            log::warn!("frame scan stopped: {e:?}");
        }
    }

    /// Decode a whole image into `dst`.
    ///
    /// On a starved stream, rows that were not decoded are zeroed and the
    /// report says [`DecodeStatus::IncompleteInput`]. On corrupt pixel data
    /// they are zeroed and [`Error::ErrorInInput`] carries the decoded row
    /// count. Rows under a composed prior frame are left as they are.
    pub fn get_pixels(
        &mut self,
        target: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<DecodeReport> {
        check_target(target, color_table.is_some())?;
        check_buffer(target, dst.len(), row_bytes)?;
        if !options.apply_origin || self.origin.is_identity() {
            return self.decode_whole(target, dst, row_bytes, options, color_table);
        }

        let (w, h) = self.origin.display_dimensions(target.width, target.height);
        let stored = target.with_dimensions(w, h);
        let stored_row_bytes = stored.min_row_bytes();
        let mut tmp = vec![0u8; stored.compute_byte_size(stored_row_bytes)];
        let result = self.decode_whole(&stored, &mut tmp, stored_row_bytes, options, color_table);
        let transform = |dst: &mut [u8]| {
            self.origin.transform(
                &tmp,
                stored_row_bytes,
                w,
                h,
                stored.bytes_per_pixel(),
                dst,
                row_bytes,
            )
        };
        match result {
            Ok(report) => {
                transform(dst);
                Ok(report)
            }
            Err(e) => {
                if matches!(e.error(), Error::ErrorInInput { .. }) {
                    transform(dst);
                }
                Err(e)
            }
        }
    }

    fn decode_whole(
        &mut self,
        target: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<DecodeReport> {
        self.start(
            DecodeMode::WholeImage,
            target,
            Some(&mut *dst),
            row_bytes,
            options,
            color_table,
        )?;
        let result = self.pump(dst);
        self.mode = DecodeMode::WholeImage;
        if let Some(session) = self.session.take()
            && !session.blend
            && session.state != SessionState::Complete
        {
            session.zero_unwritten(dst);
        }
        result
    }

    /// Open an incremental decode into `dst`.
    ///
    /// No rows are decoded until [`incremental_decode`](Self::incremental_decode).
    /// Required frames that are not already in `dst` (see
    /// [`DecodeOptions::prior_frame`]) are composed now and must be fully
    /// received, otherwise this fails with [`Error::IncompleteInput`].
    pub fn start_incremental_decode(
        &mut self,
        target: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<()> {
        check_target(target, color_table.is_some())?;
        check_buffer(target, dst.len(), row_bytes)?;
        self.start(DecodeMode::Incremental, target, Some(dst), row_bytes, options, color_table)
    }

    /// Decode as many rows as the stream allows.
    ///
    /// `dst` must be the buffer passed to
    /// [`start_incremental_decode`](Self::start_incremental_decode).
    /// Rows already decoded are never decoded again.
    pub fn incremental_decode(&mut self, dst: &mut [u8]) -> Result<DecodeReport> {
        if self.mode != DecodeMode::Incremental {
            return Err(at(Error::InvalidParameters("incremental decode not started")));
        }
        let Some(session) = self.session.as_ref() else {
            return Err(at(Error::InvalidParameters("incremental decode not started")));
        };
        if dst.len() != session.dst_len {
            return Err(at(Error::InvalidParameters(
                "buffer differs from the one the decode started with",
            )));
        }
        match session.state {
            SessionState::Complete => return Ok(session.report(DecodeStatus::Complete)),
            SessionState::Failed => {
                return Err(at(Error::InvalidParameters("incremental decode already failed")));
            }
            SessionState::Decoding => {}
        }
        self.pump(dst)
    }

    /// Open a scanline decode.
    ///
    /// Frames that depend on earlier frames cannot be decoded by scanline.
    pub fn start_scanline_decode(
        &mut self,
        target: &ImageInfo,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<()> {
        check_target(target, color_table.is_some())?;
        self.start(DecodeMode::Scanline, target, None, target.min_row_bytes(), options, color_table)
    }

    /// Decode up to `count` rows into consecutive rows of `dst`.
    ///
    /// Rows arrive in [`scanline_order`](Self::scanline_order). Returns the
    /// number of rows written; requested rows past a starved stream are
    /// zeroed and not counted.
    pub fn get_scanlines(&mut self, dst: &mut [u8], count: u32, row_bytes: usize) -> Result<u32> {
        let session = self.scanline_session()?;
        let count = count.min(session.rows.count() - session.produced);
        if count == 0 {
            return Ok(0);
        }
        let lines = session.target.with_dimensions(session.target.width, count);
        check_buffer(&lines, dst.len(), row_bytes)?;
        let min = session.target.min_row_bytes();

        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        for i in 0..count {
            match session.next_output(&mut self.decoder, &mut self.source) {
                Ok(Produced::Row(_)) => {
                    let start = i as usize * row_bytes;
                    session.writer.write(&session.row, &mut dst[start..start + min]);
                }
                Ok(Produced::Starved | Produced::Finished) => {
                    zero_rows(dst, row_bytes, min, i, count - i);
                    return Ok(i);
                }
                Err(e) => {
                    session.state = SessionState::Failed;
                    return Err(with_rows(e, session.produced));
                }
            }
        }
        Ok(count)
    }

    /// Decode and drop `count` rows; `false` when fewer were available.
    pub fn skip_scanlines(&mut self, count: u32) -> Result<bool> {
        self.scanline_session()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        for _ in 0..count {
            match session.next_output(&mut self.decoder, &mut self.source) {
                Ok(Produced::Row(_)) => {}
                Ok(Produced::Starved | Produced::Finished) => return Ok(false),
                Err(e) => {
                    session.state = SessionState::Failed;
                    return Err(with_rows(e, session.produced));
                }
            }
        }
        Ok(true)
    }

    fn scanline_session(&self) -> Result<&Session> {
        match (&self.session, self.mode) {
            (Some(s), DecodeMode::Scanline) if s.state != SessionState::Failed => Ok(s),
            _ => Err(at(Error::InvalidParameters("scanline decode not started"))),
        }
    }

    /// Order in which scanline decodes emit rows.
    pub fn scanline_order(&self) -> ScanlineOrder {
        self.decoder.scanline_order()
    }

    /// Rows emitted by the current scanline decode.
    pub fn next_scanline(&self) -> u32 {
        match (&self.session, self.mode) {
            (Some(s), DecodeMode::Scanline) => s.produced,
            _ => 0,
        }
    }

    /// Output row of the `input_scanline`-th emitted row.
    ///
    /// Identity for top-down decodes. Out-of-range inputs are returned
    /// unchanged.
    pub fn output_scanline(&self, input_scanline: u32) -> u32 {
        let rows = match (&self.session, self.mode) {
            (Some(s), DecodeMode::Scanline) => s.rows,
            _ => Sampler::new(0, self.info.height, 1),
        };
        let mut seen = 0;
        let mut k = 0;
        while let Some(y) = self.decoder.row_at_decode_index(k) {
            if let Some(dy) = rows.output(y) {
                if seen == input_scanline {
                    return dy;
                }
                seen += 1;
            }
            k += 1;
        }
        input_scanline
    }

    /// Allocate a tightly packed buffer and decode the whole image into it.
    pub fn pixels(
        &mut self,
        target: &ImageInfo,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<(Vec<u8>, DecodeReport)> {
        let row_bytes = target.min_row_bytes();
        let mut buf = vec![0u8; target.compute_byte_size(row_bytes)];
        let report = self.get_pixels(target, &mut buf, row_bytes, options, color_table)?;
        Ok((buf, report))
    }

    /// Decode frame 0 into an owned image with straight alpha.
    ///
    /// Gray sources decode to [`DecodedImage::Gray8`], everything else to
    /// [`DecodedImage::Rgba8`]. A truncated stream is an error here.
    pub fn decode_image(&mut self) -> Result<DecodedImage> {
        let info = self.info;
        let (w, h) = (info.width as usize, info.height as usize);
        let options = DecodeOptions::default();
        if info.color_type == ColorType::Gray8 {
            let mut buf = vec![0u8; w * h];
            let report = self.get_pixels(&info, &mut buf, w, &options, None)?;
            complete(report)?;
            return Ok(DecodedImage::Gray8(ImgVec::new(buf, w, h)));
        }
        let target = info
            .with_color_type(ColorType::Rgba8888)
            .with_alpha_type(AlphaType::Unpremul);
        let mut pixels = vec![Rgba::new(0u8, 0, 0, 0); w * h];
        let report = self.get_pixels(
            &target,
            bytemuck::cast_slice_mut(&mut pixels),
            w * 4,
            &options,
            None,
        )?;
        complete(report)?;
        Ok(DecodedImage::Rgba8(ImgVec::new(pixels, w, h)))
    }

    /// Validate, resolve options and open a session.
    fn start(
        &mut self,
        mode: DecodeMode,
        target: &ImageInfo,
        dst: Option<&mut [u8]>,
        row_bytes: usize,
        options: &DecodeOptions,
        color_table: Option<&mut ColorTable>,
    ) -> Result<()> {
        self.mode = DecodeMode::None;
        self.session = None;

        let plan = self.plan(target, options)?;
        let color_count = match color_table {
            Some(table) if target.color_type == ColorType::Index8 => {
                let premul = target.alpha_type == AlphaType::Premul;
                table.fill(self.decoder.palette(), self.encoded.bits_per_component, premul)
            }
            _ => 0,
        };
        let dst_len = dst.as_ref().map_or(0, |d| d.len());
        let blend = match (plan.required, dst) {
            (None, _) => false,
            (Some(_), None) => {
                return Err(at(Error::Unsupported("scanline decode of a dependent frame")));
            }
            (Some(required), Some(dst)) => {
                self.compose(&plan, required, options.prior_frame, target, dst, row_bytes)?;
                true
            }
        };

        self.decoder.start_frame(&mut self.source, plan.frame)?;
        log::debug!(
            "{mode:?} decode of frame {} into {}x{} (sample size {})",
            plan.frame,
            target.width,
            target.height,
            plan.sample
        );
        let session = self.session_for(&plan, target, row_bytes, dst_len, blend, color_count);
        self.session = Some(session);
        self.mode = mode;
        Ok(())
    }

    fn session_for(
        &self,
        plan: &Plan,
        target: &ImageInfo,
        row_bytes: usize,
        dst_len: usize,
        blend: bool,
        color_count: usize,
    ) -> Session {
        let rows = plan.rows();
        let writer = RowWriter::new(
            self.layout,
            self.decoder.palette(),
            target,
            plan.columns(),
            blend,
        );
        Session {
            target: *target,
            row_bytes,
            writer,
            rows,
            row: vec![0; self.info.width as usize * self.layout.bytes_per_pixel()],
            written: vec![false; rows.count() as usize],
            produced: 0,
            color_count,
            blend,
            dst_len,
            state: SessionState::Decoding,
        }
    }

    fn plan(&mut self, target: &ImageInfo, options: &DecodeOptions) -> Result<Plan> {
        let frame = options.frame_index;
        if self.decoder.frames().is_some() {
            self.decoder.scan_frames(&mut self.source, &self.config)?;
        }
        let (required, has_alpha) = match self.decoder.frames() {
            Some(table) => match table.get(frame) {
                Some(f) => (f.required_frame, f.has_alpha),
                None if table.complete => {
                    return Err(at(Error::InvalidParameters("frame index out of range")));
                }
                None => return Err(at(Error::IncompleteInput)),
            },
            None if frame == 0 => (None, self.has_alpha),
            None => return Err(at(Error::InvalidParameters("frame index out of range"))),
        };
        check_conversion(
            &self.encoded,
            self.layout,
            self.info.color_space,
            has_alpha,
            target,
        )?;

        let bounds = IRect::from_size(self.info.width, self.info.height);
        let subset = match options.subset {
            None => bounds,
            Some(_) if !self.decoder.supports_subset() => {
                return Err(at(Error::Unsupported("subset decoding")));
            }
            Some(s) if s.is_empty() || !bounds.contains(&s) => {
                return Err(at(Error::InvalidParameters("subset outside the image")));
            }
            Some(s) => s,
        };
        let sample = SAMPLE_SIZES
            .into_iter()
            .find(|&s| {
                scaled(subset.width, s) == target.width && scaled(subset.height, s) == target.height
            })
            .ok_or_else(|| {
                at(Error::InvalidScale {
                    width: target.width,
                    height: target.height,
                })
            })?;
        Ok(Plan {
            frame,
            required,
            subset,
            sample,
        })
    }

    /// Bring `dst` to the canvas state frame `plan.frame` is drawn over.
    fn compose(
        &mut self,
        plan: &Plan,
        required: usize,
        prior: Option<usize>,
        target: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
    ) -> Result<()> {
        let frames = self
            .decoder
            .frames()
            .map(|t| t.frames().to_vec())
            .unwrap_or_default();
        let info = |i: usize| {
            frames
                .get(i)
                .copied()
                .ok_or_else(|| at(Error::InvalidParameters("frame index out of range")))
        };

        let base = match prior {
            Some(p) => {
                if p < required
                    || p >= plan.frame
                    || info(p)?.disposal == DisposalMethod::RestorePrevious
                {
                    return Err(at(Error::InvalidParameters(
                        "prior frame cannot be drawn under this frame",
                    )));
                }
                p
            }
            None => {
                let mut chain = vec![required];
                while let Some(r) = info(chain[chain.len() - 1])?.required_frame {
                    chain.push(r);
                }
                for &i in &chain {
                    if !info(i)?.fully_received {
                        return Err(at(Error::IncompleteInput));
                    }
                }
                log::debug!("composing frame {} over frames {chain:?}", plan.frame);
                let mut under: Option<FrameInfo> = None;
                for &index in chain.iter().rev() {
                    if let Some(under) = &under {
                        clear_disposed(under, plan, target, dst, row_bytes);
                    }
                    self.draw_frame(index, under.is_some(), plan, target, dst, row_bytes)?;
                    under = Some(info(index)?);
                }
                required
            }
        };
        clear_disposed(&info(base)?, plan, target, dst, row_bytes);
        Ok(())
    }

    /// Decode a fully received frame into `dst`.
    fn draw_frame(
        &mut self,
        index: usize,
        blend: bool,
        plan: &Plan,
        target: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
    ) -> Result<()> {
        self.decoder.start_frame(&mut self.source, index)?;
        let mut session = self.session_for(plan, target, row_bytes, dst.len(), blend, 0);
        loop {
            match session.next_output(&mut self.decoder, &mut self.source)? {
                Produced::Row(dy) => session.write(dy, dst),
                Produced::Starved => return Err(at(Error::IncompleteInput)),
                Produced::Finished => return Ok(()),
            }
        }
    }

    /// Decode rows of the open session into `dst` until done or starved.
    fn pump(&mut self, dst: &mut [u8]) -> Result<DecodeReport> {
        let Some(session) = self.session.as_mut() else {
            return Err(at(Error::InvalidParameters("no decode in progress")));
        };
        loop {
            match session.next_output(&mut self.decoder, &mut self.source) {
                Ok(Produced::Row(dy)) => session.write(dy, dst),
                Ok(Produced::Starved) => {
                    log::trace!("stream starved after {} rows", session.produced);
                    return Ok(session.report(DecodeStatus::IncompleteInput));
                }
                Ok(Produced::Finished) => {
                    session.state = SessionState::Complete;
                    return Ok(session.report(DecodeStatus::Complete));
                }
                Err(e) => {
                    session.state = SessionState::Failed;
                    return Err(with_rows(e, session.produced));
                }
            }
        }
    }
}

/// Zero the destination pixels of `frame` if it is disposed to background.
fn clear_disposed(
    frame: &FrameInfo,
    plan: &Plan,
    target: &ImageInfo,
    dst: &mut [u8],
    row_bytes: usize,
) {
    if frame.disposal != DisposalMethod::RestoreBackground {
        return;
    }
    let b = frame.bounds;
    let (columns, rows) = (plan.columns(), plan.rows());
    let bpp = target.bytes_per_pixel();
    for dy in 0..rows.count() {
        let y = rows.source(dy);
        if y < b.top || y >= b.bottom() {
            continue;
        }
        let row = &mut dst[dy as usize * row_bytes..];
        for dx in 0..columns.count() {
            let x = columns.source(dx);
            if x >= b.left && x < b.right() {
                let i = dx as usize * bpp;
                row[i..i + bpp].fill(0);
            }
        }
    }
}

fn scaled(dim: u32, sample: u32) -> u32 {
    (dim / sample).max(1)
}

fn check_target(target: &ImageInfo, has_color_table: bool) -> Result<()> {
    if target.is_empty() {
        return Err(at(Error::InvalidParameters("empty target dimensions")));
    }
    if target.color_type == ColorType::Index8 && !has_color_table {
        return Err(at(Error::MissingColorTable));
    }
    Ok(())
}

fn check_buffer(target: &ImageInfo, len: usize, row_bytes: usize) -> Result<()> {
    if row_bytes < target.min_row_bytes() {
        return Err(at(Error::InvalidParameters("row stride too small")));
    }
    if len < target.compute_byte_size(row_bytes) {
        return Err(at(Error::InvalidParameters("destination buffer too small")));
    }
    Ok(())
}

/// Attach the decoded row count to a corrupt-data error.
fn with_rows(mut err: At<Error>, rows: u32) -> At<Error> {
    if let Error::ErrorInInput { rows_decoded, .. } = err.error_mut() {
        *rows_decoded = rows;
    }
    err.at()
}

fn complete(report: DecodeReport) -> Result<()> {
    match report.status {
        DecodeStatus::Complete => Ok(()),
        DecodeStatus::IncompleteInput => Err(at(Error::IncompleteInput)),
    }
}
