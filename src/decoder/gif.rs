//! GIF decoder with a lazily scanned frame table

use std::io::{Read, Seek};

use rgb::Rgba;
use weezl::{BitOrder, LzwStatus};
use whereat::at;

use super::{Header, RowStep, ScanlineOrder, corrupt, header_bytes};
use crate::config::DecoderConfig;
use crate::convert::RowLayout;
use crate::error::{Error, Result};
use crate::frame::{BlendMode, DisposalMethod, FrameHeader, FrameTable, RepetitionCount};
use crate::image::{ColorSpace, EncodedAlpha, EncodedColor, EncodedInfo, IRect};
use crate::origin::Origin;
use crate::stream::Source;

const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const LABEL_GRAPHIC_CONTROL: u8 = 0xF9;
const LABEL_APPLICATION: u8 = 0xFF;

/// Interlace passes as (first row, row step)
const PASSES: [(u32, u32); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

#[derive(Debug, Clone, Copy, Default)]
struct GraphicControl {
    delay_cs: u16,
    disposal: DisposalMethod,
    transparent: Option<u8>,
}

#[derive(Debug, Clone)]
struct GifFrame {
    /// Frame rectangle as stored, possibly past the canvas
    rect: IRect,
    interlaced: bool,
    transparent: Option<u8>,
    local_palette: Option<Vec<Rgba<u8>>>,
    /// Offset of the LZW minimum code size byte
    data_offset: u64,
}

/// Frame-table scanner position
#[derive(Debug, Default)]
struct Scan {
    pos: u64,
    control: Option<GraphicControl>,
    /// Frame whose data sub-blocks are being skipped
    in_data: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Canvas rows above the frame
    Above(u32),
    /// `n` frame rows decoded so far
    Frame(u32),
    /// Canvas rows below the frame
    Below(u32),
}

pub(crate) struct GifDecoder {
    width: u32,
    height: u32,
    global_palette: Option<Vec<Rgba<u8>>>,
    frames: Vec<GifFrame>,
    table: FrameTable,
    repetition: RepetitionCount,
    scan: Scan,

    current: usize,
    colors: Vec<Rgba<u8>>,
    phase: Phase,
    lzw: Option<Lzw>,
    /// Read position inside the current frame's data
    pos: u64,
    block_left: usize,
    data_done: bool,
    indices: Vec<u8>,
    indices_filled: usize,
}

impl GifDecoder {
    pub(crate) fn read_header<S: Read + Seek>(
        src: &mut Source<S>,
        config: &DecoderConfig,
    ) -> Result<(Self, Header)> {
        let lsd = header_bytes(src, 13)?;
        if &lsd[..3] != b"GIF" {
            return Err(at(Error::InvalidInput("bad GIF signature")));
        }
        let width = u32::from(u16::from_le_bytes([lsd[6], lsd[7]]));
        let height = u32::from(u16::from_le_bytes([lsd[8], lsd[9]]));
        let packed = lsd[10];

        let global_palette = if packed & 0x80 != 0 {
            let n = 2usize << (packed & 0x07);
            Some(read_palette(header_bytes(src, n * 3)?))
        } else {
            None
        };

        let mut decoder = Self {
            width,
            height,
            global_palette,
            frames: Vec::new(),
            table: FrameTable::default(),
            repetition: RepetitionCount::Finite(0),
            scan: Scan {
                pos: src.offset(),
                ..Scan::default()
            },
            current: 0,
            colors: Vec::new(),
            phase: Phase::Above(0),
            lzw: None,
            pos: src.offset(),
            block_left: 0,
            data_done: false,
            indices: Vec::new(),
            indices_filled: 0,
        };

        decoder.scan(src, config, Some(0))?;
        let Some(first) = decoder.table.get(0) else {
            if decoder.table.complete {
                return Err(at(Error::InvalidInput("GIF has no frames")));
            }
            return Err(at(Error::IncompleteInput));
        };
        let has_alpha = first.has_alpha;
        let header = Header {
            width,
            height,
            encoded: EncodedInfo {
                color: EncodedColor::Palette,
                alpha: if has_alpha {
                    EncodedAlpha::Binary
                } else {
                    EncodedAlpha::Opaque
                },
                bits_per_component: 8,
            },
            layout: RowLayout::Rgba8,
            color_space: ColorSpace::Srgb,
            origin: Origin::TopLeft,
            has_alpha,
        };
        log::debug!("GIF {width}x{height}, first frame has alpha: {has_alpha}");
        Ok((decoder, header))
    }

    pub(crate) fn frames(&self) -> &FrameTable {
        &self.table
    }

    pub(crate) fn repetition_count(&self) -> RepetitionCount {
        self.repetition
    }

    /// Advance the frame table through the buffered and readable bytes.
    ///
    /// With `stop_after = Some(n)` scanning stops once frame `n` is recorded.
    pub(crate) fn scan<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        config: &DecoderConfig,
        stop_after: Option<usize>,
    ) -> Result<()> {
        loop {
            if self.table.complete {
                return Ok(());
            }
            if stop_after.is_some_and(|n| self.table.len() > n) {
                return Ok(());
            }
            src.seek_to(self.scan.pos)?;
            self.release(src);

            if let Some(index) = self.scan.in_data {
                let Some(n) = sub_blocks_len(src)? else {
                    return Ok(());
                };
                self.scan.pos += n as u64;
                self.table.mark_received(index);
                self.scan.in_data = None;
                if config.frame_limit_reached(self.table.len()) {
                    log::warn!("frame limit reached after {} frames", self.table.len());
                    self.table.complete = true;
                }
                continue;
            }

            if !src.fill(1)? {
                return Ok(());
            }
            match src.bytes()[0] {
                EXTENSION => {
                    if !src.fill(2)? {
                        return Ok(());
                    }
                    let label = src.bytes()[1];
                    src.consume(2);
                    let Some(n) = sub_blocks_len(src)? else {
                        return Ok(());
                    };
                    let body = &src.bytes()[..n];
                    match label {
                        LABEL_GRAPHIC_CONTROL => self.scan.control = parse_control(body),
                        LABEL_APPLICATION => {
                            if let Some(r) = parse_loop_count(body) {
                                self.repetition = r;
                            }
                        }
                        _ => {}
                    }
                    self.scan.pos += 2 + n as u64;
                }
                IMAGE => {
                    if !src.fill(10)? {
                        return Ok(());
                    }
                    let d = &src.bytes()[..10];
                    let rect = IRect::new(
                        u32::from(u16::from_le_bytes([d[1], d[2]])),
                        u32::from(u16::from_le_bytes([d[3], d[4]])),
                        u32::from(u16::from_le_bytes([d[5], d[6]])),
                        u32::from(u16::from_le_bytes([d[7], d[8]])),
                    );
                    let packed = d[9];
                    let local_len = if packed & 0x80 != 0 {
                        3 * (2usize << (packed & 0x07))
                    } else {
                        0
                    };
                    // descriptor, local table, LZW code size
                    if !src.fill(10 + local_len + 1)? {
                        return Ok(());
                    }
                    let local_palette =
                        (local_len > 0).then(|| read_palette(&src.bytes()[10..10 + local_len]));
                    let control = self.scan.control.take().unwrap_or_default();
                    let data_offset = self.scan.pos + 10 + local_len as u64;
                    self.frames.push(GifFrame {
                        rect,
                        interlaced: packed & 0x40 != 0,
                        transparent: control.transparent,
                        local_palette,
                        data_offset,
                    });
                    let canvas = IRect::from_size(self.width, self.height);
                    let empty =
                        IRect::new(rect.left.min(self.width), rect.top.min(self.height), 0, 0);
                    let bounds = rect.intersect(&canvas).unwrap_or(empty);
                    self.table.push(
                        FrameHeader {
                            bounds,
                            duration_ms: u32::from(control.delay_cs) * 10,
                            disposal: control.disposal,
                            blend: BlendMode::SrcOver,
                            transparent: control.transparent.is_some(),
                        },
                        canvas,
                        false,
                    );
                    log::trace!("GIF frame {} at {rect:?}", self.table.len() - 1);
                    self.scan.pos = data_offset + 1;
                    self.scan.in_data = Some(self.table.len() - 1);
                }
                TRAILER => {
                    log::debug!("GIF trailer after {} frames", self.table.len());
                    self.table.complete = true;
                }
                other => {
                    if self.table.len() == 0 {
                        return Err(at(Error::InvalidInput("unknown GIF block")));
                    }
                    log::warn!("unknown GIF block {other:#04x}, ending frame scan");
                    self.table.complete = true;
                }
            }
        }
    }

    pub(crate) fn start_frame<S: Read + Seek>(
        &mut self,
        _src: &mut Source<S>,
        index: usize,
    ) -> Result<()> {
        let frame = self
            .frames
            .get(index)
            .ok_or_else(|| at(Error::InvalidParameters("frame index out of range")))?;
        let palette = frame
            .local_palette
            .as_ref()
            .or(self.global_palette.as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut colors = palette.to_vec();
        colors.resize(256, Rgba::new(0, 0, 0, 255));
        if let Some(t) = frame.transparent {
            colors[usize::from(t)] = Rgba::new(0, 0, 0, 0);
        }
        self.colors = colors;
        self.indices = vec![0; frame.rect.width as usize];
        self.indices_filled = 0;
        self.pos = frame.data_offset;
        self.current = index;
        self.phase = Phase::Above(0);
        self.lzw = None;
        self.block_left = 0;
        self.data_done = false;
        Ok(())
    }

    fn frame(&self) -> Option<&GifFrame> {
        self.frames.get(self.current)
    }

    /// Canvas rows `[top, bottom)` the current frame draws.
    fn visible_rows(&self) -> (u32, u32) {
        let Some(f) = self.frame() else {
            return (self.height, self.height);
        };
        let top = f.rect.top.min(self.height);
        let bottom = f.rect.bottom().min(self.height);
        (top, bottom.max(top))
    }

    pub(crate) fn scanline_order(&self) -> ScanlineOrder {
        match self.frame() {
            Some(f) if f.interlaced && f.rect.height > 1 => ScanlineOrder::OutOfOrder,
            _ => ScanlineOrder::TopDown,
        }
    }

    pub(crate) fn row_at_decode_index(&self, k: u32) -> Option<u32> {
        if k >= self.height {
            return None;
        }
        let (top, bottom) = self.visible_rows();
        if k < top {
            return Some(k);
        }
        let visible = bottom - top;
        if k >= top + visible {
            return Some(k);
        }
        let frame = self.frame()?;
        let mut seen = 0;
        for j in 0..frame.rect.height {
            let y = top_row(frame, j);
            if y < self.height {
                if seen == k - top {
                    return Some(y);
                }
                seen += 1;
            }
        }
        None
    }

    pub(crate) fn next_row<S: Read + Seek>(
        &mut self,
        src: &mut Source<S>,
        out: &mut [u8],
    ) -> Result<RowStep> {
        let (top, bottom) = self.visible_rows();
        loop {
            match self.phase {
                Phase::Above(y) if y < top => {
                    out.fill(0);
                    self.phase = Phase::Above(y + 1);
                    return Ok(RowStep::Row(y));
                }
                Phase::Above(_) => self.phase = Phase::Frame(0),
                Phase::Frame(j) => {
                    let Some(frame) = self.frame() else {
                        return Ok(RowStep::Done);
                    };
                    if j >= frame.rect.height {
                        self.phase = Phase::Below(bottom);
                        continue;
                    }
                    let y = top_row(frame, j);
                    if !self.decode_indices(src)? {
                        return Ok(RowStep::NeedData);
                    }
                    self.indices_filled = 0;
                    self.phase = Phase::Frame(j + 1);
                    if y >= self.height {
                        continue;
                    }
                    self.write_row(out);
                    return Ok(RowStep::Row(y));
                }
                Phase::Below(y) if y < self.height => {
                    out.fill(0);
                    self.phase = Phase::Below(y + 1);
                    return Ok(RowStep::Row(y));
                }
                Phase::Below(_) => return Ok(RowStep::Done),
            }
        }
    }

    /// Fill `indices` with one frame row; `false` when starved.
    fn decode_indices<S: Read + Seek>(&mut self, src: &mut Source<S>) -> Result<bool> {
        src.seek_to(self.pos)?;
        if self.lzw.is_none() {
            if !src.fill(1)? {
                return Ok(false);
            }
            let min_size = src.bytes()[0];
            if !(1..=11).contains(&min_size) {
                return Err(corrupt("bad LZW code size"));
            }
            src.consume(1);
            self.pos += 1;
            self.lzw = Some(Lzw::new(min_size));
        }
        while self.indices_filled < self.indices.len() {
            let Some(lzw) = self.lzw.as_mut() else {
                return Err(corrupt("bad LZW state"));
            };
            let (_, written) = lzw.decode(&[], &mut self.indices[self.indices_filled..])?;
            self.indices_filled += written;
            if self.indices_filled == self.indices.len() {
                break;
            }
            if lzw.ended || self.data_done {
                return Err(corrupt("frame data ended early"));
            }
            if self.block_left == 0 {
                if !src.fill(1)? {
                    return Ok(false);
                }
                let len = usize::from(src.bytes()[0]);
                src.consume(1);
                self.pos += 1;
                if len == 0 {
                    self.data_done = true;
                }
                self.block_left = len;
                continue;
            }
            if src.available() == 0 && !src.fill(1)? {
                return Ok(false);
            }
            let take = src.available().min(self.block_left);
            let (used, written) =
                lzw.decode(&src.bytes()[..take], &mut self.indices[self.indices_filled..])?;
            src.consume(used);
            self.pos += used as u64;
            self.block_left -= used;
            self.indices_filled += written;
        }
        self.release(src);
        Ok(true)
    }

    /// Drop buffered bytes that neither the frame scan nor the current frame
    /// will read again. Earlier frames are re-read by seeking the stream.
    fn release<S: Read + Seek>(&self, src: &mut Source<S>) {
        src.discard_before(self.scan.pos.min(self.pos));
    }

    fn write_row(&self, out: &mut [u8]) {
        out.fill(0);
        let Some(frame) = self.frame() else {
            return;
        };
        let left = frame.rect.left as usize;
        let visible = (self.width as usize).saturating_sub(left).min(self.indices.len());
        for (x, &i) in self.indices[..visible].iter().enumerate() {
            let c = self.colors[usize::from(i)];
            let o = (left + x) * 4;
            out[o..o + 4].copy_from_slice(&[c.r, c.g, c.b, c.a]);
        }
    }
}

/// Canvas row of the `j`-th decoded row of `frame`.
fn top_row(frame: &GifFrame, j: u32) -> u32 {
    frame.rect.top + frame_row(frame.rect.height, frame.interlaced, j)
}

/// Frame-local row of the `j`-th decoded row.
fn frame_row(height: u32, interlaced: bool, mut j: u32) -> u32 {
    if !interlaced {
        return j;
    }
    for (start, step) in PASSES {
        let rows = height.saturating_sub(start).div_ceil(step);
        if j < rows {
            return start + j * step;
        }
        j -= rows;
    }
    j
}

fn read_palette(bytes: &[u8]) -> Vec<Rgba<u8>> {
    bytes
        .chunks_exact(3)
        .map(|c| Rgba::new(c[0], c[1], c[2], 255))
        .collect()
}

/// Length of a buffered sub-block chain, terminator included.
///
/// Buffers more bytes as needed; `None` when the stream is starved first.
fn sub_blocks_len<S: Read + Seek>(src: &mut Source<S>) -> Result<Option<usize>> {
    let mut n = 0;
    loop {
        if !src.fill(n + 1)? {
            return Ok(None);
        }
        let len = usize::from(src.bytes()[n]);
        n += 1 + len;
        if len == 0 {
            return Ok(Some(n));
        }
    }
}

/// Graphic control extension body, sub-block framing included.
fn parse_control(body: &[u8]) -> Option<GraphicControl> {
    if body.len() < 5 || body[0] < 4 {
        return None;
    }
    let packed = body[1];
    let disposal = match (packed >> 2) & 0x07 {
        2 => DisposalMethod::RestoreBackground,
        3 => DisposalMethod::RestorePrevious,
        _ => DisposalMethod::Keep,
    };
    Some(GraphicControl {
        delay_cs: u16::from_le_bytes([body[2], body[3]]),
        disposal,
        transparent: (packed & 0x01 != 0).then_some(body[4]),
    })
}

/// NETSCAPE2.0 / ANIMEXTS1.0 loop count; 0 loops forever.
fn parse_loop_count(body: &[u8]) -> Option<RepetitionCount> {
    if body.len() < 16 || body[0] != 11 {
        return None;
    }
    let id = &body[1..12];
    if id != b"NETSCAPE2.0" && id != b"ANIMEXTS1.0" {
        return None;
    }
    let sub = &body[12..];
    if sub[0] < 3 || sub[1] != 1 {
        return None;
    }
    Some(match u16::from_le_bytes([sub[2], sub[3]]) {
        0 => RepetitionCount::Infinite,
        n => RepetitionCount::Finite(u32::from(n)),
    })
}

/// Resumable LZW over one frame's data, fed a sub-block slice at a time
struct Lzw {
    decoder: weezl::decode::Decoder,
    ended: bool,
}

impl Lzw {
    fn new(min_size: u8) -> Self {
        Self {
            decoder: weezl::decode::Decoder::new(BitOrder::Lsb, min_size),
            ended: false,
        }
    }

    /// Decode from `input` into `out`; returns (bytes consumed, bytes written).
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> Result<(usize, usize)> {
        if self.ended {
            return Ok((0, 0));
        }
        let result = self.decoder.decode_bytes(input, out);
        match result.status {
            Ok(LzwStatus::Done) => self.ended = true,
            Ok(LzwStatus::Ok | LzwStatus::NoProgress) => {}
            Err(_) => return Err(corrupt("invalid LZW code")),
        }
        Ok((result.consumed_in, result.consumed_out))
    }
}
