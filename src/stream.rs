//! Byte sources consumed by [`Codec`](crate::Codec)

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use whereat::at;

use crate::error::{Error, Result};

/// Immutable, cheaply clonable encoded bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data(Arc<[u8]>);

impl Data {
    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Data(bytes.into())
    }
}

impl From<&[u8]> for Data {
    fn from(bytes: &[u8]) -> Self {
        Data(bytes.into())
    }
}

impl From<Arc<[u8]>> for Data {
    fn from(bytes: Arc<[u8]>) -> Self {
        Data(bytes)
    }
}

/// In-memory stream whose bytes arrive over time
///
/// Reads past the received bytes fail with [`io::ErrorKind::WouldBlock`]
/// until [`finish`](Self::finish) is called, after which they report end of
/// stream. A [`Codec`](crate::Codec) treats both as a starved stream and
/// answers with `IncompleteInput`, so the caller can
/// [`push`](Self::push) more bytes through
/// [`Codec::stream_mut`](crate::Codec::stream_mut) and retry.
#[derive(Debug, Default, Clone)]
pub struct GrowingStream {
    data: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl GrowingStream {
    /// Empty stream awaiting bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream that starts with `initial` bytes received.
    pub fn with_prefix(initial: &[u8]) -> Self {
        Self {
            data: initial.to_vec(),
            pos: 0,
            finished: false,
        }
    }

    /// Append newly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Mark that no more bytes will arrive.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether [`finish`](Self::finish) was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes received so far.
    pub fn received(&self) -> usize {
        self.data.len()
    }
}

impl Read for GrowingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        if remaining.is_empty() {
            if self.finished || buf.is_empty() {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for GrowingStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => self.pos as i128 + i128::from(d),
            SeekFrom::End(d) => self.data.len() as i128 + i128::from(d),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}

/// Buffered view of the codec's owned stream.
///
/// Bytes read from the stream stay in `buf` until discarded, so decoders can
/// peek ahead and resume after the stream runs dry. `base` is the stream
/// offset of `buf[0]`; the stream itself is always positioned at the end of
/// `buf`.
pub(crate) struct Source<S> {
    stream: S,
    buf: Vec<u8>,
    base: u64,
    pos: usize,
    chunk: usize,
    /// The last read reported end of stream rather than `WouldBlock`
    eof: bool,
}

impl<S: Read + Seek> Source<S> {
    pub(crate) fn new(stream: S, chunk: usize) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            base: 0,
            pos: 0,
            chunk: chunk.max(1),
            eof: false,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub(crate) fn into_inner(self) -> S {
        self.stream
    }

    /// Absolute stream offset of the read cursor.
    pub(crate) fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Buffered bytes past the cursor.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Try to buffer at least `want` bytes past the cursor.
    ///
    /// Returns `false` when the stream is starved (end of data or
    /// `WouldBlock`) before `want` bytes arrived; [`at_eof`](Self::at_eof)
    /// tells the two apart.
    pub(crate) fn fill(&mut self, want: usize) -> Result<bool> {
        while self.available() < want {
            let need = (want - self.available()).max(self.chunk);
            let start = self.buf.len();
            self.buf.resize(start + need, 0);
            let read = self.stream.read(&mut self.buf[start..]);
            match read {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    self.eof = n == 0;
                    if n == 0 {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    self.buf.truncate(start);
                    match e.kind() {
                        io::ErrorKind::Interrupted => {}
                        io::ErrorKind::WouldBlock => {
                            self.eof = false;
                            return Ok(false);
                        }
                        io::ErrorKind::UnexpectedEof => {
                            self.eof = true;
                            return Ok(false);
                        }
                        _ => return Err(at(Error::Io(e))),
                    }
                }
            }
        }
        Ok(true)
    }

    /// Whether the last starved read hit the end of the stream, so no more
    /// bytes will arrive.
    pub(crate) fn at_eof(&self) -> bool {
        self.eof
    }

    /// Buffer whatever the stream can deliver right now.
    pub(crate) fn fill_available(&mut self) -> Result<()> {
        let want = self.available() + self.chunk;
        self.fill(want).map(|_| ())
    }

    /// `n` bytes at the cursor, if buffered.
    pub(crate) fn peek(&self, n: usize) -> Option<&[u8]> {
        self.bytes().get(..n)
    }

    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.pos += n.min(self.available());
    }

    /// Fill, then consume and return exactly `n` bytes; `None` when starved.
    pub(crate) fn take(&mut self, n: usize) -> Result<Option<&[u8]>> {
        if !self.fill(n)? {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += n;
        Ok(Some(&self.buf[start..start + n]))
    }

    /// Skip `n` bytes; returns how many were skipped before starving.
    pub(crate) fn skip(&mut self, n: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if self.available() == 0 {
                if !self.fill(1)? {
                    break;
                }
            }
            let step = (n - skipped).min(self.available());
            self.pos += step;
            skipped += step;
        }
        Ok(skipped)
    }

    /// Drop bytes before the cursor.
    pub(crate) fn discard_consumed(&mut self) {
        self.discard_before(self.offset());
    }

    /// Drop buffered bytes before absolute `offset`, never past the cursor.
    pub(crate) fn discard_before(&mut self, offset: u64) {
        let n = offset.saturating_sub(self.base).min(self.pos as u64) as usize;
        if n == 0 {
            return;
        }
        let _ = self.buf.drain(..n);
        self.base += n as u64;
        self.pos -= n;
    }

    /// Absolute stream offset of the first buffered byte.
    pub(crate) fn buffer_start(&self) -> u64 {
        self.base
    }

    /// Move the cursor to absolute offset `offset`.
    ///
    /// Offsets still buffered are free. Later offsets read forward and fail
    /// with [`Error::IncompleteInput`] if the stream starves first; a retry
    /// continues from the bytes read so far. Earlier offsets seek the stream
    /// and fail with [`Error::CouldNotRewind`] if it refuses.
    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<()> {
        if !self.try_seek_to(offset)? {
            return Err(at(Error::IncompleteInput));
        }
        Ok(())
    }

    /// [`seek_to`](Self::seek_to) that reports a starved forward seek as
    /// `Ok(false)`.
    pub(crate) fn try_seek_to(&mut self, offset: u64) -> Result<bool> {
        let end = self.base + self.buf.len() as u64;
        if offset >= self.base && offset <= end {
            self.pos = (offset - self.base) as usize;
            return Ok(true);
        }
        if offset > end {
            let gap = usize::try_from(offset - end)
                .map_err(|_| at(Error::InvalidInput("seek offset out of range")))?;
            self.pos = self.buf.len();
            if self.skip(gap)? < gap {
                log::trace!("stream starved seeking forward to {offset}");
                return Ok(false);
            }
            return Ok(true);
        }
        log::debug!("rewinding stream from {} to {offset}", self.offset());
        self.stream
            .seek(SeekFrom::Start(offset))
            .map_err(|_| at(Error::CouldNotRewind))?;
        self.buf.clear();
        self.base = offset;
        self.pos = 0;
        self.eof = false;
        Ok(true)
    }
}
