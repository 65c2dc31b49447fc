use crate::buffers::{AdoptResult, PageBuffers};
use crate::constants::DEFAULT_PAGE_SIZE;
use crate::source::{AsyncDevice, DeviceSource, FileSource, PageSource, ReadDst};
use crate::span::PageSpan;
use crate::waiter::Waiter;
use crate::{Error, Result};
use futures::future::{self, Either};
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::time::Instant;

/// Close policy for streams whose source closes asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Block until the device is released.
    Wait,
    /// Abandon the close future; dropping the source still releases the
    /// device, and failures are only logged.
    DontWait,
}

/// Immutable memory a fixed-span stream reads from.
enum Backing<'a> {
    Borrowed(&'a [u8]),
    Mapped(memmap2::Mmap),
}

impl Backing<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Borrowed(bytes) => bytes,
            Backing::Mapped(map) => map.as_ref(),
        }
    }
}

/// The consumer-facing stream.
///
/// Holds the current span, the page queue, the page source and the absolute
/// position of the span's end. Reads observe bytes in exactly the order the
/// source yields them; a stream is owned by one consumer at a time.
pub struct InputStream<'a> {
    source: Option<Box<dyn PageSource>>,
    buffers: Option<PageBuffers>,
    backing: Option<Backing<'a>>,
    span: PageSpan,
    span_end_pos: u64,
    scratch: Vec<u8>,
    range_limit: Option<u64>,
    range_hidden: usize,
}

impl std::fmt::Debug for InputStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("has_source", &self.source.is_some())
            .field("has_buffers", &self.buffers.is_some())
            .field("has_backing", &self.backing.is_some())
            .field("span", &self.span)
            .field("span_end_pos", &self.span_end_pos)
            .field("range_limit", &self.range_limit)
            .field("range_hidden", &self.range_hidden)
            .finish()
    }
}

impl<'a> InputStream<'a> {
    /// Zero-copy view over caller-owned memory.
    pub fn borrowed_memory(bytes: &'a [u8]) -> InputStream<'a> {
        InputStream {
            source: None,
            buffers: None,
            backing: Some(Backing::Borrowed(bytes)),
            span: PageSpan {
                start: 0,
                end: bytes.len(),
            },
            span_end_pos: bytes.len() as u64,
            scratch: Vec::new(),
            range_limit: None,
            range_hidden: 0,
        }
    }
}

impl InputStream<'static> {
    fn paged(source: Option<Box<dyn PageSource>>, buffers: PageBuffers) -> InputStream<'static> {
        InputStream {
            source,
            buffers: Some(buffers),
            backing: None,
            span: PageSpan::EMPTY,
            span_end_pos: 0,
            scratch: Vec::new(),
            range_limit: None,
            range_hidden: 0,
        }
    }

    fn permanently_empty() -> InputStream<'static> {
        InputStream {
            source: None,
            buffers: None,
            backing: None,
            span: PageSpan::EMPTY,
            span_end_pos: 0,
            scratch: Vec::new(),
            range_limit: None,
            range_hidden: 0,
        }
    }

    /// Copies `bytes` into owned pages.
    pub fn memory(bytes: &[u8]) -> InputStream<'static> {
        Self::memory_with(bytes, DEFAULT_PAGE_SIZE)
    }

    pub fn memory_with(bytes: &[u8], page_size: usize) -> InputStream<'static> {
        let mut buffers = PageBuffers::new(page_size);
        for chunk in bytes.chunks(page_size) {
            let mut page = buffers.new_writable_page();
            page.spare_mut()[..chunk.len()].copy_from_slice(chunk);
            page.commit(chunk.len());
            buffers.push_page(page);
        }
        buffers.mark_eof();
        Self::paged(None, buffers)
    }

    /// Buffered blocking file input.
    pub fn file(path: impl AsRef<Path>) -> Result<InputStream<'static>> {
        Self::file_with(path, 0, DEFAULT_PAGE_SIZE)
    }

    pub fn file_with(
        path: impl AsRef<Path>,
        offset: u64,
        page_size: usize,
    ) -> Result<InputStream<'static>> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if offset > 0 {
            file.seek(std::io::SeekFrom::Start(offset))?;
        }
        let source = FileSource::new(file, len.saturating_sub(offset));
        Ok(Self::paged(
            Some(Box::new(source)),
            PageBuffers::new(page_size),
        ))
    }

    /// Memory-maps the file into one giant span. Empty files (and empty
    /// windows) yield a permanently empty stream rather than an error.
    pub fn mapped_file(path: impl AsRef<Path>) -> Result<InputStream<'static>> {
        Self::mapped_file_with(path, 0, None)
    }

    pub fn mapped_file_with(
        path: impl AsRef<Path>,
        offset: u64,
        mapped_size: Option<usize>,
    ) -> Result<InputStream<'static>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if offset > len {
            return Err(Error::invalid_offset(format_args!(
                "offset {offset} is past the end of the file ({len} bytes)"
            )));
        }
        if offset % map_granularity() != 0 {
            return Err(Error::invalid_offset(format_args!(
                "offset {offset} is not aligned to the map granularity"
            )));
        }
        let available = (len - offset) as usize;
        let size = mapped_size.unwrap_or(available).min(available);
        if size == 0 {
            return Ok(Self::permanently_empty());
        }
        // The mapping stays valid as long as nobody truncates the file
        // underneath it; that is the caller's side of the contract.
        let map = unsafe { memmap2::MmapOptions::new().offset(offset).len(size).map(&file)? };
        Ok(InputStream {
            source: None,
            buffers: None,
            backing: Some(Backing::Mapped(map)),
            span: PageSpan {
                start: 0,
                end: size,
            },
            span_end_pos: size as u64,
            scratch: Vec::new(),
            range_limit: None,
            range_hidden: 0,
        })
    }

    /// Wraps an externally supplied async read capability.
    pub fn async_device(device: impl AsyncDevice + 'static) -> InputStream<'static> {
        Self::async_device_with(device, DEFAULT_PAGE_SIZE)
    }

    pub fn async_device_with(
        device: impl AsyncDevice + 'static,
        page_size: usize,
    ) -> InputStream<'static> {
        Self::paged(
            Some(Box::new(DeviceSource::new(Box::new(device)))),
            PageBuffers::new(page_size),
        )
    }
}

impl<'a> InputStream<'a> {
    /// True when at least one byte can be consumed. The fast path is a
    /// single span comparison; exhaustion falls through to a page flip or
    /// a blocking refill. Once EOF has been observed this stays false.
    #[inline]
    pub fn readable(&mut self) -> Result<bool> {
        if self.span.has_runway() {
            return Ok(true);
        }
        self.readable_slow()
    }

    #[cold]
    fn readable_slow(&mut self) -> Result<bool> {
        readable_slow_body!(self, refill_sync)
    }

    /// Suspending variant of [`readable`](Self::readable).
    pub async fn readable_async(&mut self) -> Result<bool> {
        if self.span.has_runway() {
            return Ok(true);
        }
        readable_slow_body!(self, refill_async.await)
    }

    /// True when the next `n` bytes can be consumed - possibly straddling
    /// pages - without any further device interaction afterwards.
    pub fn readable_n(&mut self, n: usize) -> Result<bool> {
        if self.span.len() >= n {
            return Ok(true);
        }
        readable_n_body!(self, n, refill_sync)
    }

    /// Suspending variant of [`readable_n`](Self::readable_n).
    pub async fn readable_n_async(&mut self, n: usize) -> Result<bool> {
        if self.span.len() >= n {
            return Ok(true);
        }
        readable_n_body!(self, n, refill_async.await)
    }

    /// The next byte without consuming it. Calling this without a
    /// preceding true [`readable`](Self::readable) is a programmer error.
    #[inline]
    pub fn peek(&mut self) -> u8 {
        if !self.span.has_runway() {
            let flipped = self.take_next_span();
            debug_assert!(flipped, "peek without a preceding readable()");
        }
        self.chunk()[self.span.start]
    }

    /// Consumes and returns the next byte. Same precondition as
    /// [`peek`](Self::peek).
    #[inline]
    pub fn read_byte(&mut self) -> u8 {
        let byte = self.peek();
        self.span.start += 1;
        byte
    }

    /// The byte `k` positions ahead, within the current span only.
    pub fn peek_at(&self, k: usize) -> u8 {
        assert!(k < self.span.len(), "peek_at({k}) outside the current span");
        self.chunk()[self.span.start + k]
    }

    /// Compares the upcoming bytes against `pattern` without consuming.
    /// The caller must have established `readable_n(pattern.len())` and
    /// the window must lie within the current span.
    pub fn look_ahead_match(&self, pattern: &[u8]) -> bool {
        debug_assert!(
            pattern.len() <= self.span.len(),
            "look_ahead_match window exceeds the current span"
        );
        let start = self.span.start;
        &self.chunk()[start..start + pattern.len()] == pattern
    }

    /// Moves forward `n` bytes, crossing pages in bulk. Advancing past the
    /// readable bytes is a programmer error.
    pub fn advance(&mut self, n: usize) {
        let mut remaining = n;
        loop {
            let step = self.span.len().min(remaining);
            self.span.start += step;
            remaining -= step;
            if remaining == 0 {
                break;
            }
            assert!(self.take_next_span(), "advance({n}) past the readable bytes");
        }
    }

    /// Drains the span, then the queued pages, then the source directly
    /// into `dst`. Returns the bytes produced; a short count means EOF.
    pub fn read_into_ex(&mut self, dst: &mut [u8]) -> Result<usize> {
        read_into_ex_body!(self, dst, read_direct_sync)
    }

    /// Suspending variant of [`read_into_ex`](Self::read_into_ex).
    pub async fn read_into_ex_async(&mut self, dst: &mut [u8]) -> Result<usize> {
        read_into_ex_body!(self, dst, read_direct_async.await)
    }

    /// True when `dst` was filled completely.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<bool> {
        Ok(self.read_into_ex(dst)? == dst.len())
    }

    pub async fn read_into_async(&mut self, dst: &mut [u8]) -> Result<bool> {
        Ok(self.read_into_ex_async(dst).await? == dst.len())
    }

    /// The next `n` bytes as a view. Zero-copy when the current span has
    /// `n` bytes of runway; otherwise the bytes are gathered into a
    /// stream-owned temporary. Either way the view dies at the next
    /// mutating call. Requesting more than the consumable remainder is a
    /// programmer error.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        if self.span.len() >= n {
            self.span.start += n;
            let end = self.span.start;
            return Ok(&self.chunk()[end - n..end]);
        }
        let mut gathered = std::mem::take(&mut self.scratch);
        gathered.resize(n, 0);
        let got = self.read_into_ex(&mut gathered)?;
        debug_assert_eq!(got, n, "read_bytes({n}) past the consumable remainder");
        self.scratch = gathered;
        Ok(&self.scratch[..got])
    }

    /// Suspending variant of [`read_bytes`](Self::read_bytes).
    pub async fn read_bytes_async(&mut self, n: usize) -> Result<&[u8]> {
        if self.span.len() >= n {
            self.span.start += n;
            let end = self.span.start;
            return Ok(&self.chunk()[end - n..end]);
        }
        let mut gathered = std::mem::take(&mut self.scratch);
        gathered.resize(n, 0);
        let got = self.read_into_ex_async(&mut gathered).await?;
        debug_assert_eq!(got, n, "read_bytes({n}) past the consumable remainder");
        self.scratch = gathered;
        Ok(&self.scratch[..got])
    }

    /// The next byte, or `None` at EOF.
    pub fn next(&mut self) -> Result<Option<u8>> {
        Ok(if self.readable()? {
            Some(self.read_byte())
        } else {
            None
        })
    }

    pub async fn next_async(&mut self) -> Result<Option<u8>> {
        Ok(if self.readable_async().await? {
            Some(self.read_byte())
        } else {
            None
        })
    }

    /// The logical index of the next byte to be read.
    pub fn pos(&self) -> u64 {
        self.span_end_pos - self.span.len() as u64
    }

    /// Bytes consumable without invoking the source.
    pub fn total_unconsumed_bytes(&self) -> usize {
        let buffered = self.buffers.as_ref().map_or(0, PageBuffers::total_buffered);
        let raw = self.span.len() + buffered;
        match self.range_limit {
            Some(limit) => raw.min((limit - self.pos()) as usize),
            None => raw,
        }
    }

    /// Non-blocking readability truthiness.
    pub fn readable_now(&self) -> bool {
        self.span.has_runway() || self.total_unconsumed_bytes() > 0
    }

    /// Total bytes left from the current position, when the stream can
    /// tell: the buffered remainder plus whatever the source still holds.
    pub fn len(&self) -> Option<u64> {
        let buffered = self.total_unconsumed_bytes() as u64;
        match &self.source {
            None => Some(buffered),
            Some(source) => source.remaining_len().map(|rest| rest + buffered),
        }
    }

    /// Releases the source and empties the stream. Prefers an async close
    /// when the source offers one: [`CloseMode::Wait`] blocks on it,
    /// [`CloseMode::DontWait`] abandons it (dropping the source still
    /// releases the OS resource). Idempotent.
    pub fn close(&mut self, mode: CloseMode) -> Result<()> {
        let result = match self.source.take() {
            None => Ok(()),
            Some(mut source) => {
                let closed = match source.close_async() {
                    Some(close) => Some(match mode {
                        CloseMode::Wait => futures::executor::block_on(close),
                        CloseMode::DontWait => {
                            drop(close);
                            Ok(())
                        }
                    }),
                    None => None,
                };
                match closed {
                    Some(result) => result,
                    None => source.close_sync().unwrap_or(Ok(())),
                }
            }
        };
        self.discard_readable_state();
        result
    }

    /// Releases the source, awaiting an async close when one exists.
    pub async fn close_async(&mut self) -> Result<()> {
        let result = match self.source.take() {
            None => Ok(()),
            Some(mut source) => {
                let closed = match source.close_async() {
                    Some(close) => Some(close.await),
                    None => None,
                };
                match closed {
                    Some(result) => result,
                    None => source.close_sync().unwrap_or(Ok(())),
                }
            }
        };
        self.discard_readable_state();
        result
    }

    /// Rewinds a fixed-span stream to its start; a sourceless paged stream
    /// is emptied instead. Calling this on a stream that still has a
    /// source is a programmer error.
    pub fn reset_buffers(&mut self) {
        assert!(
            self.source.is_none(),
            "reset_buffers on a stream that still has a source"
        );
        match &self.backing {
            Some(backing) => {
                let len = backing.bytes().len();
                self.span = PageSpan { start: 0, end: len };
                self.span_end_pos = len as u64;
            }
            None => {
                self.span_end_pos -= self.span.len() as u64;
                self.span = PageSpan::EMPTY;
                self.buffers = None;
            }
        }
    }

    /// Runs `body` with the source hidden and consumption capped at `n`
    /// bytes from the current position, so a sub-consumer can neither
    /// trigger refills nor read past its budget - not even into bytes that
    /// are already buffered. The source and the hidden remainder come back
    /// on exit, including the panic path. Nested scopes narrow the budget,
    /// never widen it.
    pub fn with_readable_range<R>(
        &mut self,
        n: usize,
        body: impl FnOnce(&mut InputStream<'a>) -> R,
    ) -> R {
        if self.span.is_empty() {
            let _ = self.take_next_span();
        }
        let budget_end = self.pos() + n as u64;
        let limit = match self.range_limit {
            Some(outer) => budget_end.min(outer),
            None => budget_end,
        };
        let mut scope = RangeScope {
            saved_source: self.source.take(),
            saved_limit: self.range_limit,
            saved_hidden: self.range_hidden,
            stream: self,
        };
        scope.stream.range_limit = Some(limit);
        scope.stream.clamp_span_to_range();
        body(&mut *scope.stream)
    }

    /// Waits until a byte is readable or `deadline` passes. An expired
    /// deadline cancels the in-flight refill; pages that already arrived
    /// stay buffered and the stream may be re-read.
    pub async fn timeout_to_next_byte(
        &mut self,
        waiter: &dyn Waiter,
        deadline: Instant,
    ) -> Result<bool> {
        if self.readable_now() {
            return Ok(true);
        }
        let sleep = waiter.wait_until(deadline);
        let readable = self.readable_async();
        futures::pin_mut!(readable);
        match future::select(readable, sleep).await {
            Either::Left((readable, _)) => readable,
            Either::Right(((), _)) => Ok(false),
        }
    }

    /// The memory the span indexes into.
    fn chunk(&self) -> &[u8] {
        if let Some(backing) = &self.backing {
            backing.bytes()
        } else if let Some(buffers) = &self.buffers {
            buffers.front_written()
        } else {
            &[]
        }
    }

    /// Retires spent front pages and adopts the next readable region as
    /// the current span. False when nothing is queued or the readable
    /// range budget is exhausted.
    fn take_next_span(&mut self) -> bool {
        debug_assert!(!self.span.has_runway());
        if let Some(limit) = self.range_limit {
            if self.span_end_pos >= limit {
                return false;
            }
        }
        let Some(buffers) = &mut self.buffers else {
            return false;
        };
        loop {
            match buffers.adopt_front() {
                AdoptResult::Empty => return false,
                AdoptResult::Spent => buffers.pop_front(),
                AdoptResult::Adopted(start, end) => {
                    self.span = PageSpan { start, end };
                    self.span_end_pos += (end - start) as u64;
                    self.clamp_span_to_range();
                    return true;
                }
            }
        }
    }

    fn clamp_span_to_range(&mut self) {
        let Some(limit) = self.range_limit else {
            return;
        };
        if self.span_end_pos > limit {
            let hidden = (self.span_end_pos - limit) as usize;
            self.span.end -= hidden;
            self.span_end_pos = limit;
            self.range_hidden += hidden;
        }
    }

    fn eof_reached(&self) -> bool {
        self.buffers.as_ref().is_some_and(PageBuffers::eof_reached)
    }

    /// Clears the source so no further device interaction is attempted;
    /// drained buffers stay consumable.
    fn disconnect_source(&mut self) {
        if self.source.take().is_some() {
            debug_log!(STREAM: "source disconnected at EOF (pos {})", self.pos());
        }
    }

    fn discard_readable_state(&mut self) {
        self.span_end_pos -= self.span.len() as u64;
        self.span = PageSpan::EMPTY;
        self.buffers = None;
        self.backing = None;
        self.range_limit = None;
        self.range_hidden = 0;
    }

    fn refill_sync(&mut self, min: usize) -> Option<Result<usize>> {
        let source = self.source.as_mut()?;
        let buffers = self.buffers.as_mut()?;
        source.read_sync(buffers, ReadDst::Pages { min })
    }

    async fn refill_async(&mut self, min: usize) -> Option<Result<usize>> {
        let source = self.source.as_mut()?;
        let buffers = self.buffers.as_mut()?;
        // prefer the suspending slot, fall back to the blocking one
        let refilled = match source.read_async(&mut *buffers, ReadDst::Pages { min }) {
            Some(refill) => Some(refill.await),
            None => None,
        };
        match refilled {
            Some(result) => Some(result),
            None => source.read_sync(buffers, ReadDst::Pages { min }),
        }
    }

    fn read_direct_sync(&mut self, dst: &mut [u8]) -> Option<Result<usize>> {
        let source = self.source.as_mut()?;
        let buffers = self.buffers.as_mut()?;
        source.read_sync(buffers, ReadDst::Direct(dst))
    }

    async fn read_direct_async(&mut self, dst: &mut [u8]) -> Option<Result<usize>> {
        let source = self.source.as_mut()?;
        let buffers = self.buffers.as_mut()?;
        let read = match source.read_async(&mut *buffers, ReadDst::Direct(&mut *dst)) {
            Some(read) => Some(read.await),
            None => None,
        };
        match read {
            Some(result) => Some(result),
            None => source.read_sync(buffers, ReadDst::Direct(dst)),
        }
    }
}

struct RangeScope<'s, 'a> {
    stream: &'s mut InputStream<'a>,
    saved_source: Option<Box<dyn PageSource>>,
    saved_limit: Option<u64>,
    saved_hidden: usize,
}

impl Drop for RangeScope<'_, '_> {
    fn drop(&mut self) {
        let unhide = self.stream.range_hidden.saturating_sub(self.saved_hidden);
        self.stream.span.end += unhide;
        self.stream.span_end_pos += unhide as u64;
        self.stream.range_hidden = self.saved_hidden;
        self.stream.range_limit = self.saved_limit;
        self.stream.source = self.saved_source.take();
    }
}

#[cfg(unix)]
fn map_granularity() -> u64 {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE).max(1) as u64 }
}

#[cfg(not(unix))]
fn map_granularity() -> u64 {
    // Windows maps at allocation-granularity boundaries.
    65536
}
