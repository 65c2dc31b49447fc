use crate::Result;
use crate::buffers::PageBuffers;
use std::pin::Pin;

mod device;
mod file;

pub use device::AsyncDevice;
pub(crate) use device::DeviceSource;
pub(crate) use file::FileSource;

/// Where a source should deliver bytes.
pub enum ReadDst<'a> {
    /// Append freshly filled pages to the queue: at least one, and keep
    /// going while fewer than `min` bytes have been appended.
    Pages { min: usize },
    /// Write straight into the caller's buffer, bypassing the queue.
    Direct(&'a mut [u8]),
}

/// The capability table through which a stream pulls more bytes.
///
/// Every slot is optional: a method returning `None` marks the capability
/// as absent. The stream invokes a read slot only when the current span and
/// queue are exhausted, and never holds more than one refill in flight.
/// A read that comes up short must call `buffers.mark_eof()` iff the
/// underlying device reached EOF.
pub trait PageSource: Send {
    /// Pull bytes with a blocking read.
    fn read_sync(&mut self, buffers: &mut PageBuffers, dst: ReadDst<'_>) -> Option<Result<usize>> {
        let _ = (buffers, dst);
        None
    }

    /// Pull bytes, suspending until the device produces them. Must be
    /// cancel-safe: dropping the future may abandon the in-flight read but
    /// never a page already pushed to `buffers`.
    fn read_async<'a>(
        &'a mut self,
        buffers: &'a mut PageBuffers,
        dst: ReadDst<'a>,
    ) -> Option<Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>> {
        let _ = (buffers, dst);
        None
    }

    /// Release the device.
    fn close_sync(&mut self) -> Option<Result<()>> {
        None
    }

    /// Release the device, suspending. Preferred over
    /// [`close_sync`](Self::close_sync) when both exist.
    fn close_async(&mut self) -> Option<Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>> {
        None
    }

    /// Bytes left in the device (not yet pulled into pages), if known.
    fn remaining_len(&self) -> Option<u64> {
        None
    }
}

/// Reads until `buf` is full or the reader reports EOF, retrying on
/// interruption.
pub(crate) fn read_full(reader: &mut impl std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}
