/*!
 *! # paged-input
 *!
 *! A page-oriented buffered input stream library.
 *!
 *! One consumer-facing contract covers in-memory byte arrays, memory-mapped
 *! files and OS files read through blocking or non-blocking I/O. Data lives
 *! in fixed-capacity pages pulled from a [`PageSource`]; the stream exposes
 *! a contiguous readable window (the span) over the front page, so the hot
 *! path of single-byte peeking and consumption is a single comparison of
 *! two machine words. Page exhaustion, refill, EOF and waiting are folded
 *! into the readability protocol: once [`InputStream::readable`] (or
 *! [`InputStream::readable_n`]) has returned `true`, the verified bytes can
 *! be consumed without further checks or device interaction.
 */

#![allow(dead_code)]

use std::fmt::Display;

#[macro_use]
mod macros;

mod buffers;
mod constants;
mod handle;
mod page;
mod source;
mod span;
mod stream;
mod waiter;

#[cfg(feature = "tokio-fs")]
pub mod tokio_fs;

pub use buffers::PageBuffers;
pub use constants::DEFAULT_PAGE_SIZE;
pub use handle::Handle;
pub use page::Page;
pub use source::{AsyncDevice, PageSource, ReadDst};
pub use stream::{CloseMode, InputStream};
pub use waiter::Waiter;

pub type Result<T> = std::result::Result<T, Error>;

/// Classifies an [`Error`] so callers can react to construction failures
/// and cancellation without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The path given to a file constructor does not exist.
    NotFound,
    /// Any other failure propagated from the underlying device.
    Io,
    /// A mapped-file offset that is misaligned or past the end of the file.
    InvalidOffset,
    /// An asynchronous read was abandoned at the waiter level. The stream
    /// stays consistent and may be re-read.
    Cancelled,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn err(kind: ErrorKind, message: impl Display) -> Self {
        Error {
            kind,
            message: message.to_string(),
        }
    }

    /// For device implementations that abort an in-flight read.
    pub fn cancelled(message: impl Display) -> Self {
        Self::err(ErrorKind::Cancelled, message)
    }

    pub(crate) fn invalid_offset(message: impl Display) -> Self {
        Self::err(ErrorKind::InvalidOffset, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::Interrupted => ErrorKind::Cancelled,
            _ => ErrorKind::Io,
        };
        Error {
            kind,
            message: err.to_string(),
        }
    }
}
