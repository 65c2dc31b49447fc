use crate::Result;
use crate::stream::{CloseMode, InputStream};
use std::ops::{Deref, DerefMut};

/// Move-only owner of an [`InputStream`] that closes it on drop.
///
/// Dropping the handle closes with [`CloseMode::DontWait`]; failures on
/// that path are suppressed and only logged.
pub struct Handle<'a> {
    stream: Option<InputStream<'a>>,
}

impl<'a> Handle<'a> {
    pub fn new(stream: InputStream<'a>) -> Handle<'a> {
        Handle {
            stream: Some(stream),
        }
    }

    /// Closes explicitly with the given policy.
    pub fn close(mut self, mode: CloseMode) -> Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.close(mode),
            None => Ok(()),
        }
    }

    /// Releases ownership without closing.
    pub fn into_inner(mut self) -> InputStream<'a> {
        self.stream.take().unwrap()
    }
}

impl<'a> Deref for Handle<'a> {
    type Target = InputStream<'a>;

    fn deref(&self) -> &Self::Target {
        self.stream.as_ref().unwrap()
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream.as_mut().unwrap()
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.close(CloseMode::DontWait) {
                debug_log!(CLOSE: "suppressed close failure on drop: {:?}", err);
            }
        }
    }
}
