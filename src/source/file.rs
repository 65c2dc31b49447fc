use super::{PageSource, ReadDst, read_full};
use crate::Result;
use crate::buffers::PageBuffers;
use std::fs::File;

/// Blocking file source: `read_sync`, `close_sync` and `remaining_len`.
/// Fills fresh pages of the buffer granule; a partial page means EOF.
pub(crate) struct FileSource {
    file: Option<File>,
    remaining: u64,
}

impl FileSource {
    pub fn new(file: File, remaining: u64) -> FileSource {
        FileSource {
            file: Some(file),
            remaining,
        }
    }

    fn read_impl(&mut self, buffers: &mut PageBuffers, dst: ReadDst<'_>) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            buffers.mark_eof();
            return Ok(0);
        };
        match dst {
            ReadDst::Pages { min } => {
                let mut appended = 0;
                loop {
                    let mut page = buffers.new_writable_page();
                    let n = read_full(file, page.spare_mut())?;
                    if n > 0 {
                        page.commit(n);
                        buffers.push_page(page);
                        appended += n;
                        self.remaining = self.remaining.saturating_sub(n as u64);
                    }
                    if n < buffers.page_size() {
                        buffers.mark_eof();
                        break;
                    }
                    if appended >= min.max(1) {
                        break;
                    }
                }
                Ok(appended)
            }
            ReadDst::Direct(buf) => {
                let n = read_full(file, buf)?;
                self.remaining = self.remaining.saturating_sub(n as u64);
                if n < buf.len() {
                    buffers.mark_eof();
                }
                Ok(n)
            }
        }
    }
}

impl PageSource for FileSource {
    fn read_sync(&mut self, buffers: &mut PageBuffers, dst: ReadDst<'_>) -> Option<Result<usize>> {
        Some(self.read_impl(buffers, dst))
    }

    fn close_sync(&mut self) -> Option<Result<()>> {
        self.file = None;
        Some(Ok(()))
    }

    fn remaining_len(&self) -> Option<u64> {
        Some(self.remaining)
    }
}
