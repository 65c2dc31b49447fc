use super::{PageSource, ReadDst};
use crate::Result;
use crate::buffers::PageBuffers;
use futures::prelude::*;
use std::pin::Pin;

/// An externally supplied non-blocking read capability.
///
/// Anything readable through [`futures::io::AsyncRead`] qualifies; with the
/// `tokio-fs` feature a Tokio file works through its `compat` adapter.
pub trait AsyncDevice: AsyncRead + Unpin + Send {}

impl<T: AsyncRead + Unpin + Send> AsyncDevice for T {}

/// Suspending device source: `read_async` and `close_async`. One device
/// read per page; a zero-length read marks EOF, a short read does not.
pub(crate) struct DeviceSource {
    device: Option<Box<dyn AsyncDevice>>,
}

impl DeviceSource {
    pub fn new(device: Box<dyn AsyncDevice>) -> DeviceSource {
        DeviceSource {
            device: Some(device),
        }
    }
}

impl PageSource for DeviceSource {
    fn read_async<'a>(
        &'a mut self,
        buffers: &'a mut PageBuffers,
        dst: ReadDst<'a>,
    ) -> Option<Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>> {
        Some(Box::pin(async move {
            let Some(device) = self.device.as_mut() else {
                buffers.mark_eof();
                return Ok(0);
            };
            match dst {
                ReadDst::Pages { min } => {
                    let mut appended = 0;
                    loop {
                        let mut page = buffers.new_writable_page();
                        let n = device.read(page.spare_mut()).await?;
                        if n == 0 {
                            buffers.mark_eof();
                            break;
                        }
                        page.commit(n);
                        buffers.push_page(page);
                        appended += n;
                        if appended >= min.max(1) {
                            break;
                        }
                    }
                    Ok(appended)
                }
                ReadDst::Direct(buf) => {
                    let mut filled = 0;
                    while filled < buf.len() {
                        let n = device.read(&mut buf[filled..]).await?;
                        if n == 0 {
                            buffers.mark_eof();
                            break;
                        }
                        filled += n;
                    }
                    Ok(filled)
                }
            }
        }))
    }

    fn close_async(&mut self) -> Option<Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>> {
        self.device = None;
        Some(Box::pin(future::ready(Ok(()))))
    }
}
