use crate::Result;
use crate::constants::DEFAULT_PAGE_SIZE;
use crate::stream::InputStream;
use crate::waiter::Waiter;
use std::path::Path;
use std::pin::Pin;
use std::time::Instant;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Opens a Tokio file as an async-device input stream.
pub async fn open(path: impl AsRef<Path>) -> Result<InputStream<'static>> {
    open_with(path, DEFAULT_PAGE_SIZE).await
}

pub async fn open_with(path: impl AsRef<Path>, page_size: usize) -> Result<InputStream<'static>> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    Ok(InputStream::async_device_with(file.compat(), page_size))
}

/// Deadline waiter backed by the Tokio timer.
pub struct TokioWaiter;

impl Waiter for TokioWaiter {
    fn wait_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep_until(tokio::time::Instant::from_std(
            deadline,
        )))
    }
}
