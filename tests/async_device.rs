mod util;

use futures::io::AsyncRead;
use paged_input::{ErrorKind, InputStream, Waiter};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use util::fixture_path;

/// Serves `data` in fixed-size chunks, optionally returning `Pending` in
/// between so every await point is exercised.
struct ChunkedDevice {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    interleave_pending: bool,
    pending_next: bool,
}

impl ChunkedDevice {
    fn new(data: Vec<u8>, chunk: usize, interleave_pending: bool) -> ChunkedDevice {
        ChunkedDevice {
            data,
            pos: 0,
            chunk,
            interleave_pending,
            pending_next: false,
        }
    }
}

impl AsyncRead for ChunkedDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = Pin::into_inner(self);
        if this.interleave_pending {
            this.pending_next = !this.pending_next;
            if this.pending_next {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
        let n = this.chunk.min(this.data.len() - this.pos).min(buf.len());
        buf[..n].copy_from_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(n))
    }
}

/// Fails the first read with `Interrupted`, then serves normally.
struct InterruptOnce {
    data: Vec<u8>,
    pos: usize,
    interrupted: bool,
}

impl AsyncRead for InterruptOnce {
    fn poll_read(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = Pin::into_inner(self);
        if !this.interrupted {
            this.interrupted = true;
            return Poll::Ready(Err(io::ErrorKind::Interrupted.into()));
        }
        let n = (this.data.len() - this.pos).min(buf.len());
        buf[..n].copy_from_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(n))
    }
}

/// A device that never produces a byte and never wakes.
struct NeverDevice;

impl AsyncRead for NeverDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        _: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }
}

struct TokioTestWaiter;

impl Waiter for TokioTestWaiter {
    fn wait_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep_until(tokio::time::Instant::from_std(
            deadline,
        )))
    }
}

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 13) as u8).collect()
}

async fn drain_async(stream: &mut InputStream<'static>) -> paged_input::Result<Vec<u8>> {
    let mut all = Vec::new();
    while let Some(byte) = stream.next_async().await? {
        all.push(byte);
    }
    Ok(all)
}

#[tokio::test]
async fn chunked_device_roundtrip() {
    let data = sample_data(2048);
    for page_size in [paged_input::DEFAULT_PAGE_SIZE, 10, 1] {
        let device = ChunkedDevice::new(data.clone(), 7, true);
        let mut stream = InputStream::async_device_with(device, page_size);
        assert_eq!(drain_async(&mut stream).await.unwrap(), data, "page_size {page_size}");
    }
}

#[tokio::test]
async fn readable_n_async_gathers_across_short_reads() {
    let data = sample_data(500);
    let device = ChunkedDevice::new(data.clone(), 7, true);
    let mut stream = InputStream::async_device_with(device, 16);

    assert!(stream.readable_n_async(100).await.unwrap());
    assert!(stream.total_unconsumed_bytes() >= 100);
    assert_eq!(stream.read_bytes_async(100).await.unwrap(), &data[..100]);
    assert_eq!(stream.pos(), 100);

    let mut rest = vec![0u8; 400];
    assert!(stream.read_into_async(&mut rest).await.unwrap());
    assert_eq!(rest, &data[100..]);
    assert!(!stream.readable_async().await.unwrap());
}

#[tokio::test]
async fn read_into_ex_async_reports_eof_with_a_short_count() {
    let data = sample_data(64);
    let device = ChunkedDevice::new(data.clone(), 9, false);
    let mut stream = InputStream::async_device(device);

    let mut buf = vec![0u8; 100];
    assert_eq!(stream.read_into_ex_async(&mut buf).await.unwrap(), 64);
    assert_eq!(&buf[..64], data);
    assert!(!stream.readable_async().await.unwrap());
}

#[tokio::test]
async fn async_only_sources_are_terminal_on_the_sync_surface() {
    let data = sample_data(32);
    let device = ChunkedDevice::new(data.clone(), 8, false);
    let mut stream = InputStream::async_device(device);

    // no sync read capability: the blocking surface treats it as EOF
    assert!(!stream.readable().unwrap());

    // but nothing was disconnected; the async surface still reads it all
    assert_eq!(drain_async(&mut stream).await.unwrap(), data);
}

#[tokio::test]
async fn blocking_files_still_work_on_the_async_surface() {
    let expected = std::fs::read(fixture_path("ascii_table.txt")).unwrap();
    let mut stream = InputStream::file_with(fixture_path("ascii_table.txt"), 0, 10).unwrap();
    assert_eq!(drain_async(&mut stream).await.unwrap(), expected);
}

#[tokio::test]
async fn interrupted_reads_surface_as_cancellation() {
    let data = sample_data(40);
    let device = InterruptOnce {
        data: data.clone(),
        pos: 0,
        interrupted: false,
    };
    let mut stream = InputStream::async_device(device);

    let err = stream.readable_async().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    // the stream stays consistent and may still be read
    assert!(stream.readable_async().await.unwrap());
    assert_eq!(drain_async(&mut stream).await.unwrap(), data);
}

#[tokio::test]
async fn abandoned_refill_loses_no_data() {
    let data = sample_data(24);
    let device = ChunkedDevice::new(data.clone(), 6, true);
    let mut stream = InputStream::async_device_with(device, 8);

    {
        let refill = stream.readable_async();
        futures::pin_mut!(refill);
        assert!(futures::poll!(refill.as_mut()).is_pending());
        // dropped mid-refill
    }

    assert_eq!(drain_async(&mut stream).await.unwrap(), data);
}

#[tokio::test]
async fn timeout_expires_against_a_silent_device() {
    let mut stream = InputStream::async_device(NeverDevice);
    let started = Instant::now();
    let deadline = started + Duration::from_millis(50);

    let readable = stream
        .timeout_to_next_byte(&TokioTestWaiter, deadline)
        .await
        .unwrap();
    assert!(!readable);
    assert!(started.elapsed() >= Duration::from_millis(40));

    // the stream survives the cancelled refill
    assert!(!stream.readable_now());
}

#[tokio::test]
async fn timeout_returns_immediately_once_bytes_arrive() {
    let data = sample_data(16);
    let device = ChunkedDevice::new(data.clone(), 16, false);
    let mut stream = InputStream::async_device(device);

    let deadline = Instant::now() + Duration::from_secs(5);
    assert!(
        stream
            .timeout_to_next_byte(&TokioTestWaiter, deadline)
            .await
            .unwrap()
    );
    assert_eq!(stream.read_byte(), data[0]);

    // already-buffered bytes short-circuit the deadline entirely
    assert!(
        stream
            .timeout_to_next_byte(&TokioTestWaiter, Instant::now())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn async_close_is_idempotent() {
    let data = sample_data(32);
    let device = ChunkedDevice::new(data, 8, false);
    let mut stream = InputStream::async_device(device);
    assert!(stream.readable_async().await.unwrap());

    stream.close_async().await.unwrap();
    assert!(!stream.readable_async().await.unwrap());
    assert_eq!(stream.len(), Some(0));

    stream.close_async().await.unwrap();
    assert!(!stream.readable_async().await.unwrap());
}
