//! Byte-counting stream decorator

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Receives the cumulative byte count after every read.
///
/// Called inline from `poll_read`, so implementations must not block.
pub trait ProgressObserver {
    fn on_progress(&self, total_bytes: u64);
}

impl<F> ProgressObserver for F
where
    F: Fn(u64),
{
    fn on_progress(&self, total_bytes: u64) {
        self(total_bytes)
    }
}

/// Wraps a reader and reports how many bytes have passed through it
pub struct ProgressReader<R, O> {
    inner: R,
    observer: O,
    total: u64,
}

impl<R, O> ProgressReader<R, O> {
    pub fn new(inner: R, observer: O) -> Self {
        Self {
            inner,
            observer,
            total: 0,
        }
    }

    /// Bytes read so far
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, O> AsyncRead for ProgressReader<R, O>
where
    R: AsyncRead + Unpin,
    O: ProgressObserver + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.total += read as u64;
                this.observer.on_progress(this.total);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_progress_reader_reports_cumulative_totals() {
        let data: &[u8] = b"Hello, World!";
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();

        let mut reader =
            ProgressReader::new(data, move |n: u64| sink.lock().unwrap().push(n));

        let mut buf = [0u8; 5];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 5);
        assert_eq!(*calls.lock().unwrap(), vec![5]);

        assert_eq!(reader.read(&mut buf).await.unwrap(), 5);
        assert_eq!(*calls.lock().unwrap(), vec![5, 10]);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"ld!");
        assert_eq!(calls.lock().unwrap().last(), Some(&13));
        assert_eq!(reader.total(), 13);
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer hung up")))
        }
    }

    #[tokio::test]
    async fn test_progress_reader_passes_errors_through() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let mut reader =
            ProgressReader::new(BrokenReader, move |_: u64| *flag.lock().unwrap() = true);

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(err.to_string(), "peer hung up");
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_progress_reader_eof() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut reader =
            ProgressReader::new(&b""[..], move |_: u64| *counter.lock().unwrap() += 1);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
