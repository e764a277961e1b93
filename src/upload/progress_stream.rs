use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use super::progress::ProgressSender;

pin_project! {
    /// Body stream that reports the running byte count for every chunk it yields.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        loaded: u64,
        total: Option<u64>,
        progress: ProgressSender,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: Option<u64>, progress: ProgressSender) -> Self {
        Self {
            inner,
            loaded: 0,
            total,
            progress,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.loaded += chunk.len() as u64;
                    this.progress.report(*this.loaded, *this.total);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
