//! Cooperative cancellation for in-flight turns.
//!
//! Streams are pull-based, so dropping one already cancels the work behind
//! it. A [`CancelHandle`] covers the remaining case: the transport holds the
//! stream but an out-of-band signal (client disconnect, user stop button)
//! must end it early.

use std::pin::Pin;

use futures::Stream;
use tokio_util::sync::CancellationToken;

/// Clonable handle that can end a stream from outside the consumer.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; affects this handle and all clones.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Wrap a stream so it ends at the next suspension point after `handle`
/// fires. Items already produced are delivered; nothing is truncated
/// mid-item.
pub fn cancellable<S>(stream: S, handle: &CancelHandle) -> Pin<Box<dyn Stream<Item = S::Item> + Send>>
where
    S: Stream + Send + 'static,
    S::Item: Send,
{
    let token = handle.token();
    let wrapped = async_stream::stream! {
        let mut stream = std::pin::pin!(stream);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("stream cancelled by handle");
                    return;
                }
                item = futures_util::StreamExt::next(&mut stream) => {
                    match item {
                        Some(item) => yield item,
                        None => return,
                    }
                }
            }
        }
    };
    Box::pin(wrapped)
}
