use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::StreamExt;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::ConnectError;
use crate::event_stream::EventStream;

#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

struct AbortInner {
    aborted: AtomicBool,
    reason: OnceLock<String>,
    notify: Notify,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    /// Resolves once the signal fires; immediately if it already has.
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    pub fn check(&self) -> Result<(), ConnectError> {
        if self.is_aborted() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    pub fn to_error(&self) -> ConnectError {
        ConnectError::aborted(self.reason())
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .field("reason", &self.reason())
            .finish()
    }
}

pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                inner: Arc::new(AbortInner {
                    aborted: AtomicBool::new(false),
                    reason: OnceLock::new(),
                    notify: Notify::new(),
                }),
            },
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.inner.aborted.store(true, Ordering::SeqCst);
        self.signal.inner.notify.notify_waiters();
    }

    /// The first reason supplied wins; later aborts keep it.
    pub fn abort_with_reason(&self, reason: impl Into<String>) {
        let _ = self.signal.inner.reason.set(reason.into());
        self.abort();
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Races every pull of `stream` against `signal`. When the signal wins, the
/// inner stream is dropped (interrupting its transport, discarding anything
/// it buffered) and a single cancellation error is yielded.
pub fn abortable(stream: EventStream, signal: Option<AbortSignal>) -> EventStream {
    let Some(signal) = signal else {
        return stream;
    };

    Box::pin(async_stream::stream! {
        let mut stream = stream;
        loop {
            let next = tokio::select! {
                biased;
                _ = signal.cancelled() => None,
                item = stream.next() => Some(item),
            };

            match next {
                None => {
                    drop(stream);
                    debug!(reason = ?signal.reason(), "stream aborted mid-flight");
                    yield Err(signal.to_error());
                    return;
                }
                Some(Some(item)) => {
                    let last = match &item {
                        Ok(event) => event.is_terminal(),
                        Err(_) => true,
                    };
                    yield item;
                    if last {
                        return;
                    }
                }
                Some(None) => return,
            }
        }
    })
}
