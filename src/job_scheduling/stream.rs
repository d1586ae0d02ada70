//! Unbounded, closable data streams attached to a job
//!
//! Producers never block: `push` appends to an in-memory buffer or fails
//! with `StreamError::Closed` once the stream was closed. Consumers can
//! poll without blocking (`try_next`, `drain`) or await the next item
//! (`next`), which yields `None` once the stream is closed and drained.

use futures::Stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::types::{DiagnosticRecord, ErrorRecord, ProgressRecord, WarningRecord};
use crate::errors::{StreamError, StreamResult};

/// A single unbounded, closable stream of `T`
pub struct DataStream<T> {
    inner: Arc<StreamInner<T>>,
}

struct StreamInner<T> {
    name: &'static str,
    buffer: Mutex<StreamBuffer<T>>,
    notify: Notify,
}

struct StreamBuffer<T> {
    items: VecDeque<T>,
    closed: bool,
    written: u64,
}

impl<T> Clone for DataStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DataStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.buffer();
        f.debug_struct("DataStream")
            .field("name", &self.inner.name)
            .field("buffered", &buffer.items.len())
            .field("closed", &buffer.closed)
            .finish()
    }
}

impl<T> DataStream<T> {
    /// Create a new open stream
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                name,
                buffer: Mutex::new(StreamBuffer {
                    items: VecDeque::new(),
                    closed: false,
                    written: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    // A panicking consumer must not take the producers down with it.
    fn buffer(&self) -> MutexGuard<'_, StreamBuffer<T>> {
        self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item, failing if the stream is closed
    pub fn push(&self, item: T) -> StreamResult<()> {
        {
            let mut buffer = self.buffer();
            if buffer.closed {
                return Err(StreamError::Closed {
                    stream: self.inner.name,
                });
            }
            buffer.items.push_back(item);
            buffer.written += 1;
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Close the stream; returns true only for the call that actually closed it
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut buffer = self.buffer();
            !std::mem::replace(&mut buffer.closed, true)
        };
        if newly_closed {
            self.inner.notify.notify_waiters();
        }
        newly_closed
    }

    pub fn is_closed(&self) -> bool {
        self.buffer().closed
    }

    /// Number of buffered, not yet consumed items
    pub fn len(&self) -> usize {
        self.buffer().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().items.is_empty()
    }

    /// Total number of items ever written, consumed or not
    pub fn total_written(&self) -> u64 {
        self.buffer().written
    }

    /// Take the next buffered item without waiting
    pub fn try_next(&self) -> Option<T> {
        self.buffer().items.pop_front()
    }

    /// Take everything currently buffered without waiting
    pub fn drain(&self) -> Vec<T> {
        self.buffer().items.drain(..).collect()
    }

    /// Wait for the next item; `None` once the stream is closed and empty
    pub async fn next(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a push between the
            // check and the await is not missed.
            notified.as_mut().enable();

            {
                let mut buffer = self.buffer();
                if let Some(item) = buffer.items.pop_front() {
                    return Some(item);
                }
                if buffer.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Wait until the stream is closed and return everything it carried
    pub async fn collect(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }

    /// Consume the stream as a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        async_stream::stream! {
            while let Some(item) = self.next().await {
                yield item;
            }
        }
    }
}

impl<T: Clone> DataStream<T> {
    /// Copy of the buffered items, leaving them in place
    pub fn snapshot(&self) -> Vec<T> {
        self.buffer().items.iter().cloned().collect()
    }
}

/// The five output streams owned by every job
#[derive(Debug, Clone)]
pub struct JobStreams {
    pub output: DataStream<Value>,
    pub error: DataStream<ErrorRecord>,
    pub progress: DataStream<ProgressRecord>,
    pub warning: DataStream<WarningRecord>,
    pub diagnostic: DataStream<DiagnosticRecord>,
}

impl JobStreams {
    pub fn new() -> Self {
        Self {
            output: DataStream::new("output"),
            error: DataStream::new("error"),
            progress: DataStream::new("progress"),
            warning: DataStream::new("warning"),
            diagnostic: DataStream::new("diagnostic"),
        }
    }

    /// True while any stream still has unread items
    pub fn has_more_data(&self) -> bool {
        !self.output.is_empty()
            || !self.error.is_empty()
            || !self.progress.is_empty()
            || !self.warning.is_empty()
            || !self.diagnostic.is_empty()
    }

    pub fn close_all(&self) {
        self.output.close();
        self.error.close();
        self.progress.close();
        self.warning.close();
        self.diagnostic.close();
    }
}

impl Default for JobStreams {
    fn default() -> Self {
        Self::new()
    }
}
