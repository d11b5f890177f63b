//! Scripted frame source for unit and integration tests.
//!
//! Hands out pre-loaded frames one per call, then behaves like an idle
//! socket: it waits out the requested duration and returns `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::application::relay::{FrameSource, SourceError};

/// One scripted result of [`FrameSource::recv_frame`].
#[derive(Debug)]
pub enum Scripted {
    Frame(Vec<u8>),
    Error(std::io::ErrorKind),
}

/// A mock implementation of [`FrameSource`].
#[derive(Debug, Default)]
pub struct MockFrameSource {
    script: VecDeque<Scripted>,
    calls: Arc<AtomicUsize>,
}

impl MockFrameSource {
    /// Creates a source that yields `frames` in order.
    pub fn with_frames<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Vec<u8>>,
    {
        Self {
            script: frames
                .into_iter()
                .map(|f| Scripted::Frame(f.into()))
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends one scripted result.
    pub fn push(&mut self, item: Scripted) {
        self.script.push_back(item);
    }

    /// Shared counter of `recv_frame` calls, readable after the source has
    /// been moved into the relay.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn recv_frame(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(Some(frame)),
            Some(Scripted::Error(kind)) => Err(SourceError::Recv(kind.into())),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }
}
