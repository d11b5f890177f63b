//! Bounded, thread-safe queue of outbound frames.
//!
//! Producers (the driving loop, or anything holding a client handle) push
//! frames with [`FrameQueue::enqueue`]; the connection worker pops them one at
//! a time with [`FrameQueue::dequeue`].
//!
//! # Byte budget, not frame count
//!
//! The capacity is expressed in bytes.  Each queued frame costs its payload
//! length plus [`LENGTH_PREFIX_SIZE`] bytes of bookkeeping, so a queue with a
//! capacity of 50 bytes accepts one 40-byte frame (44 bytes charged) and then
//! rejects a 10-byte frame (14 bytes needed, 6 free).
//!
//! Admission is all-or-nothing: a frame is either stored completely or not at
//! all, and [`FrameQueue::dequeue`] always yields a whole frame.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

/// Largest frame the gateway accepts from a local source, in bytes.
pub const MAX_FRAME_SIZE: usize = 300;

/// Bytes charged per queued frame on top of its payload.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default queue capacity in bytes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;

/// Error returned when a frame cannot be admitted to the queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Not enough free byte budget for the frame and its bookkeeping.
    #[error("queue full: need {needed} bytes, {free} free")]
    Full { needed: usize, free: usize },

    /// The frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame of {len} bytes exceeds the {max}-byte maximum")]
    FrameTooLarge { len: usize, max: usize },

    /// Zero-length frames carry nothing worth forwarding.
    #[error("empty frame")]
    EmptyFrame,
}

/// One complete outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Returns the frame payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the frame and returns the payload.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Bytes of queue budget this frame occupies.
    fn cost(&self) -> usize {
        self.0.len() + LENGTH_PREFIX_SIZE
    }
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<Frame>,
    used: usize,
}

/// A FIFO queue of [`Frame`]s bounded by a byte budget.
///
/// All methods take `&self`; the queue is shared between the producer side
/// and the connection worker behind an `Arc`.
///
/// # Examples
///
/// ```rust
/// use aprs_core::FrameQueue;
///
/// let queue = FrameQueue::new(50);
/// assert!(queue.enqueue(&[b'x'; 40]).is_ok());
/// assert!(queue.enqueue(&[b'y'; 10]).is_err());
/// assert_eq!(queue.dequeue().unwrap().len(), 40);
/// ```
#[derive(Debug)]
pub struct FrameQueue {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl FrameQueue {
    /// Creates an empty queue holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Total byte budget of the queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies `data` into the queue as one frame.
    ///
    /// # Errors
    ///
    /// - [`QueueError::EmptyFrame`] for a zero-length frame.
    /// - [`QueueError::FrameTooLarge`] if `data` is longer than [`MAX_FRAME_SIZE`].
    /// - [`QueueError::Full`] if the remaining budget is smaller than
    ///   `data.len() + LENGTH_PREFIX_SIZE`.  Nothing is stored in that case.
    pub fn enqueue(&self, data: &[u8]) -> Result<(), QueueError> {
        if data.is_empty() {
            return Err(QueueError::EmptyFrame);
        }
        if data.len() > MAX_FRAME_SIZE {
            return Err(QueueError::FrameTooLarge {
                len: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let frame = Frame(data.to_vec());
        let needed = frame.cost();

        let mut inner = self.lock();
        let free = self.capacity - inner.used;
        if free < needed {
            return Err(QueueError::Full { needed, free });
        }

        inner.used += needed;
        inner.frames.push_back(frame);
        Ok(())
    }

    /// Removes and returns the oldest frame, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<Frame> {
        let mut inner = self.lock();
        let frame = inner.frames.pop_front()?;
        inner.used -= frame.cost();
        Some(frame)
    }

    /// Returns `true` if no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Remaining byte budget.
    pub fn free_space(&self) -> usize {
        self.capacity - self.lock().used
    }

    /// Discards every queued frame and returns how many were dropped.
    pub fn drain(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        inner.used = 0;
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded data is always left consistent, so a poisoned lock is
        // still safe to use.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
