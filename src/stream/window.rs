//! Order-preserving sliding-window stream with bounded buffering.
//!
//! A [`WindowedStream`] multiplexes one producer (or several sharded
//! producers upstream) into one or more [`StreamReader`]s, each of which
//! consumes [`StreamSection`]s: the current item plus a bounded lookback
//! (`past_size`) and lookahead (`future_size`) window around it.
//!
//! Two invariants shape the implementation:
//!
//! - **Visibility order**: items become visible strictly in publish order.
//!   [`WindowedStream::publish_with`] reserves a sequence slot before its
//!   transform runs, and a slot only becomes visible once every earlier
//!   slot is filled, so a slow transform on item `i` holds back `i+1, i+2, …`
//!   no matter when their transforms finish.
//! - **Bounded buffering**: with a `backpressure` limit `B`, `publish`
//!   suspends while `B` published items await consumption; consumption or
//!   shutdown releases it. Items fully behind every reader's past window
//!   are evicted from the ring.
//!
//! Shutdown (`close`) moves `Open → Closing → Closed`: blocked publishers
//! abandon without side effects, blocked readers drain whatever is already
//! visible (short windows allowed) and then observe end-of-stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{BsreadError, Result};

/// One windowed view emitted by the stream.
///
/// Owned by the consumer that received it; the ring may advance (and evict)
/// independently afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSection<T> {
    pub current: T,
    /// Up to `past_size` items immediately preceding `current`, oldest
    /// first. Shorter when fewer have been retained.
    pub past: Vec<T>,
    /// Up to `future_size` items immediately following `current`. Shorter
    /// only for non-blocking reads or while draining after close.
    pub future: Vec<T>,
}

/// Stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    /// Closed for publishing; readers drain what is already visible.
    Closing,
    Closed,
}

enum Slot<T> {
    /// Reserved at publish time; the transform has not completed yet.
    Pending,
    Ready(T),
}

struct Ring<T> {
    slots: VecDeque<Slot<T>>,
    /// Sequence number of `slots[0]`.
    base: u64,
    /// Next sequence number to reserve.
    next_seq: u64,
    /// Visibility frontier: every sequence below this is filled (or already
    /// evicted). Advances only over contiguous ready slots, which is what
    /// enforces publish-order visibility.
    ready_upto: u64,
    /// Read cursor per attached reader (`None` after the reader detached).
    readers: Vec<Option<u64>>,
    phase: Phase,
}

impl<T> Ring<T> {
    fn slot(&self, seq: u64) -> Option<&Slot<T>> {
        seq.checked_sub(self.base).and_then(|i| self.slots.get(i as usize))
    }

    fn min_cursor(&self) -> Option<u64> {
        self.readers.iter().flatten().min().copied()
    }

    /// Published items not yet consumed by the slowest reader.
    fn in_flight(&self) -> u64 {
        match self.min_cursor() {
            Some(cursor) => self.next_seq.saturating_sub(cursor),
            None => 0,
        }
    }

    fn advance_ready(&mut self) {
        while self.ready_upto < self.next_seq {
            match self.slot(self.ready_upto) {
                Some(Slot::Ready(_)) => self.ready_upto += 1,
                _ => break,
            }
        }
    }

    /// Drop slots behind every reader's past window.
    fn evict(&mut self, past_size: usize) {
        let horizon = match self.min_cursor() {
            Some(cursor) => cursor.saturating_sub(past_size as u64),
            // No readers left: nothing retains the buffer
            None => self.ready_upto,
        };
        while self.base < horizon && !self.slots.is_empty() {
            self.slots.pop_front();
            self.base += 1;
        }
    }
}

struct Shared<T> {
    ring: Mutex<Ring<T>>,
    /// Gate for publishers blocked on backpressure.
    space: Notify,
    /// Gate for readers waiting on the visibility frontier.
    avail: Notify,
    cancel: CancellationToken,
    past_size: usize,
    future_size: usize,
    backpressure: Option<usize>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Publisher handle of the windowed stream.
pub struct WindowedStream<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer handle with its own read cursor.
pub struct StreamReader<T> {
    shared: Arc<Shared<T>>,
    index: usize,
}

impl<T: Clone + Send + 'static> WindowedStream<T> {
    /// Create a stream with the given window sizes and optional
    /// backpressure limit.
    pub fn new(past_size: usize, future_size: usize, backpressure: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    slots: VecDeque::new(),
                    base: 0,
                    next_seq: 0,
                    ready_upto: 0,
                    readers: Vec::new(),
                    phase: Phase::Open,
                }),
                space: Notify::new(),
                avail: Notify::new(),
                cancel: CancellationToken::new(),
                past_size,
                future_size,
                backpressure,
            }),
        }
    }

    /// Attach a reader.
    ///
    /// The reader's first `current` is the `past_size`-th item published
    /// after attachment; earlier items only ever serve as its lookback
    /// window.
    pub fn reader(&self) -> StreamReader<T> {
        let mut ring = self.shared.lock();
        let cursor = ring.next_seq + self.shared.past_size as u64;
        ring.readers.push(Some(cursor));
        let index = ring.readers.len() - 1;
        StreamReader { shared: Arc::clone(&self.shared), index }
    }

    /// Publish one item.
    ///
    /// Suspends while the backpressure limit is reached; returns
    /// `Err(Closed)` (a normal termination value, not a failure) when the
    /// stream shuts down before the slot could be reserved.
    pub async fn publish(&self, item: T) -> Result<()> {
        let seq = self.reserve().await?;
        self.complete(seq, item);
        Ok(())
    }

    /// Publish the output of an asynchronous transform.
    ///
    /// The sequence slot is reserved *now*; the transform runs on its own
    /// task and the item becomes visible only once every earlier slot is
    /// filled, so slow transforms never let later items overtake.
    pub async fn publish_with<F>(&self, transform: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let seq = self.reserve().await?;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let item = transform.await;
            Self::complete_in(&shared, seq, item);
        });
        Ok(())
    }

    /// Close the stream and wake every blocked publisher and reader.
    pub fn close(&self) {
        {
            let mut ring = self.shared.lock();
            if ring.phase == Phase::Open {
                ring.phase = Phase::Closing;
            }
        }
        self.shared.cancel.cancel();
        self.shared.space.notify_waiters();
        self.shared.avail.notify_waiters();
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    async fn reserve(&self) -> Result<u64> {
        loop {
            // Register interest before the check so a wakeup between the
            // unlock and the await is not lost.
            let space = self.shared.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut ring = self.shared.lock();
                if ring.phase != Phase::Open {
                    return Err(BsreadError::Closed);
                }
                let at_limit = self
                    .shared
                    .backpressure
                    .is_some_and(|limit| ring.in_flight() >= limit as u64);
                if !at_limit {
                    let seq = ring.next_seq;
                    ring.next_seq += 1;
                    ring.slots.push_back(Slot::Pending);
                    return Ok(seq);
                }
            }

            tokio::select! {
                _ = &mut space => {}
                _ = self.shared.cancel.cancelled() => return Err(BsreadError::Closed),
            }
        }
    }

    fn complete(&self, seq: u64, item: T) {
        Self::complete_in(&self.shared, seq, item);
    }

    fn complete_in(shared: &Shared<T>, seq: u64, item: T) {
        let mut ring = shared.lock();
        let Some(index) = seq.checked_sub(ring.base) else {
            // Slot already evicted (stream closed and drained underneath)
            return;
        };
        if let Some(slot) = ring.slots.get_mut(index as usize) {
            *slot = Slot::Ready(item);
            let before = ring.ready_upto;
            ring.advance_ready();
            if ring.ready_upto != before {
                trace!(upto = ring.ready_upto, "visibility frontier advanced");
                shared.avail.notify_waiters();
            }
        }
    }
}

impl<T: Clone> StreamReader<T> {
    /// Advance to the next section, waiting until `current` and a full
    /// future window are visible.
    ///
    /// Returns `None` at end-of-stream: after `close()`, any remaining
    /// visible items are drained first (with possibly short future
    /// windows), then the stream reports termination.
    pub async fn next(&mut self) -> Option<StreamSection<T>> {
        let shared = Arc::clone(&self.shared);
        loop {
            let avail = shared.avail.notified();
            tokio::pin!(avail);
            avail.as_mut().enable();

            match self.poll_section(true) {
                Some(section) => return Some(section),
                None => {
                    if shared.lock().phase != Phase::Open {
                        return None;
                    }
                }
            }

            tokio::select! {
                _ = &mut avail => {}
                _ = shared.cancel.cancelled() => {
                    // Drain whatever became visible before the shutdown
                    return self.poll_section(false);
                }
            }
        }
    }

    /// Non-blocking variant: returns the next section immediately (short
    /// future window allowed) or `None` when nothing new is visible.
    pub fn try_next(&mut self) -> Option<StreamSection<T>> {
        self.poll_section(false)
    }

    /// Try to assemble a section at the current cursor under the ring lock.
    fn poll_section(&mut self, require_full_future: bool) -> Option<StreamSection<T>> {
        let shared = &self.shared;
        let mut ring = shared.lock();
        let cursor = ring.readers[self.index]?;

        if cursor >= ring.ready_upto {
            self.mark_closed_if_drained(&mut ring);
            return None;
        }
        let closing = ring.phase != Phase::Open;
        let visible_future = (ring.ready_upto - cursor - 1).min(shared.future_size as u64);
        if require_full_future && !closing && (visible_future as usize) < shared.future_size {
            return None;
        }

        let clone_at = |ring: &Ring<T>, seq: u64| match ring.slot(seq) {
            Some(Slot::Ready(item)) => item.clone(),
            _ => unreachable!("slots below the visibility frontier are ready"),
        };

        let past_start = cursor.saturating_sub(shared.past_size as u64).max(ring.base);
        let past = (past_start..cursor).map(|seq| clone_at(&ring, seq)).collect();
        let current = clone_at(&ring, cursor);
        let future = (cursor + 1..cursor + 1 + visible_future)
            .map(|seq| clone_at(&ring, seq))
            .collect();

        ring.readers[self.index] = Some(cursor + 1);
        ring.evict(shared.past_size);
        shared.space.notify_waiters();

        Some(StreamSection { current, past, future })
    }

    fn mark_closed_if_drained(&self, ring: &mut MutexGuard<'_, Ring<T>>) {
        if ring.phase == Phase::Closing {
            let drained = ring
                .readers
                .iter()
                .flatten()
                .all(|&cursor| cursor >= ring.ready_upto);
            if drained {
                ring.phase = Phase::Closed;
            }
        }
    }
}

impl<T> Drop for StreamReader<T> {
    fn drop(&mut self) {
        let mut ring = self.shared.lock();
        ring.readers[self.index] = None;
        drop(ring);
        // A detached reader may have been the one holding back publishers
        self.shared.space.notify_waiters();
    }
}
