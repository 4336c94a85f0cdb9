//! # Snapshot Slot
//!
//! One-element, latest-wins ownership handoff.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────┐   move   ┌──────────┐   move   ┌──────────────────┐
//!        │ SnapshotPublisher│ ───────▶ │ slot (1) │ ───────▶ │ SnapshotReceiver │
//!        │   (Simulation)   │          └──────────┘          │     (Render)     │
//!        └────────┬─────────┘               ▲                └──────────────────┘
//!                 │    replace stale value  │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `SnapshotPublisher`: one per producer, never blocks
//! - `SnapshotReceiver`: one per consumer, may poll or wait
//! - `HandoffStats`: atomic counters shared by both sides

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Counters shared by both ends of a slot.
#[derive(Debug, Default)]
pub struct HandoffStats {
    /// Values handed to the slot.
    published: AtomicU64,
    /// Values dropped unconsumed because a newer one replaced them.
    replaced: AtomicU64,
    /// Values taken by the consumer.
    consumed: AtomicU64,
    /// Producer has closed the slot.
    closed: AtomicBool,
    /// Consumer has been dropped.
    consumer_gone: AtomicBool,
}

impl HandoffStats {
    /// Returns the number of published values.
    #[inline]
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Returns the number of values replaced before being consumed.
    #[inline]
    #[must_use]
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    /// Returns the number of consumed values.
    #[inline]
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Returns whether the producer closed the slot.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Result of a publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The slot was empty.
    Delivered,
    /// An unconsumed older value was dropped in favor of this one.
    Replaced,
    /// The consumer is gone; the value was dropped.
    NoConsumer,
}

/// Creates a connected publisher/receiver pair.
///
/// ## Usage
///
/// ```rust,ignore
/// let (publisher, receiver) = snapshot_slot::<Snapshot>();
///
/// // Simulation thread
/// publisher.publish(instance.export_snapshot());
///
/// // Render thread
/// if let Some(next) = receiver.try_take() {
///     current = next;
/// }
/// ```
#[must_use]
pub fn snapshot_slot<T: Send>() -> (SnapshotPublisher<T>, SnapshotReceiver<T>) {
    let (tx, rx) = bounded(1);
    let stats = Arc::new(HandoffStats::default());
    (
        SnapshotPublisher {
            tx,
            reclaim: rx.clone(),
            stats: Arc::clone(&stats),
        },
        SnapshotReceiver { rx, stats },
    )
}

/// Producer end of a snapshot slot.
pub struct SnapshotPublisher<T> {
    tx: Sender<T>,
    /// Producer-side handle used to evict a stale value.
    reclaim: Receiver<T>,
    stats: Arc<HandoffStats>,
}

impl<T> SnapshotPublisher<T> {
    /// Moves `value` into the slot, replacing any unconsumed value.
    ///
    /// Never blocks. The replaced value is dropped on this thread.
    pub fn publish(&self, value: T) -> PublishOutcome {
        if self.stats.consumer_gone.load(Ordering::Acquire) {
            return PublishOutcome::NoConsumer;
        }

        let mut outcome = PublishOutcome::Delivered;
        let mut pending = value;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    // The consumer may take the stale value first; either way
                    // the slot has room on the next attempt.
                    if self.reclaim.try_recv().is_ok() {
                        self.stats.replaced.fetch_add(1, Ordering::Relaxed);
                        outcome = PublishOutcome::Replaced;
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return PublishOutcome::NoConsumer,
            }
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Returns true if a published value is waiting to be taken.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.tx.is_empty()
    }

    /// Returns the shared counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &HandoffStats {
        &self.stats
    }

    /// Closes the producer side.
    ///
    /// A pending value stays in the slot for the consumer to take; after that
    /// the receiver reports the slot as closed.
    ///
    /// # Returns
    ///
    /// `true` if a value was still pending at close time.
    pub fn close(self) -> bool {
        let pending = self.has_pending();
        self.stats.closed.store(true, Ordering::Release);
        pending
    }
}

/// Consumer end of a snapshot slot.
pub struct SnapshotReceiver<T> {
    rx: Receiver<T>,
    stats: Arc<HandoffStats>,
}

impl<T> SnapshotReceiver<T> {
    /// Takes the newest value if one is ready.
    pub fn try_take(&self) -> Option<T> {
        let value = self.rx.try_recv().ok()?;
        self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Waits up to `timeout` for a value.
    ///
    /// Returns None on timeout or once the producer is closed and the slot
    /// is drained.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => {
                self.stats.consumed.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns true once the producer closed and nothing is left to take.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stats.is_closed() && self.rx.is_empty()
    }

    /// Returns the shared counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &HandoffStats {
        &self.stats
    }
}

impl<T> Drop for SnapshotReceiver<T> {
    fn drop(&mut self) {
        self.stats.consumer_gone.store(true, Ordering::Release);
    }
}
