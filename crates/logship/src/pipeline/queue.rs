// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded event queue shared between producers and the delivery worker.
//!
//! # Capacity
//!
//! The queue holds pending events plus the batch currently being delivered.
//! The in-flight batch keeps counting against capacity until every one of its
//! documents is resolved, so a backend outage fills the queue instead of
//! growing memory.
//!
//! # Sequence numbers
//!
//! Every accepted event gets a sequence number. The *resolved frontier* is the
//! highest sequence number such that it and every earlier event have left the
//! queue (indexed, rejected, lost, evicted or discarded). `flush` waits on the
//! frontier through a `watch` channel.
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the state. It is held for an append, an
//! eviction, or moving a batch in or out of flight; never across an await
//! point or a network call. Producers blocked by
//! [`OverflowPolicy::BlockWithTimeout`] wait on a `Condvar` that is signalled
//! whenever capacity is released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::OverflowPolicy;
use crate::event::Event;
use crate::pipeline::{DropReason, EnqueueResult, ShutdownReport};

/// One accepted event waiting for delivery.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) seq: u64,
    pub(crate) event: Event,
    pub(crate) enqueued_at: Instant,
}

#[derive(Debug)]
pub(crate) struct QueueState {
    pub(crate) pending: VecDeque<Entry>,
    /// Unresolved events of the batch being delivered.
    pub(crate) in_flight: usize,
    /// Sequence number of the oldest unresolved in-flight event.
    pub(crate) in_flight_first_seq: Option<u64>,
    pub(crate) next_seq: u64,
    pub(crate) closed: bool,
    /// When draining must stop. Set when the queue is closed.
    pub(crate) drain_deadline: Option<Instant>,
}

impl QueueState {
    fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity.min(4096)),
            in_flight: 0,
            in_flight_first_seq: None,
            next_seq: 1,
            closed: false,
            drain_deadline: None,
        }
    }

    /// Events counting against capacity.
    pub(crate) fn len(&self) -> usize {
        self.pending.len() + self.in_flight
    }

    /// Highest sequence number below which everything is resolved.
    pub(crate) fn frontier(&self) -> u64 {
        let oldest = self
            .in_flight_first_seq
            .or_else(|| self.pending.front().map(|entry| entry.seq))
            .unwrap_or(self.next_seq);
        oldest.saturating_sub(1)
    }

    /// Sequence number of the most recently accepted event, or 0.
    pub(crate) fn last_seq(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }
}

/// Monotonic counters, updated without taking the queue lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) accepted: AtomicU64,
    pub(crate) dropped_queue_full: AtomicU64,
    pub(crate) dropped_shutting_down: AtomicU64,
    pub(crate) evicted: AtomicU64,
    pub(crate) indexed: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) lost: AtomicU64,
    pub(crate) lost_batches: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) batches_sent: AtomicU64,
    pub(crate) retries: AtomicU64,
}

impl Counters {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, queued: usize) -> PipelineStats {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        PipelineStats {
            accepted: get(&self.accepted),
            dropped_queue_full: get(&self.dropped_queue_full),
            dropped_shutting_down: get(&self.dropped_shutting_down),
            evicted: get(&self.evicted),
            indexed: get(&self.indexed),
            rejected: get(&self.rejected),
            lost: get(&self.lost),
            lost_batches: get(&self.lost_batches),
            discarded: get(&self.discarded),
            batches_sent: get(&self.batches_sent),
            retries: get(&self.retries),
            queued,
        }
    }
}

/// Point-in-time view of a pipeline's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events accepted by `enqueue`.
    pub accepted: u64,
    /// Events refused because the queue was full.
    pub dropped_queue_full: u64,
    /// Events refused because the pipeline was shutting down.
    pub dropped_shutting_down: u64,
    /// Accepted events evicted by the drop-oldest policy.
    pub evicted: u64,
    pub indexed: u64,
    pub rejected: u64,
    /// Events dropped after their batch exhausted its attempts.
    pub lost: u64,
    pub lost_batches: u64,
    /// Events still queued when the drain deadline passed.
    pub discarded: u64,
    /// Requests made to the backend, retries included.
    pub batches_sent: u64,
    pub retries: u64,
    /// Events currently queued or in flight.
    pub queued: usize,
}

/// State shared by every [`DeliveryPipeline`](crate::pipeline::DeliveryPipeline)
/// handle and the worker.
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<QueueState>,
    space: Condvar,
    pub(crate) wake: Notify,
    pub(crate) counters: Counters,
    frontier: watch::Sender<u64>,
    pub(crate) report: watch::Sender<Option<ShutdownReport>>,
    capacity: usize,
    batch_size: usize,
    policy: OverflowPolicy,
}

impl Shared {
    pub(crate) fn new(capacity: usize, batch_size: usize, policy: OverflowPolicy) -> Self {
        let (frontier, _) = watch::channel(0);
        let (report, _) = watch::channel(None);
        Self {
            state: Mutex::new(QueueState::new(capacity)),
            space: Condvar::new(),
            wake: Notify::new(),
            counters: Counters::default(),
            frontier,
            report,
            capacity,
            batch_size,
            policy,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe_frontier(&self) -> watch::Receiver<u64> {
        self.frontier.subscribe()
    }

    pub(crate) fn stats(&self) -> PipelineStats {
        let queued = self.lock().len();
        self.counters.snapshot(queued)
    }

    /// Appends an event, applying the overflow policy when full.
    pub(crate) fn push(&self, event: Event) -> EnqueueResult {
        let mut state = self.lock();

        if state.closed {
            drop(state);
            Counters::incr(&self.counters.dropped_shutting_down);
            return EnqueueResult::Dropped(DropReason::ShuttingDown);
        }

        if state.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropNewest => {
                    drop(state);
                    return self.drop_full();
                }
                OverflowPolicy::DropOldest => {
                    let Some(evicted) = state.pending.pop_front() else {
                        // Everything queued is in flight.
                        drop(state);
                        return self.drop_full();
                    };
                    Counters::incr(&self.counters.evicted);
                    warn!(
                        "PIPELINE | Queue full ({} events), evicted oldest event {}",
                        self.capacity,
                        evicted.event.event_id()
                    );
                    self.publish_frontier(&state);
                }
                OverflowPolicy::BlockWithTimeout(timeout) => {
                    let deadline = std::time::Instant::now() + timeout;
                    while state.len() >= self.capacity && !state.closed {
                        let remaining =
                            deadline.saturating_duration_since(std::time::Instant::now());
                        if remaining.is_zero() {
                            drop(state);
                            return self.drop_full();
                        }
                        state = self
                            .space
                            .wait_timeout(state, remaining)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    if state.closed {
                        drop(state);
                        Counters::incr(&self.counters.dropped_shutting_down);
                        return EnqueueResult::Dropped(DropReason::ShuttingDown);
                    }
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push_back(Entry {
            seq,
            event,
            enqueued_at: Instant::now(),
        });
        let pending = state.pending.len();
        drop(state);

        Counters::incr(&self.counters.accepted);
        // The first event starts the linger timer; a full batch is sent now.
        if pending == 1 || pending >= self.batch_size {
            self.wake.notify_one();
        }
        EnqueueResult::Accepted
    }

    fn drop_full(&self) -> EnqueueResult {
        Counters::incr(&self.counters.dropped_queue_full);
        debug!("PIPELINE | Queue full ({} events), dropping new event", self.capacity);
        EnqueueResult::Dropped(DropReason::QueueFull)
    }

    /// Moves up to `max` pending events into flight.
    pub(crate) fn take_batch(&self, state: &mut QueueState, max: usize) -> Vec<Entry> {
        let n = max.min(state.pending.len());
        let batch: Vec<Entry> = state.pending.drain(..n).collect();
        state.in_flight = batch.len();
        state.in_flight_first_seq = batch.first().map(|entry| entry.seq);
        batch
    }

    /// Records what is left of the in-flight batch after an attempt.
    pub(crate) fn settle(&self, remaining: usize, first_seq: Option<u64>) {
        let mut state = self.lock();
        let released = state.in_flight > remaining;
        state.in_flight = remaining;
        state.in_flight_first_seq = first_seq;
        self.publish_frontier(&state);
        drop(state);
        if released {
            self.space.notify_all();
        }
    }

    /// Closes the queue to new events. Returns false if it was already
    /// closed.
    pub(crate) fn close(&self, deadline: Instant) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.drain_deadline = Some(deadline);
        drop(state);
        self.space.notify_all();
        self.wake.notify_one();
        true
    }

    /// Drops every pending event and the in-flight accounting. Returns the
    /// number of pending events removed.
    pub(crate) fn discard_pending(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.pending.len();
        state.pending.clear();
        state.in_flight = 0;
        state.in_flight_first_seq = None;
        self.publish_frontier(&state);
        drop(state);
        self.space.notify_all();
        discarded
    }

    fn publish_frontier(&self, state: &QueueState) {
        let frontier = state.frontier();
        self.frontier.send_if_modified(|current| {
            if *current == frontier {
                false
            } else {
                *current = frontier;
                true
            }
        });
    }
}
