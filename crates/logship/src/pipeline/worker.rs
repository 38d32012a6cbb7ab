// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The background delivery loop.
//!
//! 1. Wait until `batch_size` events are queued, the oldest one has waited
//!    `batch_linger`, or a flush or shutdown asks for delivery now.
//! 2. Move up to `batch_size` events into flight and send them, bounded by
//!    the request timeout.
//! 3. Indexed documents are done. Rejected documents are dropped for good
//!    and reported through the local sink. Unknown documents stay in flight.
//! 4. If anything is left, the attempt failed: back off and send the rest
//!    again before any newer event, or drop the batch as lost once it has
//!    used all of its attempts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendClient, BackendError, BatchResult, DocumentOutcome};
use crate::enricher::Enricher;
use crate::event::{Event, Fields, Level};
use crate::pipeline::queue::{Counters, Entry, Shared};
use crate::pipeline::{Control, PipelineConfig, ShutdownReport};
use crate::sink::LocalSink;

/// Events currently being delivered, with the attempts spent on them.
#[derive(Debug, Default)]
struct InFlight {
    seqs: Vec<u64>,
    events: Vec<Event>,
    attempts: u32,
}

impl InFlight {
    fn from_entries(entries: Vec<Entry>) -> Self {
        let (seqs, events) = entries
            .into_iter()
            .map(|entry| (entry.seq, entry.event))
            .unzip();
        Self {
            seqs,
            events,
            attempts: 0,
        }
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Consumer side of a [`DeliveryPipeline`](crate::pipeline::DeliveryPipeline).
///
/// Created by [`DeliveryPipeline::new`](crate::pipeline::DeliveryPipeline::new);
/// spawn [`run`](Self::run) on a tokio runtime to start delivering.
pub struct DeliveryWorker {
    config: PipelineConfig,
    shared: Arc<Shared>,
    control: mpsc::Receiver<Control>,
    control_open: bool,
    shutdown: CancellationToken,
    backend: Arc<dyn BackendClient>,
    sink: Arc<dyn LocalSink>,
    enricher: Enricher,
    /// Events up to this sequence number are delivered without lingering.
    flush_up_to: u64,
}

impl fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("config", &self.config)
            .field("flush_up_to", &self.flush_up_to)
            .finish_non_exhaustive()
    }
}

impl DeliveryWorker {
    pub(crate) fn new(
        config: PipelineConfig,
        shared: Arc<Shared>,
        control: mpsc::Receiver<Control>,
        shutdown: CancellationToken,
        backend: Arc<dyn BackendClient>,
        sink: Arc<dyn LocalSink>,
        enricher: Enricher,
    ) -> Self {
        Self {
            config,
            shared,
            control,
            control_open: true,
            shutdown,
            backend,
            sink,
            enricher,
            flush_up_to: 0,
        }
    }

    /// Runs until the pipeline is shut down and drained, or every pipeline
    /// handle has been dropped and the queue drained.
    pub async fn run(mut self) {
        debug!(
            "PIPELINE | Delivery worker started (batch size {}, linger {} ms)",
            self.config.batch_size,
            self.config.batch_linger.as_millis()
        );

        let mut batch = InFlight::default();
        loop {
            if batch.is_empty() {
                match self.next_batch().await {
                    Some(next) => batch = next,
                    None => break,
                }
            }
            if self.deadline_passed() {
                break;
            }

            batch.attempts += 1;
            let result = self.attempt(&batch).await;
            let Some(failure) = self.resolve(&mut batch, result) else {
                continue;
            };

            if self.config.retry.exhausted(batch.attempts) {
                self.give_up(&mut batch, &failure);
                continue;
            }

            let delay = self.config.retry.delay(batch.attempts);
            Counters::incr(&self.shared.counters.retries);
            warn!(
                "PIPELINE | Delivery of {} events failed (attempt {}/{}): {}. Retrying in {} ms",
                batch.len(),
                batch.attempts,
                self.config.retry.max_attempts,
                failure,
                delay.as_millis()
            );
            if !self.backoff(delay).await {
                break;
            }
        }

        self.finish(batch);
    }

    /// Waits for the next batch to be ready. Returns `None` once the queue is
    /// closed and empty.
    async fn next_batch(&mut self) -> Option<InFlight> {
        loop {
            let linger_until = {
                let mut state = self.shared.lock();
                let oldest = state.pending.front().map(|entry| entry.enqueued_at);
                match oldest {
                    None if state.closed => return None,
                    None => None,
                    Some(enqueued_at) => {
                        let linger_until = enqueued_at + self.config.batch_linger;
                        let ready = state.closed
                            || state.pending.len() >= self.config.batch_size
                            || self.flush_up_to > state.frontier()
                            || Instant::now() >= linger_until;
                        if ready {
                            let entries =
                                self.shared.take_batch(&mut state, self.config.batch_size);
                            return Some(InFlight::from_entries(entries));
                        }
                        Some(linger_until)
                    }
                }
            };

            let linger = async move {
                match linger_until {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = self.shared.wake.notified() => {}
                () = linger => {}
                control = self.control.recv(), if self.control_open => {
                    self.on_control(control);
                }
                () = self.shutdown.cancelled(), if !self.shutdown.is_cancelled() => {}
            }
        }
    }

    async fn attempt(&self, batch: &InFlight) -> Result<BatchResult, BackendError> {
        Counters::incr(&self.shared.counters.batches_sent);
        debug!(
            "PIPELINE | Sending {} events (attempt {})",
            batch.len(),
            batch.attempts
        );

        let send = timeout_at(
            Instant::now() + self.config.request_timeout,
            self.backend.send(&batch.events),
        );
        tokio::select! {
            result = send => result.unwrap_or(Err(BackendError::Timeout)),
            () = self.drain_deadline_reached() => Err(BackendError::Timeout),
        }
    }

    /// Applies an attempt's outcome to the in-flight batch.
    ///
    /// Returns a description of the failure if documents remain unresolved.
    fn resolve(
        &self,
        batch: &mut InFlight,
        result: Result<BatchResult, BackendError>,
    ) -> Option<String> {
        let result = match result {
            Ok(result) => result,
            Err(e) => return Some(e.to_string()),
        };

        let total = batch.len();
        let mut indexed = 0;
        let mut kept_seqs = Vec::new();
        let mut kept_events = Vec::new();
        let seqs = std::mem::take(&mut batch.seqs);
        let events = std::mem::take(&mut batch.events);

        for (position, (seq, event)) in seqs.into_iter().zip(events).enumerate() {
            match result.outcome(position) {
                DocumentOutcome::Indexed => indexed += 1,
                DocumentOutcome::Rejected(reason) => self.report_rejected(&event, &reason),
                DocumentOutcome::Unknown => {
                    kept_seqs.push(seq);
                    kept_events.push(event);
                }
            }
        }

        Counters::add(&self.shared.counters.indexed, indexed);
        batch.seqs = kept_seqs;
        batch.events = kept_events;
        self.shared.settle(batch.len(), batch.seqs.first().copied());

        if batch.is_empty() {
            None
        } else {
            Some(format!(
                "{} of {} documents not acknowledged",
                batch.len(),
                total
            ))
        }
    }

    fn report_rejected(&self, event: &Event, reason: &str) {
        Counters::incr(&self.shared.counters.rejected);
        warn!(
            "PIPELINE | Backend rejected event {}: {}",
            event.event_id(),
            reason
        );
        let notice = self.enricher.enrich(
            Level::Warn,
            "Log event rejected by backend",
            Fields::new()
                .with("log_type", "delivery")
                .with("rejected_event_id", event.event_id().to_string())
                .with("rejected_level", event.level().as_str())
                .with("rejected_message", event.message())
                .with("reason", reason),
        );
        self.sink.emit(&notice);
    }

    fn give_up(&self, batch: &mut InFlight, failure: &str) {
        let lost = batch.len();
        Counters::add(&self.shared.counters.lost, lost);
        Counters::incr(&self.shared.counters.lost_batches);
        error!(
            "PIPELINE | Dropping batch of {} events after {} attempts: {}",
            lost, batch.attempts, failure
        );

        let mut fields = Fields::new()
            .with("log_type", "delivery")
            .with("lost_events", lost)
            .with("attempts", batch.attempts)
            .with("last_error", failure);
        if let Some(first) = batch.events.first() {
            fields.insert("first_event_id", first.event_id().to_string());
        }
        self.sink.emit(&self.enricher.enrich(
            Level::Error,
            "Log batch lost after exhausting delivery attempts",
            fields,
        ));

        batch.seqs.clear();
        batch.events.clear();
        self.shared.settle(0, None);
    }

    /// Sleeps for `delay` before the next attempt.
    ///
    /// A flush request ends the wait early. Returns false when the drain
    /// deadline would pass before the wait ends.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let until = Instant::now() + delay;
        loop {
            if let Some(deadline) = self.drain_deadline() {
                if deadline <= until {
                    debug!("PIPELINE | Backoff outlasts the drain deadline, giving up");
                    return false;
                }
            }

            tokio::select! {
                () = sleep_until(until) => return true,
                control = self.control.recv(), if self.control_open => {
                    if self.on_control(control) {
                        debug!("PIPELINE | Flush requested, retrying now");
                        return true;
                    }
                }
                () = self.shutdown.cancelled(), if !self.shutdown.is_cancelled() => {}
            }
        }
    }

    /// Handles a control message. Returns true for a flush request.
    fn on_control(&mut self, control: Option<Control>) -> bool {
        match control {
            Some(Control::Flush) => {
                self.flush_up_to = self.flush_up_to.max(self.shared.lock().last_seq());
                true
            }
            None => {
                // Every pipeline handle is gone; nobody can enqueue or shut
                // down any more.
                self.control_open = false;
                let deadline = Instant::now() + self.config.drain_timeout;
                if self.shared.close(deadline) {
                    info!("PIPELINE | All pipeline handles dropped, draining queue");
                }
                self.shutdown.cancel();
                false
            }
        }
    }

    fn drain_deadline(&self) -> Option<Instant> {
        self.shared.lock().drain_deadline
    }

    fn deadline_passed(&self) -> bool {
        self.drain_deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn drain_deadline_reached(&self) {
        self.shutdown.cancelled().await;
        match self.drain_deadline() {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn finish(&mut self, batch: InFlight) {
        let discarded = batch.len() + self.shared.discard_pending();
        if discarded > 0 {
            Counters::add(&self.shared.counters.discarded, discarded);
            warn!(
                "PIPELINE | Drain deadline passed, discarding {} undelivered events",
                discarded
            );
        }

        let stats = self.shared.stats();
        let report = ShutdownReport {
            discarded: discarded as u64,
            timed_out: discarded > 0,
            stats,
        };
        self.shared.report.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(report);
            true
        });

        info!(
            "PIPELINE | Delivery worker stopped: {} indexed, {} rejected, {} lost, {} discarded",
            stats.indexed, stats.rejected, stats.lost, stats.discarded
        );
    }
}
