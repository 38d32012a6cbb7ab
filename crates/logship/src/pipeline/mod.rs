// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery pipeline: bounded buffering and reliable, ordered shipping of
//! events to a [`BackendClient`].
//!
//! # Architecture
//!
//! ```text
//!   producers (any thread)
//!        │ enqueue()  (sync, bounded)
//!        v
//!   ┌──────────────┐   wake (Notify)    ┌────────────────┐
//!   │ bounded queue│ ─────────────────> │ DeliveryWorker │ ── send() ──> backend
//!   └──────────────┘                    └────────────────┘
//!        ^                  flush (mpsc)   ^      │
//!        │ DeliveryPipeline ───────────────┘      │ rejections, lost batches
//!        │                shutdown (token)        v
//!                                            local sink
//! ```
//!
//! A single worker owns delivery and keeps one batch in flight at a time, so
//! events reach the backend in the order they were accepted. A batch that
//! fails stays at the head of the queue and is retried with exponential
//! backoff until it succeeds or exhausts its attempts.
//!
//! # Example
//!
//! ```rust,ignore
//! let pipeline = DeliveryPipeline::start(
//!     PipelineConfig::from(&config),
//!     Arc::new(ElasticsearchClient::new(&config)?),
//!     Arc::new(ConsoleSink::stdout()),
//!     enricher.clone(),
//! )?;
//!
//! pipeline.enqueue(enricher.enrich(Level::Info, "started", Fields::new()));
//! pipeline.flush(Duration::from_secs(2)).await;
//! let report = pipeline.shutdown(Duration::from_secs(5)).await;
//! ```

mod queue;
pub mod retry;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::config::{Config, OverflowPolicy};
use crate::enricher::Enricher;
use crate::error::LogshipError;
use crate::event::Event;
use crate::sink::LocalSink;

pub use queue::PipelineStats;
pub use retry::RetryPolicy;
pub use worker::DeliveryWorker;

use queue::Shared;

/// Pending flush requests; further requests are coalesced.
const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Extra time `shutdown` waits past the drain deadline for the worker to
/// publish its report.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Why `enqueue` refused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    QueueFull,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnqueueResult {
    Accepted,
    Dropped(DropReason),
}

impl EnqueueResult {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, EnqueueResult::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushResult {
    /// Every event accepted before the call has been resolved.
    Flushed,
    TimedOut,
    /// The pipeline shut down before the flush completed.
    Stopped,
}

/// Outcome of [`DeliveryPipeline::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Events dropped because the drain deadline passed before delivery.
    pub discarded: u64,
    /// The drain deadline passed with events still queued.
    pub timed_out: bool,
    /// Counters at the moment the worker stopped.
    pub stats: PipelineStats,
}

/// Delivery pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_linger: Duration,
    pub overflow_policy: OverflowPolicy,
    pub request_timeout: Duration,
    /// Drain budget used when every handle is dropped without a shutdown.
    pub drain_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            batch_linger: config.batch_linger,
            overflow_policy: config.overflow_policy,
            request_timeout: config.request_timeout,
            drain_timeout: config.drain_timeout,
            retry: RetryPolicy::from(config),
        }
    }
}

/// Messages from pipeline handles to the worker.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Control {
    /// Deliver everything queued when the worker receives this, without
    /// waiting for the batch linger or a pending backoff.
    Flush,
}

/// Producer-side handle to a delivery pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeliveryPipeline {
    shared: Arc<Shared>,
    control: mpsc::Sender<Control>,
    shutdown: CancellationToken,
}

impl DeliveryPipeline {
    /// Creates a pipeline and the worker that delivers its events.
    ///
    /// Nothing is delivered until [`DeliveryWorker::run`] is polled; events
    /// accepted before that simply wait in the queue.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn BackendClient>,
        sink: Arc<dyn LocalSink>,
        enricher: Enricher,
    ) -> (Self, DeliveryWorker) {
        let capacity = config.queue_capacity.max(1);
        let batch_size = config.batch_size.clamp(1, capacity);
        let shared = Arc::new(Shared::new(
            capacity,
            batch_size,
            config.overflow_policy,
        ));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let worker = DeliveryWorker::new(
            PipelineConfig {
                queue_capacity: capacity,
                batch_size,
                ..config
            },
            Arc::clone(&shared),
            control_rx,
            shutdown.clone(),
            backend,
            sink,
            enricher,
        );

        (
            Self {
                shared,
                control: control_tx,
                shutdown,
            },
            worker,
        )
    }

    /// Creates a pipeline and spawns its worker on the current tokio runtime.
    pub fn start(
        config: PipelineConfig,
        backend: Arc<dyn BackendClient>,
        sink: Arc<dyn LocalSink>,
        enricher: Enricher,
    ) -> Result<Self, LogshipError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LogshipError::NoRuntime)?;
        let (pipeline, worker) = Self::new(config, backend, sink, enricher);
        runtime.spawn(worker.run());
        Ok(pipeline)
    }

    /// Queues an event for delivery.
    ///
    /// Never waits on the backend. Only blocks when the queue is full and the
    /// overflow policy is [`OverflowPolicy::BlockWithTimeout`], and then for
    /// at most the configured timeout.
    pub fn enqueue(&self, event: Event) -> EnqueueResult {
        self.shared.push(event)
    }

    /// Asks the worker to deliver everything queued so far without waiting
    /// for the batch linger. Does not wait for the result.
    pub fn request_flush(&self) {
        self.send_flush();
    }

    /// Delivers every event accepted before this call, waiting at most
    /// `timeout`.
    ///
    /// Pending backoff is cut short so the batch at the head of the queue is
    /// attempted immediately; its attempt count is not reset.
    pub async fn flush(&self, timeout: Duration) -> FlushResult {
        let (up_to, closed) = {
            let state = self.shared.lock();
            (state.last_seq(), state.closed)
        };
        let mut frontier = self.shared.subscribe_frontier();
        if *frontier.borrow_and_update() >= up_to {
            return FlushResult::Flushed;
        }
        if closed || self.shutdown.is_cancelled() {
            return FlushResult::Stopped;
        }

        self.send_flush();

        let wait = async {
            loop {
                tokio::select! {
                    changed = frontier.changed() => {
                        if changed.is_err() {
                            return FlushResult::Stopped;
                        }
                        if *frontier.borrow_and_update() >= up_to {
                            return FlushResult::Flushed;
                        }
                    }
                    () = self.shutdown.cancelled() => {
                        return if *frontier.borrow() >= up_to {
                            FlushResult::Flushed
                        } else {
                            FlushResult::Stopped
                        };
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                debug!("PIPELINE | Flush timed out after {} ms", timeout.as_millis());
                FlushResult::TimedOut
            }
        }
    }

    fn send_flush(&self) {
        if let Err(e) = self.control.try_send(Control::Flush) {
            // A full channel already carries a flush that the worker will
            // extend to everything queued.
            debug!("PIPELINE | Flush request not sent: {}", e);
        }
    }

    /// Stops accepting events, drains the queue for at most `drain_timeout`
    /// and stops the worker.
    ///
    /// Events still queued at the deadline are discarded and counted. Calling
    /// this again returns the first report.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        let mut report = self.shared.report.subscribe();
        if let Some(done) = *report.borrow_and_update() {
            return done;
        }

        let deadline = Instant::now() + drain_timeout;
        if self.shared.close(deadline) {
            info!(
                "PIPELINE | Shutting down, draining {} queued events for up to {} ms",
                self.shared.stats().queued,
                drain_timeout.as_millis()
            );
            self.shutdown.cancel();
        }

        let wait = report.wait_for(Option::is_some);
        let grace = deadline.saturating_duration_since(Instant::now()) + SHUTDOWN_GRACE;
        match tokio::time::timeout(grace, wait).await {
            Ok(Ok(done)) => {
                if let Some(done) = *done {
                    return done;
                }
            }
            Ok(Err(_)) | Err(_) => {}
        }

        // The worker never ran or did not stop in time.
        warn!("PIPELINE | Delivery worker did not stop before the drain deadline");
        let discarded = self.shared.discard_pending();
        queue::Counters::add(&self.shared.counters.discarded, discarded);
        let fallback = ShutdownReport {
            discarded: discarded as u64,
            timed_out: true,
            stats: self.shared.stats(),
        };
        let mut first = fallback;
        self.shared.report.send_if_modified(|current| match current {
            Some(existing) => {
                first = *existing;
                false
            }
            None => {
                *current = Some(fallback);
                true
            }
        });
        first
    }

    /// Snapshot of the pipeline's counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    /// True once `shutdown` has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
