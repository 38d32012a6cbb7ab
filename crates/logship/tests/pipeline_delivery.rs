// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery behavior of the pipeline against a scripted backend: ordering,
//! partial failures, retries and bounded loss.

mod common;

use std::time::Duration;

use common::helpers::{enricher, events, ids, messages, pipeline, pipeline_config};
use common::mocks::{Reply, ScriptedBackend};
use logship::{
    BackendError, DocumentOutcome, DropReason, EnqueueResult, FlushResult, Level, OverflowPolicy,
    PipelineConfig, RetryPolicy,
};

const WAIT: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_every_accepted_event_is_indexed() {
    let backend = ScriptedBackend::scripted([
        Reply::Fail(BackendError::Unreachable("connection refused".to_string())),
        Reply::Fail(BackendError::Timeout),
    ]);
    let (pipeline, worker, _sink) = pipeline(pipeline_config(), &backend);
    tokio::spawn(worker.run());

    let sent = events(&enricher(), 25);
    for event in sent.clone() {
        assert_eq!(pipeline.enqueue(event), EnqueueResult::Accepted);
    }

    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);
    assert_eq!(ids(&backend.documents()), ids(&sent));

    let stats = pipeline.stats();
    assert_eq!(stats.accepted, 25);
    assert_eq!(stats.indexed, 25);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.lost, 0);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_survives_retries() {
    let backend = ScriptedBackend::scripted([
        Reply::Indexed,
        Reply::Fail(BackendError::Unavailable {
            status: 503,
            body: "unavailable".to_string(),
        }),
        Reply::Outcomes(vec![
            DocumentOutcome::Indexed,
            DocumentOutcome::Unknown,
            DocumentOutcome::Indexed,
            DocumentOutcome::Unknown,
        ]),
    ]);
    let config = PipelineConfig {
        batch_size: 4,
        ..pipeline_config()
    };
    let (pipeline, worker, _sink) = pipeline(config, &backend);
    tokio::spawn(worker.run());

    let sent = events(&enricher(), 12);
    for event in sent.clone() {
        pipeline.enqueue(event);
    }
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    let calls = backend.calls();
    assert_eq!(messages(&calls[0]), ["event 0", "event 1", "event 2", "event 3"]);
    // Failed batch goes again, whole, before anything newer.
    assert_eq!(messages(&calls[1]), ["event 4", "event 5", "event 6", "event 7"]);
    assert_eq!(messages(&calls[2]), ["event 4", "event 5", "event 6", "event 7"]);
    // Only the unacknowledged documents are resent.
    assert_eq!(messages(&calls[3]), ["event 5", "event 7"]);
    assert_eq!(messages(&calls[4]), ["event 8", "event 9", "event 10", "event 11"]);
    assert_eq!(calls.len(), 5);

    assert_eq!(backend.documents().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_drop_newest_keeps_the_first_events() {
    let backend = ScriptedBackend::new();
    let config = PipelineConfig {
        queue_capacity: 2,
        batch_size: 2,
        ..pipeline_config()
    };
    let (pipeline, worker, _sink) = pipeline(config, &backend);

    let [a, b, c]: [_; 3] = events(&enricher(), 3).try_into().unwrap();
    assert_eq!(pipeline.enqueue(a), EnqueueResult::Accepted);
    assert_eq!(pipeline.enqueue(b), EnqueueResult::Accepted);
    assert_eq!(
        pipeline.enqueue(c),
        EnqueueResult::Dropped(DropReason::QueueFull)
    );

    tokio::spawn(worker.run());
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    assert_eq!(backend.messages(), ["event 0", "event 1"]);
    let stats = pipeline.stats();
    assert_eq!(stats.dropped_queue_full, 1);
    assert_eq!(stats.indexed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_oldest_evicts_pending_events() {
    let backend = ScriptedBackend::new();
    let config = PipelineConfig {
        queue_capacity: 2,
        batch_size: 2,
        overflow_policy: OverflowPolicy::DropOldest,
        ..pipeline_config()
    };
    let (pipeline, worker, _sink) = pipeline(config, &backend);

    for event in events(&enricher(), 3) {
        assert!(pipeline.enqueue(event).is_accepted());
    }

    tokio::spawn(worker.run());
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    assert_eq!(backend.messages(), ["event 1", "event 2"]);
    assert_eq!(pipeline.stats().evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_document_is_not_retried() {
    let backend = ScriptedBackend::scripted([Reply::Outcomes(vec![
        DocumentOutcome::Indexed,
        DocumentOutcome::Rejected("mapper_parsing_exception: failed to parse".to_string()),
        DocumentOutcome::Indexed,
    ])]);
    let config = PipelineConfig {
        batch_size: 3,
        ..pipeline_config()
    };
    let (pipeline, worker, sink) = pipeline(config, &backend);
    tokio::spawn(worker.run());

    let sent = events(&enricher(), 3);
    let rejected_id = sent[1].event_id().to_string();
    for event in sent {
        pipeline.enqueue(event);
    }
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    assert_eq!(backend.call_count(), 1);
    assert_eq!(backend.messages(), ["event 0", "event 2"]);

    let stats = pipeline.stats();
    assert_eq!(stats.indexed, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.retries, 0);

    let notices = sink.at_level(Level::Warn);
    assert_eq!(notices.len(), 1);
    let fields = notices[0].fields();
    assert_eq!(
        fields.get("rejected_event_id").and_then(|v| v.as_str()),
        Some(rejected_id.as_str())
    );
    assert_eq!(
        fields.get("reason").and_then(|v| v.as_str()),
        Some("mapper_parsing_exception: failed to parse")
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_gaps_follow_backoff_schedule() {
    let failure = || Reply::Fail(BackendError::Unreachable("connection refused".to_string()));
    let backend = ScriptedBackend::scripted((0..5).map(|_| failure()));
    let config = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.2,
        },
        ..pipeline_config()
    };
    let (pipeline, worker, _sink) = pipeline(config, &backend);
    tokio::spawn(worker.run());

    pipeline.enqueue(events(&enricher(), 1).remove(0));
    tokio::time::sleep(Duration::from_secs(10)).await;

    let times = backend.attempt_times();
    assert_eq!(times.len(), 5);
    assert_eq!(pipeline.stats().lost, 1);

    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let nominal = [100, 200, 400, 800].map(Duration::from_millis);
    for (gap, nominal) in gaps.iter().zip(nominal) {
        // The paused clock fires timers on millisecond boundaries.
        let low = nominal.mul_f64(0.8);
        let high = nominal.mul_f64(1.2) + Duration::from_millis(1);
        assert!(
            *gap >= low && *gap <= high,
            "gap {gap:?} outside {low:?}..={high:?}"
        );
    }
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "gaps {gaps:?}");
}

#[tokio::test(start_paused = true)]
async fn test_batch_is_lost_after_max_attempts() {
    let failure = || Reply::Fail(BackendError::Unreachable("connection refused".to_string()));
    let backend = ScriptedBackend::scripted((0..5).map(|_| failure()));
    let config = PipelineConfig {
        batch_size: 4,
        retry: RetryPolicy {
            max_attempts: 3,
            ..pipeline_config().retry
        },
        ..pipeline_config()
    };
    let (pipeline, worker, sink) = pipeline(config, &backend);
    tokio::spawn(worker.run());

    let sent = events(&enricher(), 4);
    let first_id = sent[0].event_id().to_string();
    for event in sent {
        pipeline.enqueue(event);
    }
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    assert_eq!(backend.call_count(), 3);
    assert!(backend.documents().is_empty());

    let stats = pipeline.stats();
    assert_eq!(stats.lost, 4);
    assert_eq!(stats.lost_batches, 1);
    assert_eq!(stats.batches_sent, 3);
    assert_eq!(stats.retries, 2);

    let notices = sink.at_level(Level::Error);
    assert_eq!(notices.len(), 1);
    let fields = notices[0].fields();
    assert_eq!(fields.get("lost_events").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(fields.get("attempts").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        fields.get("first_event_id").and_then(|v| v.as_str()),
        Some(first_id.as_str())
    );

    // The pipeline keeps going with the remaining scripted failures, then
    // recovers.
    pipeline.enqueue(events(&enricher(), 1).remove(0));
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);
    assert_eq!(backend.documents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_redelivery_keeps_event_ids() {
    let backend = ScriptedBackend::scripted([Reply::StoreThenFail(BackendError::Timeout)]);
    let (pipeline, worker, _sink) = pipeline(pipeline_config(), &backend);
    tokio::spawn(worker.run());

    let sent = events(&enricher(), 3);
    for event in sent.clone() {
        pipeline.enqueue(event);
    }
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(ids(&calls[0]), ids(&calls[1]));
    assert_eq!(ids(&backend.documents()), ids(&sent));
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_counts_as_failed_attempt() {
    let backend = ScriptedBackend::scripted([Reply::Hang]);
    let (pipeline, worker, _sink) = pipeline(pipeline_config(), &backend);
    tokio::spawn(worker.run());

    pipeline.enqueue(events(&enricher(), 1).remove(0));
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    assert_eq!(backend.call_count(), 2);
    assert_eq!(pipeline.stats().retries, 1);
    assert_eq!(pipeline.stats().indexed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_outcomes_are_retried() {
    let backend = ScriptedBackend::scripted([Reply::Outcomes(vec![DocumentOutcome::Indexed])]);
    let (pipeline, worker, _sink) = pipeline(pipeline_config(), &backend);
    tokio::spawn(worker.run());

    for event in events(&enricher(), 3) {
        pipeline.enqueue(event);
    }
    assert_eq!(pipeline.flush(WAIT).await, FlushResult::Flushed);

    let calls = backend.calls();
    assert_eq!(messages(&calls[1]), ["event 1", "event 2"]);
    assert_eq!(backend.messages(), ["event 0", "event 1", "event 2"]);
}
