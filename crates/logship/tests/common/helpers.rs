// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use logship::{
    DeliveryPipeline, DeliveryWorker, Enricher, Event, Fields, Identity, Level, OverflowPolicy,
    PipelineConfig, RetryPolicy,
};

use super::mocks::{CapturingSink, ScriptedBackend};

pub fn enricher() -> Enricher {
    Enricher::new(Identity::new("checkout", "test", "1.0.0", "host-a", 4242))
}

/// `n` info events with messages `event 0`, `event 1`, ...
pub fn events(enricher: &Enricher, n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| enricher.enrich(Level::Info, format!("event {i}"), Fields::new().with("i", i)))
        .collect()
}

pub fn messages(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.message().to_string()).collect()
}

pub fn ids(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.event_id().to_string()).collect()
}

/// Small, deterministic settings: no jitter and short delays.
pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        queue_capacity: 100,
        batch_size: 10,
        batch_linger: Duration::from_millis(50),
        overflow_policy: OverflowPolicy::DropNewest,
        request_timeout: Duration::from_secs(1),
        drain_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
            jitter_factor: 0.0,
        },
    }
}

/// Builds a pipeline without starting its worker.
pub fn pipeline(
    config: PipelineConfig,
    backend: &Arc<ScriptedBackend>,
) -> (DeliveryPipeline, DeliveryWorker, Arc<CapturingSink>) {
    let sink = CapturingSink::new();
    let (pipeline, worker) = DeliveryPipeline::new(
        config,
        Arc::clone(backend) as Arc<dyn logship::BackendClient>,
        Arc::clone(&sink) as Arc<dyn logship::LocalSink>,
        enricher(),
    );
    (pipeline, worker, sink)
}
