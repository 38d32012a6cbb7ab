// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Application-facing logger.
//!
//! A [`Logger`] enriches every call, writes it to the local sink right away
//! and, when the level is eligible for shipping, queues it for delivery.
//! Logging calls never block on the backend and never fail.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{BackendClient, ElasticsearchClient};
use crate::config::Config;
use crate::enricher::{Enricher, Identity};
use crate::error::LogshipError;
use crate::event::{Fields, Level, Value};
use crate::pipeline::{
    DeliveryPipeline, EnqueueResult, FlushResult, PipelineConfig, PipelineStats, ShutdownReport,
};
use crate::sink::{ConsoleSink, FanoutSink, FileSink, LocalSink};

/// Structured logger shipping to a search backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Logger {
    enricher: Enricher,
    sink: Arc<dyn LocalSink>,
    pipeline: DeliveryPipeline,
    ship_min_level: Level,
    flush_on_critical: bool,
    drain_timeout: Duration,
}

impl Logger {
    /// Builds a logger shipping to the Elasticsearch endpoint in `config`.
    ///
    /// Must be called inside a tokio runtime. When
    /// `create_index_template` is set the template is installed first; a
    /// failure there is logged and does not prevent startup.
    pub async fn start(config: &Config) -> Result<Self, LogshipError> {
        config.validate()?;
        let client = ElasticsearchClient::new(config)?;

        if config.create_index_template {
            match client.ensure_index_template().await {
                Ok(()) => debug!("LOGSHIP | Index template ready on {}", client.endpoint()),
                Err(e) => warn!(
                    "LOGSHIP | Failed to install index template on {}: {}",
                    client.endpoint(),
                    e
                ),
            }
        }

        let sink = local_sink(config)?;
        Self::with_backend(config, Arc::new(client), Arc::new(sink))
    }

    /// Builds a logger around any backend and local sink.
    pub fn with_backend(
        config: &Config,
        backend: Arc<dyn BackendClient>,
        sink: Arc<dyn LocalSink>,
    ) -> Result<Self, LogshipError> {
        config.validate()?;
        let enricher = Enricher::new(identity(config));
        let pipeline = DeliveryPipeline::start(
            PipelineConfig::from(config),
            backend,
            Arc::clone(&sink),
            enricher.clone(),
        )?;

        debug!(
            "LOGSHIP | Logger started for {} ({}), shipping {} and above",
            config.service_name, config.environment, config.ship_min_level
        );

        Ok(Self {
            enricher,
            sink,
            pipeline,
            ship_min_level: config.ship_min_level,
            flush_on_critical: config.flush_on_critical,
            drain_timeout: config.drain_timeout,
        })
    }

    /// Logs one event.
    ///
    /// Returns what the pipeline did with it, or `None` when the level is
    /// below the shipping threshold and the event only went to the local
    /// sink.
    pub fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: Fields,
    ) -> Option<EnqueueResult> {
        let event = self.enricher.enrich(level, message, fields);
        self.sink.emit(&event);

        if level < self.ship_min_level {
            return None;
        }
        let result = self.pipeline.enqueue(event);
        if level == Level::Critical && self.flush_on_critical {
            self.pipeline.request_flush();
        }
        Some(result)
    }

    pub fn debug(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Error, message, fields);
    }

    pub fn critical(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Critical, message, fields);
    }

    /// Logs an error event describing `error` under the `error` field:
    /// its message, type and, when present, the chain of causes.
    pub fn error_with<E>(&self, message: impl Into<String>, error: &E, fields: Fields)
    where
        E: std::error::Error + ?Sized,
    {
        let mut details = Fields::new()
            .with("message", error.to_string())
            .with("type", short_type_name::<E>());

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        if !causes.is_empty() {
            details.insert("causes", Value::from_serialize(&causes));
        }

        self.error(message, merge(Fields::new().with("error", details), fields));
    }

    /// Logs how long an operation took.
    pub fn performance(&self, operation: &str, duration_ms: u64, fields: Fields) {
        let base = Fields::new()
            .with("operation", operation)
            .with("duration_ms", duration_ms)
            .with("log_type", "performance");
        self.info(format!("Performance: {operation}"), merge(base, fields));
    }

    /// Logs a business event with its payload.
    pub fn business(&self, event: &str, data: Fields, fields: Fields) {
        let base = Fields::new()
            .with("event", event)
            .with("data", data)
            .with("log_type", "business");
        self.info(format!("Business: {event}"), merge(base, fields));
    }

    /// Logs a security-relevant event at warn level.
    pub fn security(&self, event: &str, details: Fields, fields: Fields) {
        let base = Fields::new()
            .with("event", event)
            .with("details", details)
            .with("log_type", "security");
        self.warn(format!("Security: {event}"), merge(base, fields));
    }

    /// Logs who did what to which resource.
    pub fn audit(&self, action: &str, resource: &str, user_id: &str, fields: Fields) {
        let base = Fields::new()
            .with("action", action)
            .with("resource", resource)
            .with("user_id", user_id)
            .with("log_type", "audit");
        self.info(format!("Audit: {action} on {resource}"), merge(base, fields));
    }

    /// Delivers everything logged so far, waiting at most `timeout`.
    pub async fn flush(&self, timeout: Duration) -> FlushResult {
        self.pipeline.flush(timeout).await
    }

    /// Drains the pipeline within the configured drain timeout and stops it.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.pipeline.shutdown(self.drain_timeout).await
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Failed local sink writes since startup.
    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.sink.failures()
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.enricher.identity()
    }

    #[must_use]
    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }
}

/// Identity for `config`, detecting the hostname unless it is overridden.
#[must_use]
pub fn identity(config: &Config) -> Identity {
    match &config.hostname {
        Some(hostname) => Identity::new(
            &config.service_name,
            &config.environment,
            &config.version,
            hostname,
            std::process::id(),
        ),
        None => Identity::detect(&config.service_name, &config.environment, &config.version),
    }
}

/// Local sink described by `config`: the console and an optional file.
pub fn local_sink(config: &Config) -> Result<FanoutSink, LogshipError> {
    let mut sink = FanoutSink::new();
    if config.console_enabled {
        sink.push(Box::new(
            ConsoleSink::stdout().with_min_level(config.console_min_level),
        ));
    }
    if let Some(path) = &config.log_file {
        sink.push(Box::new(FileSink::open(path)?));
    }
    Ok(sink)
}

/// Adds caller fields after `base`; keys already in `base` are kept.
fn merge(mut base: Fields, extra: Fields) -> Fields {
    for (key, value) in extra {
        if !base.contains_key(&key) {
            base.insert(key, value);
        }
    }
    base
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}
