// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logship
//!
//! Structured logging that enriches application events, prints them locally
//! and ships them reliably to an Elasticsearch-compatible document store.
//!
//! ## Overview
//!
//! - **Event model**: immutable [`Event`] records with typed [`Fields`]
//! - **Enrichment**: service identity, timestamp and a unique `event_id`
//! - **Local sinks**: JSON lines on the console and/or a file
//! - **Delivery**: bounded queue, batching, retries with exponential backoff,
//!   flush and drain-on-shutdown
//! - **Backend**: the Elasticsearch `_bulk` API with daily indices
//!
//! ## Architecture
//!
//! - [`logger`]: application-facing [`Logger`]
//! - [`enricher`]: turns log calls into [`Event`]s
//! - [`sink`]: local, best-effort output
//! - [`pipeline`]: buffering and the background delivery worker
//! - [`backend`]: the [`BackendClient`] seam and its Elasticsearch adapter
//! - [`config`]: settings, read from the environment
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let logger = Logger::start(&config).await?;
//!
//! logger.info("Application started", fields! { "port" => 3000 });
//! logger.performance("database_query", 150, fields! { "table" => "users" });
//!
//! let report = logger.shutdown().await;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod enricher;
pub mod error;
pub mod event;
pub mod hostname;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod sink;

pub use backend::{BackendClient, BackendError, BatchResult, DocumentOutcome, ElasticsearchClient};
pub use config::{Config, OverflowPolicy};
pub use enricher::{Enricher, Identity};
pub use error::LogshipError;
pub use event::{Event, Fields, Level, Value};
pub use logger::Logger;
pub use pipeline::{
    DeliveryPipeline, DeliveryWorker, DropReason, EnqueueResult, FlushResult, PipelineConfig,
    PipelineStats, RetryPolicy, ShutdownReport,
};
pub use sink::{ConsoleSink, FanoutSink, FileSink, LocalSink, NullSink, WriterSink};
