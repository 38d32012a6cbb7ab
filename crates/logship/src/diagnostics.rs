// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Formatting for the pipeline's own diagnostics.
//!
//! logship reports on itself through `tracing`, never through its own
//! pipeline. Applications that already install a subscriber see these lines
//! like any other; [`init`] installs one for programs that don't.
//!
//! # Format
//!
//! ```text
//! LOGSHIP | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! ```text
//! LOGSHIP | WARN | PIPELINE | Delivery of 500 events failed (attempt 1/5): Backend request timed out. Retrying in 512 ms
//! LOGSHIP | ERROR | ELASTICSEARCH | Bulk request refused with HTTP 401: missing authentication credentials
//! ```
//!
//! Lines go to standard error so they never interleave with the JSON event
//! lines a console sink writes to standard output.

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::LogshipError;

/// Event formatter that prefixes every line with `LOGSHIP`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGSHIP | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter used by [`init`]. HTTP stack internals are silenced.
pub fn filter(level: &str) -> Result<EnvFilter, LogshipError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,reqwest=warn,{level}"))
        .map_err(|e| {
            LogshipError::InvalidConfig(format!("Invalid diagnostics level '{level}': {e}"))
        })
}

/// Installs a global `tracing` subscriber that writes diagnostics at `level`
/// and above to standard error.
pub fn init(level: &str) -> Result<(), LogshipError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter(level)?)
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LogshipError::Diagnostics(e.to_string()))
}
