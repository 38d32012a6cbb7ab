// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while setting up a logger or pipeline.
///
/// Once events are flowing nothing is reported through this type; delivery
/// problems are absorbed and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum LogshipError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tokio runtime available to run the delivery worker")]
    NoRuntime,

    #[error("Failed to install diagnostics subscriber: {0}")]
    Diagnostics(String),
}
