// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! What the pipeline does when a producer enqueues into a full queue.
//!
//! # Supported Formats
//!
//! - `"drop_newest"` → reject the incoming event (default)
//! - `"drop_oldest"` → evict the oldest pending event to make room
//! - `"block,250"` → wait up to 250 ms for room, then reject
//!
//! Deserialization is lenient: anything else falls back to
//! [`OverflowPolicy::DropNewest`] with a logged error.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Reject the incoming event and count it.
    #[default]
    DropNewest,
    /// Evict the oldest event that is not already being delivered.
    DropOldest,
    /// Block the producer for at most the given duration.
    BlockWithTimeout(Duration),
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let mut split_value = normalized.split(',');

        let policy = split_value.next().map(str::trim);
        let timeout_ms: Option<u64> = split_value.next().and_then(|v| v.trim().parse().ok());

        match (policy, timeout_ms) {
            (Some("drop_newest" | "drop-newest" | "newest"), None) => {
                Ok(OverflowPolicy::DropNewest)
            }
            (Some("drop_oldest" | "drop-oldest" | "oldest"), None) => {
                Ok(OverflowPolicy::DropOldest)
            }
            (Some("block"), Some(ms)) => {
                Ok(OverflowPolicy::BlockWithTimeout(Duration::from_millis(ms)))
            }
            (Some("block"), None) => Err(format!(
                "Invalid overflow policy: '{value}'. Blocking requires a timeout, e.g. 'block,250'"
            )),
            _ => Err(format!(
                "Invalid overflow policy: '{value}'. Valid policies are: drop_newest, drop_oldest, block,<ms>"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for OverflowPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match OverflowPolicy::from_str(&value) {
            Ok(policy) => Ok(policy),
            Err(e) => {
                error!("{}, using drop_newest", e);
                Ok(OverflowPolicy::DropNewest)
            }
        }
    }
}
