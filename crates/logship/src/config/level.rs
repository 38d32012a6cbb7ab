// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parsing of event levels from configuration.
//!
//! Levels are accepted case-insensitively. A few aliases used by common
//! logging libraries are understood as well:
//!
//! | Input                  | Level      |
//! |------------------------|------------|
//! | `debug`, `trace`       | `Debug`    |
//! | `info`                 | `Info`     |
//! | `warn`, `warning`      | `Warn`     |
//! | `error`                | `Error`    |
//! | `critical`, `fatal`    | `Critical` |

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

use crate::event::Level;

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            _ => Err(format!(
                "Invalid level: '{s}'. Valid levels are: debug, info, warn, error, critical",
            )),
        }
    }
}

/// Lenient deserialization: an unknown level logs an error and falls back to
/// `Info` so a typo in a config file cannot prevent startup.
impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match Level::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(Level::Info)
                }
            }
        } else {
            error!("Expected a string for level, got {:?}", value);
            Ok(Level::Info)
        }
    }
}
