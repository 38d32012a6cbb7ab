// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection for event identity.

use std::env;
use tracing::warn;

/// Name used when every detection method fails.
pub const UNKNOWN_HOSTNAME: &str = "unknown";

/// Get the hostname stamped on every event.
///
/// Resolution order:
/// 1. `LOGSHIP_HOSTNAME` environment variable
/// 2. `HOSTNAME` environment variable (set in most containers)
/// 3. `gethostname()`
/// 4. `"unknown"`
#[must_use]
pub fn get_hostname() -> String {
    resolve_hostname(|key| env::var(key).ok(), system_hostname)
}

fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_str().map(ToString::to_string),
        Err(e) => {
            warn!("LOGSHIP | Failed to get system hostname: {}", e);
            None
        }
    }
}

pub(crate) fn resolve_hostname(
    lookup: impl Fn(&str) -> Option<String>,
    system: impl FnOnce() -> Option<String>,
) -> String {
    for key in ["LOGSHIP_HOSTNAME", "HOSTNAME"] {
        if let Some(hostname) = lookup(key).filter(|h| !h.trim().is_empty()) {
            return hostname.trim().to_string();
        }
    }

    if let Some(hostname) = system().filter(|h| !h.is_empty()) {
        return hostname;
    }

    warn!("LOGSHIP | Could not determine hostname, using '{UNKNOWN_HOSTNAME}'");
    UNKNOWN_HOSTNAME.to_string()
}
