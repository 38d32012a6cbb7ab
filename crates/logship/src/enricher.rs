// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns raw log calls into canonical [`Event`]s.
//!
//! The enricher stamps every call with the process identity, the current UTC
//! time and a fresh random `event_id`. It never fails: caller fields that
//! collide with a reserved name are dropped (the reserved value wins) and
//! values JSON cannot carry are coerced to strings.

use std::sync::Arc;

use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use crate::event::{is_reserved, Event, Fields, Level};
use crate::hostname::get_hostname;

/// Process-wide identity shared by every event of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub service: String,
    pub environment: String,
    pub version: String,
    pub hostname: String,
    pub pid: u32,
}

impl Identity {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        environment: impl Into<String>,
        version: impl Into<String>,
        hostname: impl Into<String>,
        pid: u32,
    ) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
            version: version.into(),
            hostname: hostname.into(),
            pid,
        }
    }

    /// Builds an identity for the current process, detecting the hostname and
    /// pid.
    #[must_use]
    pub fn detect(
        service: impl Into<String>,
        environment: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::new(
            service,
            environment,
            version,
            get_hostname(),
            std::process::id(),
        )
    }
}

/// Stamps raw log calls with identity, time and id.
///
/// Cheap to clone; the identity is shared.
#[derive(Debug, Clone)]
pub struct Enricher {
    identity: Arc<Identity>,
}

impl Enricher {
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Produces a sealed event from one log call.
    pub fn enrich(&self, level: Level, message: impl Into<String>, fields: Fields) -> Event {
        let mut fields = fields.coerced();
        fields.retain(|key, _| {
            let reserved = is_reserved(key);
            if reserved {
                trace!("LOGSHIP | Dropping caller field '{key}': name is reserved");
            }
            !reserved
        });

        Event {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            service: self.identity.service.clone(),
            environment: self.identity.environment.clone(),
            version: self.identity.version.clone(),
            hostname: self.identity.hostname.clone(),
            pid: self.identity.pid,
            event_id: Uuid::new_v4(),
            fields,
        }
    }
}
