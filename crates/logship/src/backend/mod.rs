// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backend clients: the remote document store events are shipped to.
//!
//! The delivery pipeline only knows the [`BackendClient`] trait. A client
//! submits one batch and reports either a per-document [`BatchResult`] or a
//! batch-level [`BackendError`]. Every `BackendError` is retryable; permanent
//! failures are expressed per document as [`DocumentOutcome::Rejected`].

pub mod elasticsearch;

use async_trait::async_trait;

use crate::event::Event;

pub use elasticsearch::ElasticsearchClient;

/// What happened to one document of a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Durably accepted by the backend.
    Indexed,
    /// Permanently refused. The reason is reported locally and the document
    /// is never retried.
    Rejected(String),
    /// The backend did not say; the document must be sent again.
    Unknown,
}

impl DocumentOutcome {
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(self, DocumentOutcome::Indexed)
    }
}

/// Per-document outcomes of one submitted batch, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    outcomes: Vec<DocumentOutcome>,
}

impl BatchResult {
    #[must_use]
    pub fn new(outcomes: Vec<DocumentOutcome>) -> Self {
        Self { outcomes }
    }

    /// Every one of `len` documents was indexed.
    #[must_use]
    pub fn all_indexed(len: usize) -> Self {
        Self::new(vec![DocumentOutcome::Indexed; len])
    }

    /// Outcome of the document at `index`.
    ///
    /// A backend that answers with fewer outcomes than documents leaves the
    /// remainder `Unknown`.
    #[must_use]
    pub fn outcome(&self, index: usize) -> DocumentOutcome {
        self.outcomes
            .get(index)
            .cloned()
            .unwrap_or(DocumentOutcome::Unknown)
    }

    #[must_use]
    pub fn outcomes(&self) -> &[DocumentOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl FromIterator<DocumentOutcome> for BatchResult {
    fn from_iter<I: IntoIterator<Item = DocumentOutcome>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Batch-level delivery failure. All variants are retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend request timed out")]
    Timeout,

    #[error("Backend unavailable (HTTP {status}): {body}")]
    Unavailable { status: u16, body: String },
}

/// A remote store that indexes batches of events.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Submits `batch` and reports what happened to each document.
    ///
    /// Documents are identified by [`Event::event_id`]; sending the same
    /// event twice must not create two documents.
    async fn send(&self, batch: &[Event]) -> Result<BatchResult, BackendError>;
}

#[async_trait]
impl<T: BackendClient + ?Sized> BackendClient for std::sync::Arc<T> {
    async fn send(&self, batch: &[Event]) -> Result<BatchResult, BackendError> {
        (**self).send(batch).await
    }
}
