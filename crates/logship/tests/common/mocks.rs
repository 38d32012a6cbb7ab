// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock backend and sink implementations for testing

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use logship::{BackendClient, BackendError, BatchResult, DocumentOutcome, Event, Level, LocalSink};

/// What the scripted backend answers to one `send` call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Every document is indexed.
    Indexed,
    /// One outcome per document, in batch order.
    Outcomes(Vec<DocumentOutcome>),
    /// The whole request fails and nothing is stored.
    Fail(BackendError),
    /// Documents are stored but the response is lost.
    StoreThenFail(BackendError),
    /// Never answers.
    Hang,
}

/// Backend that answers from a script and then indexes everything.
///
/// Stored documents are keyed by `event_id`, the same way the search backend
/// deduplicates re-delivered documents.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Vec<Event>>>,
    attempt_times: Mutex<Vec<Instant>>,
    documents: Mutex<Vec<Event>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let backend = Self::default();
        backend.script.lock().unwrap().extend(replies);
        Arc::new(backend)
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// Every batch received, in order.
    pub fn calls(&self) -> Vec<Vec<Event>> {
        self.calls.lock().unwrap().clone()
    }

    /// When each `send` call arrived.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Unique documents stored, in the order they were first indexed.
    pub fn documents(&self) -> Vec<Event> {
        self.documents.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.documents()
            .iter()
            .map(|event| event.message().to_string())
            .collect()
    }

    fn store<'a>(&self, events: impl IntoIterator<Item = &'a Event>) {
        let mut documents = self.documents.lock().unwrap();
        for event in events {
            if !documents.iter().any(|d| d.event_id() == event.event_id()) {
                documents.push(event.clone());
            }
        }
    }
}

#[async_trait::async_trait]
impl BackendClient for ScriptedBackend {
    async fn send(&self, batch: &[Event]) -> Result<BatchResult, BackendError> {
        self.attempt_times.lock().unwrap().push(Instant::now());
        self.calls.lock().unwrap().push(batch.to_vec());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Indexed);

        match reply {
            Reply::Indexed => {
                self.store(batch);
                Ok(BatchResult::all_indexed(batch.len()))
            }
            Reply::Outcomes(outcomes) => {
                self.store(
                    batch
                        .iter()
                        .zip(&outcomes)
                        .filter(|(_, outcome)| outcome.is_indexed())
                        .map(|(event, _)| event),
                );
                Ok(BatchResult::new(outcomes))
            }
            Reply::Fail(error) => Err(error),
            Reply::StoreThenFail(error) => {
                self.store(batch);
                Err(error)
            }
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Sink that keeps every event it is given.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<Event>>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.level() == level)
            .collect()
    }
}

impl LocalSink for CapturingSink {
    fn emit(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}
