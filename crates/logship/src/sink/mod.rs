// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local sinks: immediate, best-effort output of every enriched event.
//!
//! A sink writes one JSON document per line, using the same layout the
//! backend receives. Sinks never return errors and never panic; a failed
//! write bumps the sink's [`failures`](LocalSink::failures) counter and is
//! reported through `tracing` at debug level.

mod writer;

use std::fmt::Debug;
use std::sync::Arc;

use crate::event::{Event, Level};

pub use writer::{ConsoleSink, FileSink, WriterSink};

/// Destination for events that must be visible locally, independently of
/// backend delivery.
pub trait LocalSink: Send + Sync + Debug {
    /// Writes one event. Must not block for long and must not fail.
    fn emit(&self, event: &Event);

    /// Number of writes that failed since the sink was created.
    fn failures(&self) -> u64 {
        0
    }
}

impl<T: LocalSink + ?Sized> LocalSink for Arc<T> {
    fn emit(&self, event: &Event) {
        (**self).emit(event);
    }

    fn failures(&self) -> u64 {
        (**self).failures()
    }
}

impl<T: LocalSink + ?Sized> LocalSink for Box<T> {
    fn emit(&self, event: &Event) {
        (**self).emit(event);
    }

    fn failures(&self) -> u64 {
        (**self).failures()
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LocalSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Forwards each event to every inner sink, in order.
#[derive(Debug)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn LocalSink>>,
    min_level: Level,
}

impl Default for FanoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            min_level: Level::Debug,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl LocalSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn LocalSink>) {
        self.sinks.push(sink);
    }

    /// Events below `level` are not forwarded to any inner sink.
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LocalSink for FanoutSink {
    fn emit(&self, event: &Event) {
        if event.level() < self.min_level {
            return;
        }
        for sink in &self.sinks {
            sink.emit(event);
        }
    }

    fn failures(&self) -> u64 {
        self.sinks.iter().map(|s| s.failures()).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::enricher::{Enricher, Identity};
    use crate::event::Fields;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        messages: Mutex<Vec<String>>,
    }

    impl LocalSink for Recording {
        fn emit(&self, event: &Event) {
            self.messages
                .lock()
                .unwrap()
                .push(event.message().to_string());
        }

        fn failures(&self) -> u64 {
            2
        }
    }

    fn event(level: Level, message: &str) -> Event {
        Enricher::new(Identity::new("svc", "test", "0.1.0", "host", 1)).enrich(
            level,
            message,
            Fields::new(),
        )
    }

    #[test]
    fn test_fanout_forwards_to_all() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let fanout = FanoutSink::new()
            .with_sink(Arc::clone(&first))
            .with_sink(Arc::clone(&second));

        fanout.emit(&event(Level::Info, "hello"));

        assert_eq!(*first.messages.lock().unwrap(), vec!["hello"]);
        assert_eq!(*second.messages.lock().unwrap(), vec!["hello"]);
        assert_eq!(fanout.failures(), 4);
    }

    #[test]
    fn test_fanout_min_level() {
        let inner = Arc::new(Recording::default());
        let fanout = FanoutSink::new()
            .with_sink(Arc::clone(&inner))
            .with_min_level(Level::Warn);

        fanout.emit(&event(Level::Info, "quiet"));
        fanout.emit(&event(Level::Error, "loud"));

        assert_eq!(*inner.messages.lock().unwrap(), vec!["loud"]);
    }

    #[test]
    fn test_null_sink_never_fails() {
        let sink = NullSink;
        sink.emit(&event(Level::Critical, "ignored"));
        assert_eq!(sink.failures(), 0);
    }
}
