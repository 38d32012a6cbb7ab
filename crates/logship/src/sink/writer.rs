// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::error::LogshipError;
use crate::event::{Event, Level};
use crate::sink::LocalSink;

/// Writes each event as one JSON line to any [`Write`] implementation.
///
/// The writer is flushed after every line so that a crash loses at most the
/// line being written.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    min_level: Level,
    failures: AtomicU64,
    name: &'static str,
}

/// JSON lines on standard output.
pub type ConsoleSink = WriterSink<io::Stdout>;

/// JSON lines appended to a file.
pub type FileSink = WriterSink<BufWriter<File>>;

impl<W: Write> WriterSink<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self::named(writer, "writer")
    }

    fn named(writer: W, name: &'static str) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level: Level::Debug,
            failures: AtomicU64::new(0),
            name,
        }
    }

    /// Events below `level` are skipped.
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    #[must_use]
    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Consumes the sink and returns the underlying writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_line(&self, event: &Event) -> io::Result<()> {
        let mut line = event.to_json().map_err(io::Error::from)?;
        line.push('\n');

        // A panic while holding the lock leaves the writer usable; the worst
        // case is a partial line.
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

impl ConsoleSink {
    #[must_use]
    pub fn stdout() -> Self {
        Self::named(io::stdout(), "console")
    }
}

impl FileSink {
    /// Opens `path` for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogshipError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogshipError::LogFile {
                path: PathBuf::from(path),
                source,
            })?;
        Ok(Self::named(BufWriter::new(file), "file"))
    }
}

impl<W: Write + Send> LocalSink for WriterSink<W> {
    fn emit(&self, event: &Event) {
        if event.level() < self.min_level {
            return;
        }
        if let Err(e) = self.write_line(event) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            debug!(
                "LOGSHIP | Failed to write event {} to {} sink: {}",
                event.event_id(),
                self.name,
                e
            );
        }
    }

    fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl<W> fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
