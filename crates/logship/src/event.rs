// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical structured log record.
//!
//! An [`Event`] is produced by the [`Enricher`](crate::enricher::Enricher) and
//! never changes afterwards. It is what the local sinks print and what the
//! backend indexes, so both see exactly the same document:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T12:00:00.123456Z",
//!   "level": "INFO",
//!   "message": "Request completed",
//!   "service": "checkout",
//!   "environment": "production",
//!   "version": "1.4.2",
//!   "hostname": "web-01",
//!   "pid": 4242,
//!   "event_id": "0b3c5a8e-7f1d-4d5e-9a51-2f0f3c6d9e11",
//!   "status_code": 200,
//!   "duration_ms": 12.5
//! }
//! ```
//!
//! Caller metadata lives in [`Fields`], an insertion-ordered map of the closed
//! [`Value`] type. Values that JSON cannot represent are coerced to strings
//! instead of failing.

use std::fmt::{self, Debug, Display};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use uuid::Uuid;

/// Field names owned by the event itself. Caller fields with one of these
/// names are dropped at enrichment.
pub const RESERVED_FIELDS: [&str; 9] = [
    "timestamp",
    "level",
    "message",
    "service",
    "environment",
    "version",
    "hostname",
    "pid",
    "event_id",
];

/// Returns true if `key` is one of [`RESERVED_FIELDS`].
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

/// Severity of an event, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl Level {
    /// All levels, least severe first.
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Critical,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl AsRef<str> for Level {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-supplied metadata value.
///
/// The set of variants is closed on purpose so that every event can always be
/// serialized. Conversions from Rust types apply these coercions:
///
/// - non-finite floats (`NaN`, `inf`) become their string form
/// - `u64` values above `i64::MAX` become their decimal string
/// - JSON `null` becomes the string `"null"`, JSON arrays their compact text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Map(Fields),
}

impl Value {
    /// Builds a string value from anything printable.
    pub fn display<T: Display + ?Sized>(value: &T) -> Self {
        Value::String(value.to_string())
    }

    /// Builds a value from any serializable type.
    ///
    /// Falls back to the `Debug` representation when serialization fails, so
    /// this never errors.
    pub fn from_serialize<T: Serialize + Debug + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Value::from(json),
            Err(_) => Value::String(format!("{value:?}")),
        }
    }

    /// Rewrites values that cannot be represented as JSON into strings.
    ///
    /// The variants are public, so a `Value::Float(f64::NAN)` can still be
    /// built by hand; the enricher calls this before an event is sealed.
    #[must_use]
    pub fn coerced(self) -> Self {
        match self {
            Value::Float(f) if !f.is_finite() => Value::String(f.to_string()),
            Value::Map(fields) => Value::Map(fields.coerced()),
            other => other,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! value_from_lossless_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Integer(i64::from(value))
                }
            }
        )*
    };
}

value_from_lossless_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::String(value.to_string()),
        }
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::String(value.to_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value).coerced()
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::from(f64::from(value))
    }
}

impl From<Fields> for Value {
    fn from(value: Fields) -> Self {
        Value::Map(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::String("null".to_string()),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    // serde_json numbers are always finite
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            array @ serde_json::Value::Array(_) => Value::String(array.to_string()),
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Insertion-ordered map of caller metadata.
///
/// Inserting an existing key replaces its value but keeps its original
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a field, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(existing, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Appends every field of `other`, replacing values of keys present in both.
    pub fn extend(&mut self, other: Fields) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn coerced(self) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (k, v.coerced()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Builds [`Fields`] from `key => value` pairs.
///
/// ```
/// use logship::fields;
///
/// let fields = fields! {
///     "port" => 3000,
///     "host" => "localhost",
///     "details" => fields! { "attempts" => 3 },
/// };
/// assert_eq!(fields.len(), 3);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::event::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::event::Fields::new();
        $( fields.insert($key, $value); )+
        fields
    }};
}

/// One enriched, immutable log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) level: Level,
    pub(crate) message: String,
    pub(crate) service: String,
    pub(crate) environment: String,
    pub(crate) version: String,
    pub(crate) hostname: String,
    pub(crate) pid: u32,
    pub(crate) event_id: Uuid,
    pub(crate) fields: Fields,
}

impl Event {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Unique id of this event, also used as the backend document id so
    /// re-delivery overwrites instead of duplicating.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Serializes the event as a single JSON document without a trailing
    /// newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(RESERVED_FIELDS.len() + self.fields.len()))?;
        map.serialize_entry(
            "timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        )?;
        map.serialize_entry("level", &self.level)?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("service", &self.service)?;
        map.serialize_entry("environment", &self.environment)?;
        map.serialize_entry("version", &self.version)?;
        map.serialize_entry("hostname", &self.hostname)?;
        map.serialize_entry("pid", &self.pid)?;
        map.serialize_entry("event_id", &self.event_id)?;
        for (k, v) in self.fields.iter() {
            // Enrichment already strips these; a duplicate key would make the
            // document ambiguous for the backend.
            if is_reserved(k) {
                continue;
            }
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
