// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! Everything a logger needs is read once at construction; there is no hot
//! reload. A [`Config`] can come from three places:
//!
//! 1. **Defaults** - [`Config::default()`]
//! 2. **A config file** - `Config` implements `Deserialize`; every field is
//!    optional and durations are given in milliseconds
//! 3. **Environment variables** - [`Config::from_env()`] reads `LOGSHIP_*`
//!    variables, plus the conventional names used by existing deployments
//!    (`SERVICE_NAME`, `APP_VERSION`, `NODE_ENV`, `ELASTICSEARCH_URL`,
//!    `ELASTIC_USERNAME`, `ELASTIC_PASSWORD`, `HTTPS_PROXY`, `LOG_LEVEL`)
//!
//! ## Edge Cases and Behaviors
//!
//! - **Unparseable numbers or booleans** in the environment are ignored and
//!   the default is kept
//! - **Unknown levels or overflow policies** in the environment are rejected
//!   with [`LogshipError::InvalidConfig`]; in a config file they fall back to
//!   their defaults with a logged error
//! - **Whitespace** around values is trimmed; empty values count as unset

pub mod level;
pub mod overflow;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::LogshipError;
use crate::event::Level;
pub use overflow::OverflowPolicy;

pub const DEFAULT_SERVICE_NAME: &str = "logship-app";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://elasticsearch:9200";
pub const DEFAULT_INDEX_PREFIX: &str = "logship-logs";

const DIAGNOSTIC_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    // Identity
    pub service_name: String,
    pub environment: String,
    pub version: String,
    /// Overrides hostname detection when set.
    pub hostname: Option<String>,

    // Backend
    pub elasticsearch_url: String,
    pub elasticsearch_username: Option<String>,
    pub elasticsearch_password: Option<String>,
    /// Daily indices are named `{index_prefix}-YYYY.MM.DD`.
    pub index_prefix: String,
    #[serde(deserialize_with = "deserialize_duration_from_millis")]
    pub request_timeout: Duration,
    pub tls_skip_verify: bool,
    pub https_proxy: Option<String>,
    /// Install the index template when the logger starts.
    pub create_index_template: bool,

    // Delivery pipeline
    pub queue_capacity: usize,
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_duration_from_millis")]
    pub batch_linger: Duration,
    pub overflow_policy: OverflowPolicy,
    /// Total delivery attempts per batch before it is counted as lost.
    pub max_retries: u32,
    #[serde(deserialize_with = "deserialize_duration_from_millis")]
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    #[serde(deserialize_with = "deserialize_duration_from_millis")]
    pub backoff_cap: Duration,
    pub backoff_jitter: f64,
    #[serde(deserialize_with = "deserialize_duration_from_millis")]
    pub drain_timeout: Duration,

    // Shipping eligibility
    /// Events below this level are only written to the local sink.
    pub ship_min_level: Level,
    /// Request an immediate flush whenever a CRITICAL event is logged.
    pub flush_on_critical: bool,

    // Local sink
    pub console_enabled: bool,
    pub console_min_level: Level,
    pub log_file: Option<PathBuf>,

    /// Filter for the pipeline's own `tracing` diagnostics.
    pub diagnostics_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            version: DEFAULT_VERSION.to_string(),
            hostname: None,

            elasticsearch_url: DEFAULT_ELASTICSEARCH_URL.to_string(),
            elasticsearch_username: None,
            elasticsearch_password: None,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            request_timeout: Duration::from_secs(10),
            tls_skip_verify: false,
            https_proxy: None,
            create_index_template: true,

            queue_capacity: 10_000,
            batch_size: 500,
            batch_linger: Duration::from_secs(1),
            overflow_policy: OverflowPolicy::DropNewest,
            max_retries: 5,
            backoff_base: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_secs(30),
            backoff_jitter: 0.2,
            drain_timeout: Duration::from_secs(5),

            ship_min_level: Level::Info,
            flush_on_critical: true,

            console_enabled: true,
            console_min_level: Level::Debug,
            log_file: None,

            diagnostics_level: "warn".to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("version", &self.version)
            .field("hostname", &self.hostname)
            .field("elasticsearch_url", &self.elasticsearch_url)
            .field("elasticsearch_username", &self.elasticsearch_username)
            .field(
                "elasticsearch_password",
                &self.elasticsearch_password.as_ref().map(|_| "<redacted>"),
            )
            .field("index_prefix", &self.index_prefix)
            .field("request_timeout", &self.request_timeout)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("https_proxy", &self.https_proxy)
            .field("create_index_template", &self.create_index_template)
            .field("queue_capacity", &self.queue_capacity)
            .field("batch_size", &self.batch_size)
            .field("batch_linger", &self.batch_linger)
            .field("overflow_policy", &self.overflow_policy)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("backoff_cap", &self.backoff_cap)
            .field("backoff_jitter", &self.backoff_jitter)
            .field("drain_timeout", &self.drain_timeout)
            .field("ship_min_level", &self.ship_min_level)
            .field("flush_on_critical", &self.flush_on_critical)
            .field("console_enabled", &self.console_enabled)
            .field("console_min_level", &self.console_min_level)
            .field("log_file", &self.log_file)
            .field("diagnostics_level", &self.diagnostics_level)
            .finish()
    }
}

impl Config {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, LogshipError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// `lookup` is queried with variable names exactly as
    /// [`from_env`](Self::from_env) would read them.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LogshipError> {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let mut config = Config::default();

        if let Some(v) = get(&["LOGSHIP_SERVICE_NAME", "SERVICE_NAME"]) {
            config.service_name = v;
        }
        if let Some(v) = get(&["LOGSHIP_ENV", "ENVIRONMENT", "NODE_ENV"]) {
            config.environment = v;
        }
        if let Some(v) = get(&["LOGSHIP_VERSION", "APP_VERSION"]) {
            config.version = v;
        }
        config.hostname = get(&["LOGSHIP_HOSTNAME"]);

        if let Some(v) = get(&["LOGSHIP_ELASTICSEARCH_URL", "ELASTICSEARCH_URL"]) {
            config.elasticsearch_url = v;
        }
        config.elasticsearch_username = get(&["ELASTIC_USERNAME", "ELASTICSEARCH_USERNAME"]);
        config.elasticsearch_password = get(&["ELASTIC_PASSWORD", "ELASTICSEARCH_PASSWORD"]);
        if let Some(v) = get(&["LOGSHIP_INDEX_PREFIX"]) {
            config.index_prefix = v;
        }
        if let Some(ms) = parse_lenient::<u64>(
            "LOGSHIP_REQUEST_TIMEOUT_MS",
            get(&["LOGSHIP_REQUEST_TIMEOUT_MS"]),
        ) {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(b) = parse_bool("LOGSHIP_TLS_SKIP_VERIFY", get(&["LOGSHIP_TLS_SKIP_VERIFY"])) {
            config.tls_skip_verify = b;
        }
        config.https_proxy = get(&["LOGSHIP_HTTPS_PROXY", "HTTPS_PROXY"]);
        if let Some(b) = parse_bool(
            "LOGSHIP_CREATE_INDEX_TEMPLATE",
            get(&["LOGSHIP_CREATE_INDEX_TEMPLATE"]),
        ) {
            config.create_index_template = b;
        }

        if let Some(n) = parse_lenient("LOGSHIP_QUEUE_CAPACITY", get(&["LOGSHIP_QUEUE_CAPACITY"])) {
            config.queue_capacity = n;
        }
        if let Some(n) = parse_lenient("LOGSHIP_BATCH_SIZE", get(&["LOGSHIP_BATCH_SIZE"])) {
            config.batch_size = n;
        }
        if let Some(ms) = parse_lenient::<u64>(
            "LOGSHIP_BATCH_LINGER_MS",
            get(&["LOGSHIP_BATCH_LINGER_MS"]),
        ) {
            config.batch_linger = Duration::from_millis(ms);
        }
        if let Some(v) = get(&["LOGSHIP_OVERFLOW_POLICY"]) {
            config.overflow_policy =
                OverflowPolicy::from_str(&v).map_err(LogshipError::InvalidConfig)?;
        }
        if let Some(n) = parse_lenient("LOGSHIP_MAX_RETRIES", get(&["LOGSHIP_MAX_RETRIES"])) {
            config.max_retries = n;
        }
        if let Some(ms) = parse_lenient::<u64>(
            "LOGSHIP_BACKOFF_BASE_MS",
            get(&["LOGSHIP_BACKOFF_BASE_MS"]),
        ) {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(m) = parse_lenient(
            "LOGSHIP_BACKOFF_MULTIPLIER",
            get(&["LOGSHIP_BACKOFF_MULTIPLIER"]),
        ) {
            config.backoff_multiplier = m;
        }
        if let Some(ms) = parse_lenient::<u64>(
            "LOGSHIP_BACKOFF_CAP_MS",
            get(&["LOGSHIP_BACKOFF_CAP_MS"]),
        ) {
            config.backoff_cap = Duration::from_millis(ms);
        }
        if let Some(j) = parse_lenient("LOGSHIP_BACKOFF_JITTER", get(&["LOGSHIP_BACKOFF_JITTER"])) {
            config.backoff_jitter = j;
        }
        if let Some(ms) = parse_lenient::<u64>(
            "LOGSHIP_DRAIN_TIMEOUT_MS",
            get(&["LOGSHIP_DRAIN_TIMEOUT_MS"]),
        ) {
            config.drain_timeout = Duration::from_millis(ms);
        }

        if let Some(v) = get(&["LOGSHIP_SHIP_LEVEL"]) {
            config.ship_min_level = Level::from_str(&v).map_err(LogshipError::InvalidConfig)?;
        }
        if let Some(b) = parse_bool(
            "LOGSHIP_FLUSH_ON_CRITICAL",
            get(&["LOGSHIP_FLUSH_ON_CRITICAL"]),
        ) {
            config.flush_on_critical = b;
        }

        if let Some(b) = parse_bool("LOGSHIP_CONSOLE", get(&["LOGSHIP_CONSOLE"])) {
            config.console_enabled = b;
        }
        if let Some(v) = get(&["LOGSHIP_CONSOLE_LEVEL", "LOG_LEVEL"]) {
            config.console_min_level = Level::from_str(&v).map_err(LogshipError::InvalidConfig)?;
        }
        config.log_file = get(&["LOGSHIP_LOG_FILE"]).map(PathBuf::from);

        if let Some(v) = get(&["LOGSHIP_DIAGNOSTICS_LEVEL"]) {
            config.diagnostics_level = v.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), LogshipError> {
        let invalid = |msg: String| Err(LogshipError::InvalidConfig(msg));

        if self.service_name.trim().is_empty() {
            return invalid("service_name cannot be empty".to_string());
        }
        let url = self.elasticsearch_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return invalid(format!(
                "elasticsearch_url must start with http:// or https://, got '{url}'"
            ));
        }
        if self.index_prefix.trim().is_empty() {
            return invalid("index_prefix cannot be empty".to_string());
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be greater than 0".to_string());
        }
        if self.batch_size > self.queue_capacity {
            return invalid(format!(
                "batch_size ({}) cannot exceed queue_capacity ({})",
                self.batch_size, self.queue_capacity
            ));
        }
        if self.max_retries == 0 {
            return invalid("max_retries must be at least 1".to_string());
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return invalid(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if !(0.0..1.0).contains(&self.backoff_jitter) {
            return invalid(format!(
                "backoff_jitter must be in [0.0, 1.0), got {}",
                self.backoff_jitter
            ));
        }
        if self.backoff_base > self.backoff_cap {
            return invalid("backoff_base cannot exceed backoff_cap".to_string());
        }
        if self.request_timeout.is_zero() {
            return invalid("request_timeout must be greater than 0".to_string());
        }
        if !DIAGNOSTIC_LEVELS.contains(&self.diagnostics_level.as_str()) {
            return invalid(format!(
                "Invalid diagnostics level '{}'. Must be one of: trace, debug, info, warn, error, off",
                self.diagnostics_level
            ));
        }

        Ok(())
    }
}

fn parse_lenient<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            debug!("Ignoring invalid value for {key}: '{value}'");
            None
        }
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Option<bool> {
    let value = value?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            debug!("Ignoring invalid boolean for {key}: '{value}'");
            None
        }
    }
}

pub fn deserialize_duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}
