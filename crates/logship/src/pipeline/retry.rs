// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff with jitter for failed batch deliveries.
//!
//! The nominal delay before retry `n` (1-based) is
//! `min(base * multiplier^(n-1), cap)`. The applied delay multiplies the
//! nominal delay by `1 + u`, with `u` drawn uniformly from
//! `[-jitter, +jitter]`. With the defaults (500 ms base, x2, 30 s cap, 0.2
//! jitter) retries wait roughly 0.5 s, 1 s, 2 s, 4 s, ... up to 30 s.

use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total delivery attempts per batch, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the nominal delay added or removed at random.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: config.backoff_base,
            multiplier: config.backoff_multiplier,
            max_delay: config.backoff_cap,
            jitter_factor: config.backoff_jitter,
        }
    }
}

impl RetryPolicy {
    /// True once `attempts` deliveries of one batch have failed and no more
    /// are allowed.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before retry `retry` (1-based), without jitter.
    #[must_use]
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay before retry `retry` (1-based), with jitter applied.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.jittered(self.nominal_delay(retry), fastrand::f64())
    }

    /// Applies jitter to `nominal` given a uniform `sample` in `[0, 1)`.
    pub(crate) fn jittered(&self, nominal: Duration, sample: f64) -> Duration {
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return nominal;
        }
        let offset = (sample.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter;
        Duration::from_secs_f64((nominal.as_secs_f64() * (1.0 + offset)).max(0.0))
    }
}
