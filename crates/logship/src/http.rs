// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for backend adapters.
//!
//! The client carries the request timeout, connection pooling settings, the
//! optional HTTPS proxy and the TLS verification switch from [`Config`].

use core::time::Duration;
use std::error::Error;

use tracing::{error, warn};

use crate::config::Config;
use crate::error::LogshipError;

/// Creates a configured HTTP client.
///
/// An invalid proxy URL is logged and the client falls back to a direct
/// connection so that a typo in `HTTPS_PROXY` does not disable shipping.
pub fn get_client(config: &Config) -> Result<reqwest::Client, LogshipError> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "LOGSHIP | Unable to build HTTP client with proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(config, false).map_err(|e| LogshipError::HttpClient(e.to_string()))
        }
    }
}

fn build_client(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if config.tls_skip_verify {
        warn!("LOGSHIP | TLS certificate verification is disabled for the backend connection");
        client = client.danger_accept_invalid_certs(true);
    }

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}
