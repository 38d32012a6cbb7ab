// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use tokio::time::Duration;
use tracing::{error, info, warn};

use logship::{diagnostics, fields, Config, FlushResult, Logger};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = diagnostics::init("error");
            error!("LOGSHIP | {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = diagnostics::init(&config.diagnostics_level) {
        eprintln!("{e}");
    }

    let logger = match Logger::start(&config).await {
        Ok(logger) => logger,
        Err(e) => {
            error!("LOGSHIP | Unable to start logger: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "LOGSHIP | Shipping {} ({}) from {} to {}",
        config.service_name,
        config.environment,
        logger.identity().hostname,
        config.elasticsearch_url
    );

    logger.info(
        "Application started",
        fields! { "port" => 3000, "host" => "localhost" },
    );

    if let Err(e) = "forty-two".parse::<u32>() {
        logger.error_with("Failed to parse request", &e, fields! { "context" => "main" });
    }

    logger.warn("Important warning", fields! { "user_count" => 150 });
    logger.performance(
        "database_query",
        150,
        fields! { "table" => "users", "query" => "SELECT *" },
    );
    logger.business(
        "order_placed",
        fields! { "order_id" => "A-1001", "total" => 59.9 },
        fields! {},
    );
    logger.security(
        "failed_login",
        fields! { "ip" => "192.168.1.1", "username" => "testuser", "attempts" => 3 },
        fields! {},
    );
    logger.audit("create", "user", "admin", fields! { "target_user" => "12345" });

    match logger.flush(FLUSH_TIMEOUT).await {
        FlushResult::Flushed => info!("LOGSHIP | All events delivered"),
        other => warn!("LOGSHIP | Flush finished with {:?}", other),
    }

    let report = logger.shutdown().await;
    info!(
        "LOGSHIP | Shutdown: {} indexed, {} rejected, {} lost, {} discarded",
        report.stats.indexed,
        report.stats.rejected,
        report.stats.lost,
        report.discarded
    );

    if report.timed_out {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
