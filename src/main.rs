//! Conformance runner entry point.
//!
//! Connects to one database, builds the shared fixture and runs every
//! conformance check against it. Exits non-zero on the first failure.

use db_client::config::Config;
use db_client::db::create_server;
use db_client::harness::ConformanceHarness;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let (connection_config, database) = config.connection_config()?;
    info!(
        dialect = %connection_config.dialect,
        database = %database,
        "Starting db-conformance v{}",
        env!("CARGO_PKG_VERSION")
    );

    let server = create_server(connection_config)?;
    let harness = ConformanceHarness::new(server.create_connection(database), config.schema.clone());

    let report = match harness.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Conformance run failed");
            // Best effort; the run already failed
            let _ = harness.connection().close().await;
            return Err(e.into());
        }
    };

    for check in &report.passed {
        println!("ok  {}", check);
    }

    if let Err(e) = harness.teardown().await {
        error!(error = %e, "Teardown failed");
        return Err(e.into());
    }

    info!(checks = report.passed.len(), "All conformance checks passed");
    Ok(())
}
