use std::env;

use anyhow::{Context, anyhow};
use api::{config::ApiConfig, startup::Application};
use config::load_config;
use telemetry::tracing::init_tracing;
use tracing::{error, info};

/// Entry point for the fetch service.
fn main() -> anyhow::Result<()> {
    // Initialize tracing from the binary name
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let args = env::args();
    if args.len() != 1 {
        error!("invalid number of command line arguments");
        return Err(anyhow!(
            "invalid number of command line arguments, the fetch service takes none"
        ));
    }

    let config =
        load_config::<ApiConfig>().context("loading API configuration for server startup")?;
    info!(
        max_clients = config.admission.max_clients,
        drain_deadline_secs = config.admission.drain_deadline_secs,
        timeout_ms = config.fetch.timeout_ms,
        max_urls = config.fetch.max_urls,
        max_workers = config.fetch.max_workers,
        "fetch service options"
    );

    let application = Application::build(config)
        .await
        .context("building the fetch service")?;
    application.run_until_stopped().await?;

    info!("fetch service stopped");

    Ok(())
}
