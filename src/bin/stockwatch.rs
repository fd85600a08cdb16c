//! stockwatch daemon
//!
//! Loads settings from flags, the environment and `.env`, opens the state
//! file and runs poll rounds until Ctrl+C.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use stockwatch::config::{ConfigProvider, JsonFileConfig, Settings};
use stockwatch::engine::runtime::{listen_for_shutdown, Scheduler, SchedulerConfig};
use stockwatch::engine::SourcePoller;
use stockwatch::fetch::{Fetcher, HttpFetcher, PageParser};
use stockwatch::notify::{ChannelClient, NotificationCoordinator, TelegramClient};
use stockwatch::retry::RetryPolicy;
use stockwatch::storage::{open_state, ProductStore};
use stockwatch::{MonitorResult, ObservationNormalizer};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let settings = Settings::parse();

    if let Err(e) = stockwatch::logging::init(&settings.log_level, settings.log_format) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(settings).await {
        Ok(()) => {
            info!("shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> MonitorResult<()> {
    settings.validate()?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting stockwatch");

    // Installed before the first round so Ctrl+C during it still lets the round finish.
    let shutdown = listen_for_shutdown(async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    });

    // Holds an exclusive lock on the state file for the process lifetime.
    let state = open_state(&settings.state_file)?;
    info!(path = %state.path().display(), "state file opened");
    let store: Arc<dyn ProductStore> = Arc::new(state);

    let client: Arc<dyn ChannelClient> =
        Arc::new(TelegramClient::new(settings.telegram_token.clone(), settings.request_timeout())?);
    let coordinator = NotificationCoordinator::new(client, settings.channel_ids())
        .with_retry(RetryPolicy::send(settings.max_retries));
    let channels = coordinator.channels().len();

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
        settings.request_timeout(),
        settings.storefront_root.clone(),
        PageParser::new(settings.title_marker.clone()),
    )?);

    let normalizer = ObservationNormalizer::new().with_affiliate_id(settings.affiliate_id.clone());
    let poller = SourcePoller::new(store, fetcher, normalizer, coordinator)
        .with_fetch_retry(RetryPolicy::fetch(settings.max_retries));

    let sources = JsonFileConfig::new(settings.config_file.clone());
    info!(path = %sources.path().display(), "watching source list");
    let config: Arc<dyn ConfigProvider> = Arc::new(sources);
    let scheduler = Scheduler::new(
        Arc::new(poller),
        config,
        SchedulerConfig {
            max_concurrent_requests: settings.max_concurrent_requests,
            round_interval: settings.round_interval(),
            ..SchedulerConfig::default()
        },
    )?;

    info!(channels, "monitor running, press Ctrl+C to stop");
    scheduler.run(shutdown).await;

    Ok(())
}
