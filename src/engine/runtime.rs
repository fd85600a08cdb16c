//! Round scheduler.
//!
//! A round polls every configured source once. Polls within a round run
//! concurrently behind a fixed-size admission limiter, launched with a small
//! random stagger. The next round starts only after the whole round has
//! finished and the interval has elapsed, so no source is ever polled by two
//! tasks at once.
//!
//! The first round after start is silent: it records state without sending
//! anything, so a restart never replays the catalogue as new listings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{ConfigMarker, ConfigProvider};
use crate::error::ConfigError;
use crate::notify::Delivery;

use super::{PollOutcome, SourcePoller};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sources polled at the same time.
    pub max_concurrent_requests: usize,
    /// Sleep between rounds.
    pub round_interval: Duration,
    /// Bounds of the random delay between launching successive polls.
    pub launch_jitter: (Duration, Duration),
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 2,
            round_interval: Duration::from_secs(30),
            launch_jitter: (Duration::from_millis(500), Duration::from_secs(2)),
        }
    }
}

/// Outcomes of one round, in completion order.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub delivery: Delivery,
    pub outcomes: Vec<(String, PollOutcome)>,
}

impl RoundReport {
    /// Sources whose page was reconciled.
    #[must_use]
    pub fn reconciled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PollOutcome::Reconciled { .. }))
            .count()
    }

    /// Sources skipped or abandoned.
    #[must_use]
    pub fn not_reconciled(&self) -> usize {
        self.outcomes.len() - self.reconciled()
    }
}

/// Drives rounds of [`SourcePoller::poll`] over the configured sources.
pub struct Scheduler {
    poller: Arc<SourcePoller>,
    config: Arc<dyn ConfigProvider>,
    settings: SchedulerConfig,
    limiter: Arc<Semaphore>,
    sources: Vec<String>,
    marker: Option<ConfigMarker>,
    rounds: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("sources", &self.sources)
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Load the initial source list; failure here is fatal to the caller.
    pub fn new(
        poller: Arc<SourcePoller>,
        config: Arc<dyn ConfigProvider>,
        settings: SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        if settings.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_concurrent_requests",
                reason: "must be at least 1".to_string(),
            });
        }

        let marker = config.marker();
        let sources = config.load()?;
        info!(sources = sources.len(), "loaded source list");

        Ok(Self {
            limiter: Arc::new(Semaphore::new(settings.max_concurrent_requests)),
            poller,
            config,
            settings,
            sources,
            marker,
            rounds: 0,
        })
    }

    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Pick up an edited source list. A bad edit keeps the previous list.
    pub fn reload_sources(&mut self) {
        if !self.config.changed_since(self.marker.as_ref()) {
            return;
        }
        self.marker = self.config.marker();

        match self.config.load() {
            Ok(sources) => {
                info!(
                    before = self.sources.len(),
                    after = sources.len(),
                    "source list changed, reloaded"
                );
                self.sources = sources;
            }
            Err(e) => {
                warn!(error = %e, "source list changed but failed to load, keeping previous list");
            }
        }
    }

    /// Run a single round to completion.
    pub async fn run_round(&mut self) -> RoundReport {
        let delivery = if self.rounds == 0 {
            Delivery::Silent
        } else {
            Delivery::Notify
        };
        self.rounds += 1;
        info!(round = self.rounds, sources = self.sources.len(), ?delivery, "round started");

        let mut tasks = JoinSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                let stagger = self.launch_delay();
                if !stagger.is_zero() {
                    tokio::time::sleep(stagger).await;
                }
            }

            let poller = Arc::clone(&self.poller);
            let limiter = Arc::clone(&self.limiter);
            let source = source.clone();
            tasks.spawn(async move {
                let outcome = match limiter.acquire_owned().await {
                    Ok(_permit) => poller.poll(&source, delivery).await,
                    Err(_) => PollOutcome::Abandoned {
                        reason: "admission limiter closed".to_string(),
                    },
                };
                (source, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => outcomes.push(entry),
                Err(e) => error!(error = %e, "poll task failed"),
            }
        }

        let report = RoundReport { delivery, outcomes };
        info!(
            round = self.rounds,
            reconciled = report.reconciled(),
            not_reconciled = report.not_reconciled(),
            "round finished"
        );
        report
    }

    /// Run rounds until `shutdown` resolves. Shutdown is observed between
    /// rounds; a round in progress always completes.
    pub async fn run<S: Future<Output = ()>>(mut self, shutdown: S) {
        tokio::pin!(shutdown);
        loop {
            self.reload_sources();
            self.run_round().await;

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, stopping scheduler");
                    break;
                }
                () = tokio::time::sleep(self.settings.round_interval) => {}
            }
        }
    }

    fn launch_delay(&self) -> Duration {
        let (min, max) = self.settings.launch_jitter;
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Start listening for `signal` now and return a future for [`Scheduler::run`].
///
/// The listener is spawned immediately, so a signal that arrives before the
/// scheduler first looks at shutdown is held until the current round ends.
pub fn listen_for_shutdown<S>(signal: S) -> impl Future<Output = ()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        signal.await;
        let _ = tx.send(());
    });
    async move {
        // A dropped sender means the listener died; never stop on that.
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
