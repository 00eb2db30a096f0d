//! Poll scheduler that downloads check files and feeds the engine.
//!
//! Each round lists new check files, downloads them concurrently, ingests
//! every download as it completes and finalizes the engine once, after all
//! downloads finished or the round deadline passed.

use crate::config::Config;
use crate::engine::{Engine, Snapshot};
use crate::model::timestamp_now;
use crate::storage::{StorageReader, Watermark};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// What happened during one poll round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub listed: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Downloads abandoned at the round deadline.
    pub timed_out: usize,
    pub new_results: usize,
    pub new_events: usize,
}

/// Owns the engine and drives poll rounds against a storage reader.
pub struct Poller<R: StorageReader + 'static> {
    storage: Arc<R>,
    engine: Engine,
    watermark: Watermark,
    timeframe: i64,
    round_timeout: Duration,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
}

impl<R: StorageReader + 'static> Poller<R> {
    /// Create a poller and the channel its snapshots are published on.
    pub fn new(storage: Arc<R>, cfg: &Config) -> (Self, watch::Receiver<Arc<Snapshot>>) {
        let engine = Engine::new(cfg.gap_factor);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));

        let poller = Self {
            storage,
            engine,
            watermark: Watermark::default(),
            timeframe: cfg.timeframe,
            round_timeout: cfg.round_timeout(),
            snapshot_tx,
        };
        (poller, snapshot_rx)
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Lower bound for the next listing: the configured lookback before the
    /// first file was fetched, the newest fetched file afterwards.
    fn next_since(&self) -> i64 {
        match self.watermark.newest_fetched_timestamp() {
            Some(newest) => newest,
            None => timestamp_now().saturating_sub(self.timeframe),
        }
    }

    /// Run one poll round.
    pub async fn poll(&mut self) -> RoundSummary {
        let since = self.next_since();
        self.run_round(since).await
    }

    /// Run a round over files listed at or after `since`.
    pub async fn run_round(&mut self, since: i64) -> RoundSummary {
        let mut summary = RoundSummary::default();

        let names = match self.storage.list_files(since).await {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("Poller: Failed to list check files: {}", e);
                return summary;
            }
        };
        let names: Vec<String> = names.into_iter().filter(|n| self.watermark.is_new(n)).collect();
        summary.listed = names.len();

        let mut downloads = JoinSet::new();
        for name in names {
            let storage = self.storage.clone();
            downloads.spawn(async move {
                let result = storage.fetch(&name).await;
                (name, result)
            });
        }

        let deadline = Instant::now() + self.round_timeout;
        loop {
            match tokio::time::timeout_at(deadline, downloads.join_next()).await {
                Ok(Some(Ok((name, Ok(file))))) => {
                    self.watermark.observe(&name);
                    let outcome = self.engine.ingest(file);
                    summary.fetched += 1;
                    summary.new_results += outcome.results;
                    if outcome.last_check_advanced {
                        tracing::debug!("Poller: Last check advanced with {}", name);
                    }
                    self.publish();
                }
                Ok(Some(Ok((name, Err(e))))) => {
                    tracing::error!("Poller: Failed to fetch {}: {}", name, e);
                    summary.failed += 1;
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Poller: Download task failed: {}", e);
                    summary.failed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    summary.timed_out = downloads.len();
                    tracing::warn!(
                        "Poller: Round deadline passed with {} downloads outstanding",
                        summary.timed_out
                    );
                    downloads.abort_all();
                    break;
                }
            }
        }

        let outcome = self.engine.finalize(summary.new_results);
        summary.new_events = outcome.new_events;
        self.publish();

        tracing::info!(
            "Poller: Round done: {} listed, {} fetched, {} failed, {} timed out, {} results",
            summary.listed,
            summary.fetched,
            summary.failed,
            summary.timed_out,
            summary.new_results
        );

        summary
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.engine.snapshot()));
    }

    /// Poll immediately, then every `interval`, until stopped.
    pub fn start(mut self, interval: Duration) -> PollerHandle {
        let (stop_tx, mut stop_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => {
                        self.poll().await;
                    }
                }
            }
        });

        PollerHandle { stop_tx, task }
    }
}

/// Handle to a running poller task.
pub struct PollerHandle {
    stop_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling after the current round.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Poller: Task ended abnormally: {}", e);
        }
    }
}
