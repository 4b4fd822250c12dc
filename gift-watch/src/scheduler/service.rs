//! Poll loop.
//!
//! One cycle at a time: fetch, diff, register assets, dispatch, flush. The
//! loop sleeps a fixed interval after each cycle, so a slow cycle delays the
//! next tick instead of overlapping it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::BotApi;
use crate::assets::{AssetSynchronizer, SyncReport};
use crate::config::AppConfig;
use crate::domain::{AssetRef, Item};
use crate::monitor::{CatalogEvent, CatalogFetcher, CycleEvents, DiffEngine};
use crate::notification::{DeliveryOutcome, Notifier};
use crate::retry::{RetryPolicy, retry_on_rate_limit, sleep_or_cancel};
use crate::state::StateStore;
use crate::{Error, Result};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed sleep between the end of a cycle and the next one.
    pub poll_interval: Duration,
    /// Ceiling for rate-limited catalog fetches.
    pub retry: RetryPolicy,
    /// Sends in flight at once.
    pub notify_concurrency: usize,
    /// Announce the first-ever snapshot as one digest.
    pub first_run_digest: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            notify_concurrency: 4,
            first_run_digest: true,
        }
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            retry: config.retry_policy(),
            notify_concurrency: config.notify_concurrency,
            first_run_digest: config.first_run_digest,
        }
    }
}

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// Delivery counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTally {
    pub delivered: usize,
    pub failed: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

impl DispatchTally {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Failed => self.failed += 1,
            DeliveryOutcome::Rejected => self.rejected += 1,
            DeliveryOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new_items: usize,
    pub threshold_crossed: usize,
    pub sold_out: usize,
    pub upgrades_added: usize,
    /// Whether the new items went out as the first-run digest.
    pub digest: bool,
    pub assets: SyncReport,
    pub deliveries: DispatchTally,
    /// Whether state was written at the end of the cycle.
    pub flushed: bool,
}

impl CycleReport {
    fn log(&self) {
        info!(
            fetched = self.fetched,
            new = self.new_items,
            threshold = self.threshold_crossed,
            sold_out = self.sold_out,
            upgrades = self.upgrades_added,
            digest = self.digest,
            assets_registered = self.assets.registered,
            assets_failed = self.assets.failed,
            delivered = self.deliveries.delivered,
            failed = self.deliveries.failed,
            rejected = self.deliveries.rejected,
            flushed = self.flushed,
            "Cycle completed"
        );
    }
}

/// The poll loop. Owns the persisted state for the process lifetime.
pub struct Scheduler {
    config: SchedulerConfig,
    api: Arc<dyn BotApi>,
    state: StateStore,
    fetcher: CatalogFetcher,
    diff: DiffEngine,
    assets: Option<AssetSynchronizer>,
    notifier: Notifier,
    loop_state: LoopState,
}

impl Scheduler {
    /// Wire every component from `config` around `api`.
    pub fn new(api: Arc<dyn BotApi>, state: StateStore, config: &AppConfig) -> Self {
        let assets = config
            .asset_sync_config()
            .map(|sync| AssetSynchronizer::new(api.clone(), sync));
        if assets.is_none() {
            info!("STICKER_OWNER_ID not set, notifications will be text only");
        }

        Self {
            config: SchedulerConfig::from(config),
            fetcher: CatalogFetcher::new(api.clone(), config.fetch_policy()),
            diff: DiffEngine::new(config.diff_policy()),
            notifier: Notifier::new(api.clone(), config.notifier_config()),
            assets,
            api,
            state,
            loop_state: LoopState::Idle,
        }
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// One-off checks before the first cycle. Failures are logged only.
    pub async fn startup(&self, cancel: &CancellationToken) {
        match self.api.get_my_commands().await {
            Ok(commands) => info!(commands = commands.len(), "Bot API reachable"),
            Err(e) => warn!(error = %e, "Bot API probe failed, continuing"),
        }

        if let Some(assets) = &self.assets {
            let set_name = &assets.config().set_name;
            match assets.ensure_collection_exists(cancel).await {
                Ok(true) => info!(set = %set_name, "Sticker set found"),
                Ok(false) => {
                    info!(
                        set = %set_name,
                        "Sticker set missing, it will be created with the first sticker"
                    )
                }
                Err(e) => warn!(set = %set_name, error = %e, "Failed to probe sticker set"),
            }
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(interval = ?self.config.poll_interval, "Starting poll loop");
        self.startup(&cancel).await;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.loop_state = LoopState::Running;
            let result = self.run_cycle(&cancel).await;
            self.loop_state = LoopState::Idle;

            match result {
                Ok(report) => report.log(),
                Err(Error::Cancelled) => {
                    info!("Cycle interrupted by shutdown");
                    break;
                }
                Err(e) => warn!(error = %e, "Cycle abandoned"),
            }

            if sleep_or_cancel(self.config.poll_interval, &cancel).await.is_err() {
                break;
            }
        }

        // A failed end-of-cycle flush leaves the state dirty.
        if self.state.is_dirty() {
            self.state.flush().await?;
        }

        self.loop_state = LoopState::Stopped;
        info!("Poll loop stopped");
        Ok(())
    }

    /// Run a single cycle.
    ///
    /// A fetch failure abandons the cycle before any state is touched. Once
    /// the diff has run, state is flushed even if the rest of the cycle is
    /// interrupted. New items whose announcement was cut short by shutdown
    /// are forgotten first, so they are announced after a restart.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport> {
        let items = retry_on_rate_limit("get_available_gifts", self.config.retry, cancel, || {
            self.fetcher.fetch()
        })
        .await?;

        let first_run = self.state.known().is_empty();
        let events = self.diff.diff(&items, &mut self.state, Utc::now());

        let mut report = CycleReport {
            fetched: items.len(),
            new_items: events.new_items.len(),
            threshold_crossed: events.threshold_crossed.len(),
            sold_out: events.sold_out.len(),
            upgrades_added: events.upgrades_added.len(),
            ..Default::default()
        };

        let mut announced = HashSet::new();
        let processed = self
            .process_events(&events, first_run, &mut report, &mut announced, cancel)
            .await;

        if matches!(processed, Err(Error::Cancelled)) {
            for event in &events.new_items {
                let id = event.item().id.as_str();
                if !announced.contains(id) && self.state.forget_item(id) {
                    debug!(gift_id = %id, "New gift not announced before shutdown");
                }
            }
        }

        report.flushed = match self.state.flush().await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "Failed to persist state, will retry next cycle");
                false
            }
        };

        processed.map(|()| report)
    }

    /// Sync assets and dispatch every event. Ids of new items whose
    /// announcement reached a final outcome are collected in `announced`.
    async fn process_events<'a>(
        &mut self,
        events: &'a CycleEvents,
        first_run: bool,
        report: &mut CycleReport,
        announced: &mut HashSet<&'a str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if events.is_empty() {
            debug!("No catalog changes");
            return Ok(());
        }

        // Assets first: every notification below may reference them.
        if let Some(assets) = &self.assets {
            report.assets = assets
                .sync_items(events.iter().map(CatalogEvent::item), &mut self.state, cancel)
                .await?;
        }

        let digest = first_run && self.config.first_run_digest && !events.new_items.is_empty();
        report.digest = digest;

        let mut baseline: HashSet<&str> = HashSet::new();
        if digest {
            let items: Vec<&Item> = events.new_items.iter().map(CatalogEvent::item).collect();
            let outcome = self.notifier.announce_digest(&items, cancel).await;
            report.deliveries.record(outcome);
            if outcome != DeliveryOutcome::Cancelled {
                announced.extend(events.new_items.iter().map(|event| event.item().id.as_str()));
            }
            if outcome.marks_notified() {
                // The digest already shows the supply of every item it lists.
                baseline = events
                    .new_items
                    .iter()
                    .map(|event| event.item().id.as_str())
                    .collect();
            }
        } else {
            let jobs = self.jobs(events.new_items.iter());
            let concurrency = self.config.notify_concurrency;
            for (event, outcome) in dispatch(&self.notifier, jobs, concurrency, cancel).await {
                report.deliveries.record(outcome);
                if outcome != DeliveryOutcome::Cancelled {
                    announced.insert(event.item().id.as_str());
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (skipped, followups): (Vec<&CatalogEvent>, Vec<&CatalogEvent>) = events
            .followups()
            .partition(|event| baseline.contains(event.item().id.as_str()));
        for event in skipped {
            self.mark(event, DeliveryOutcome::Delivered);
        }

        let jobs = self.jobs(followups.into_iter());
        let outcomes = dispatch(&self.notifier, jobs, self.config.notify_concurrency, cancel).await;
        for (event, outcome) in outcomes {
            report.deliveries.record(outcome);
            self.mark(event, outcome);
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Pair events with the asset currently linked to their item.
    fn jobs<'a>(
        &self,
        events: impl Iterator<Item = &'a CatalogEvent>,
    ) -> Vec<(&'a CatalogEvent, Option<AssetRef>)> {
        events
            .map(|event| {
                let asset = self.state.assets().get(&event.item().id).cloned();
                (event, asset)
            })
            .collect()
    }

    /// Record a write-once category after dispatch.
    fn mark(&mut self, event: &CatalogEvent, outcome: DeliveryOutcome) {
        if let Some(kind) = event.notify_kind()
            && outcome.marks_notified()
        {
            self.state.mark_notified(kind, &event.item().id);
        }
    }
}

/// Deliver `jobs` with at most `concurrency` sends in flight. Resolves once
/// every send has completed or definitively failed.
async fn dispatch<'a>(
    notifier: &Notifier,
    jobs: Vec<(&'a CatalogEvent, Option<AssetRef>)>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Vec<(&'a CatalogEvent, DeliveryOutcome)> {
    stream::iter(jobs)
        .map(move |(event, asset)| async move {
            let outcome = notifier.notify(event, asset.as_ref(), cancel).await;
            (event, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
