use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use livelytics_core::visit::{now_ms, VisitEvent};

use crate::broadcast::{Broadcaster, DashboardUpdate, HourlyTraffic, NewVisit};
use crate::histogram;
use crate::snapshot::{Overview, StatsSnapshot};
use crate::state::{AggregationState, BUFFER_RETENTION_MS};
use crate::store::VisitStore;
use crate::topn::{
    country_rows, named_rows, page_rows, referrer_rows, Dimension, TopBreakdown,
    DEFAULT_TOP_LIMIT,
};
use crate::windows::{unique_sessions, Window};

const MAILBOX_CAPACITY: usize = 1024;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const STATS_BROADCAST_INTERVAL: Duration = Duration::from_secs(60);
const HOURLY_BROADCAST_INTERVAL: Duration = Duration::from_secs(60);

const BOOTSTRAP_DELAY: Duration = Duration::from_secs(3);
const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(5);
const BOOTSTRAP_MAX_RETRIES: u32 = 2;
/// A buffer at or past this size means live traffic beat the preload to
/// it; the preload result is discarded rather than clobbering it.
const BOOTSTRAP_SKIP_LEN: usize = 10;

/// Default sizes for the two dashboard visit panels.
pub const RECENT_VISITORS_LIMIT: usize = 20;
pub const ACTIVITY_BUFFER_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("aggregator is not running")]
    Closed,
}

enum Msg {
    Ingest(VisitEvent),
    WindowCount(Window, oneshot::Sender<usize>),
    TopBreakdown(Dimension, usize, oneshot::Sender<TopBreakdown>),
    RecentVisitors(usize, oneshot::Sender<Vec<VisitEvent>>),
    ActivityBuffer(usize, oneshot::Sender<Vec<VisitEvent>>),
    Snapshot(oneshot::Sender<StatsSnapshot>),
    Overview(oneshot::Sender<Overview>),
    HourlyHistogram(oneshot::Sender<Vec<u64>>),
    CleanupTick,
    StatsBroadcastTick,
    HourlyBroadcastTick,
    BootstrapAttempt(u32),
    BootstrapLoaded { visits: Vec<VisitEvent>, attempt: u32 },
    Shutdown,
}

/// Cloneable handle to the aggregator actor.
///
/// One spawned task owns all aggregation state and processes the mailbox
/// in order, so every mutation and every read is serialized without
/// locks. Ingestion never blocks or fails the caller; queries are
/// request/reply round-trips returning a consistent view as of the moment
/// they are processed.
#[derive(Clone)]
pub struct Aggregator {
    tx: mpsc::Sender<Msg>,
}

impl Aggregator {
    /// Spawn the actor task and its timers, returning the handle.
    ///
    /// Shortly after start the actor attempts to preload the trailing
    /// hour of visits from the durable store (with bounded retries, since
    /// the store may itself still be starting up). The aggregator is
    /// usable immediately — preload failure just means dashboards start
    /// from empty state until live traffic arrives.
    pub fn start(store: Arc<dyn VisitStore>, broadcaster: Broadcaster) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

        let worker = Worker {
            state: AggregationState::default(),
            store,
            broadcaster,
            tx: tx.clone(),
        };
        tokio::spawn(worker.run(rx));

        let bootstrap_tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(BOOTSTRAP_DELAY).await;
            let _ = bootstrap_tx.send(Msg::BootstrapAttempt(0)).await;
        });

        Self { tx }
    }

    /// Fire-and-forget ingestion. The HTTP request path must never wait
    /// on aggregation, so a full mailbox drops the visit with a warning
    /// instead of applying backpressure.
    pub fn ingest(&self, event: VisitEvent) {
        if self.tx.try_send(Msg::Ingest(event)).is_err() {
            warn!("visit dropped, aggregator mailbox is full or closed");
        }
    }

    pub async fn window_count(&self, window: Window) -> Result<usize, AggregatorError> {
        self.request(|reply| Msg::WindowCount(window, reply)).await
    }

    pub async fn top_breakdown(
        &self,
        dimension: Dimension,
        limit: usize,
    ) -> Result<TopBreakdown, AggregatorError> {
        self.request(|reply| Msg::TopBreakdown(dimension, limit, reply))
            .await
    }

    pub async fn recent_visitors(&self, limit: usize) -> Result<Vec<VisitEvent>, AggregatorError> {
        self.request(|reply| Msg::RecentVisitors(limit, reply)).await
    }

    pub async fn activity_buffer(&self, limit: usize) -> Result<Vec<VisitEvent>, AggregatorError> {
        self.request(|reply| Msg::ActivityBuffer(limit, reply)).await
    }

    pub async fn snapshot(&self) -> Result<StatsSnapshot, AggregatorError> {
        self.request(Msg::Snapshot).await
    }

    pub async fn overview(&self) -> Result<Overview, AggregatorError> {
        self.request(Msg::Overview).await
    }

    /// Hourly series from the in-memory buffer. The authoritative
    /// store-backed series is broadcast on a timer instead.
    pub async fn hourly_histogram(&self) -> Result<Vec<u64>, AggregatorError> {
        self.request(Msg::HourlyHistogram).await
    }

    /// Stop the actor. Messages already queued ahead of the stop are
    /// processed; later ingests are dropped and queries return
    /// [`AggregatorError::Closed`]. State is discarded — it is ephemeral
    /// by design.
    pub async fn stop(&self) {
        let _ = self.tx.send(Msg::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Msg,
    ) -> Result<T, AggregatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| AggregatorError::Closed)?;
        reply_rx.await.map_err(|_| AggregatorError::Closed)
    }
}

struct Worker {
    state: AggregationState,
    store: Arc<dyn VisitStore>,
    broadcaster: Broadcaster,
    /// Self-handle: worker tasks deliver store results back as messages.
    tx: mpsc::Sender<Msg>,
}

/// Recurring timer that fires one full period after start and re-arms
/// after each handled tick rather than correcting for drift.
fn tick_every(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Msg>) {
        info!("visitor analytics aggregator started");
        let mut cleanup = tick_every(CLEANUP_INTERVAL);
        let mut stats = tick_every(STATS_BROADCAST_INTERVAL);
        let mut hourly = tick_every(HOURLY_BROADCAST_INTERVAL);

        loop {
            tokio::select! {
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(Msg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = cleanup.tick() => self.handle(Msg::CleanupTick),
                _ = stats.tick() => self.handle(Msg::StatsBroadcastTick),
                _ = hourly.tick() => self.handle(Msg::HourlyBroadcastTick),
            }
        }
        info!("visitor analytics aggregator stopped");
    }

    /// All state access goes through here, on the actor task only.
    /// Durable-store I/O is spawned onto worker tasks — the mailbox must
    /// keep draining while the store is slow or down.
    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Ingest(event) => {
                let now = now_ms();
                let visit = NewVisit::from_event(&event, now);
                self.state.apply(event);
                self.broadcaster.publish(DashboardUpdate::NewVisit(visit));
                self.broadcaster.publish(DashboardUpdate::StatsUpdate(
                    StatsSnapshot::build(&self.state, now),
                ));
            }
            Msg::WindowCount(window, reply) => {
                let count = unique_sessions(&self.state.recent_visitors, window, now_ms());
                let _ = reply.send(count);
            }
            Msg::TopBreakdown(dimension, limit, reply) => {
                let _ = reply.send(self.top_breakdown(dimension, limit));
            }
            Msg::RecentVisitors(limit, reply) => {
                let _ = reply.send(self.visits(limit));
            }
            Msg::ActivityBuffer(limit, reply) => {
                let _ = reply.send(self.visits(limit));
            }
            Msg::Snapshot(reply) => {
                let _ = reply.send(StatsSnapshot::build(&self.state, now_ms()));
            }
            Msg::Overview(reply) => {
                let _ = reply.send(Overview {
                    stats: StatsSnapshot::build(&self.state, now_ms()),
                    recent_visitors: self.visits(RECENT_VISITORS_LIMIT),
                    activity_buffer: self.visits(ACTIVITY_BUFFER_LIMIT),
                });
            }
            Msg::HourlyHistogram(reply) => {
                let _ = reply.send(histogram::from_buffer(&self.state, now_ms()));
            }
            Msg::CleanupTick => {
                let evicted = self.state.evict_older_than(now_ms() - BUFFER_RETENTION_MS);
                if evicted > 0 {
                    debug!(evicted, "stale visits evicted from activity buffer");
                }
            }
            Msg::StatsBroadcastTick => {
                self.broadcaster.publish(DashboardUpdate::StatsUpdate(
                    StatsSnapshot::build(&self.state, now_ms()),
                ));
            }
            Msg::HourlyBroadcastTick => {
                // Runs off-actor. If the previous tick's query is still in
                // flight both publishes land; the later one wins on the
                // dashboard.
                let store = Arc::clone(&self.store);
                let broadcaster = self.broadcaster.clone();
                tokio::spawn(async move {
                    let series = histogram::from_store(store.as_ref(), now_ms()).await;
                    broadcaster.publish(DashboardUpdate::HourlyTraffic(HourlyTraffic {
                        hourly_traffic: series,
                    }));
                });
            }
            Msg::BootstrapAttempt(attempt) => self.bootstrap_attempt(attempt),
            Msg::BootstrapLoaded { visits, attempt } => self.bootstrap_loaded(visits, attempt),
            // Handled in the run loop before dispatch.
            Msg::Shutdown => {}
        }
    }

    fn visits(&self, limit: usize) -> Vec<VisitEvent> {
        self.state
            .recent_visitors
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    fn top_breakdown(&self, dimension: Dimension, limit: usize) -> TopBreakdown {
        let limit = if limit == 0 { DEFAULT_TOP_LIMIT } else { limit };
        match dimension {
            Dimension::Pages => TopBreakdown::Pages(page_rows(&self.state.page_counts, limit)),
            Dimension::Geographic => {
                TopBreakdown::Countries(country_rows(&self.state.geographic, limit))
            }
            Dimension::Referrers => {
                TopBreakdown::Referrers(referrer_rows(&self.state.referrers, limit))
            }
            Dimension::Bots => TopBreakdown::Named(named_rows(&self.state.bot_counts, limit)),
            Dimension::OperatingSystems => {
                TopBreakdown::Named(named_rows(&self.state.os_counts, limit))
            }
            Dimension::Browsers => {
                TopBreakdown::Named(named_rows(&self.state.browser_counts, limit))
            }
        }
    }

    /// Query the store for the trailing hour of visits, off-actor. Query
    /// failure is logged and degrades to an empty result, which flows
    /// into the same bounded-retry path as a genuinely empty store.
    fn bootstrap_attempt(&self, attempt: u32) {
        if self.state.recent_visitors.len() >= BOOTSTRAP_SKIP_LEN {
            debug!("skipping history preload, live traffic already populated the buffer");
            return;
        }
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let visits = store.visits_last_hour().await.unwrap_or_else(|e| {
                warn!(error = %e, attempt, "visit history preload query failed");
                Vec::new()
            });
            let _ = tx.send(Msg::BootstrapLoaded { visits, attempt }).await;
        });
    }

    fn bootstrap_loaded(&mut self, visits: Vec<VisitEvent>, attempt: u32) {
        if visits.is_empty() {
            if attempt < BOOTSTRAP_MAX_RETRIES {
                info!(attempt, "no visit history available yet, retrying preload");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(BOOTSTRAP_RETRY_DELAY).await;
                    let _ = tx.send(Msg::BootstrapAttempt(attempt + 1)).await;
                });
            } else {
                info!(
                    attempts = attempt + 1,
                    "visit history preload exhausted, continuing with live traffic only"
                );
            }
            return;
        }

        // Live traffic may have landed while the query was in flight;
        // re-check the threshold before replacing state wholesale.
        if self.state.recent_visitors.len() >= BOOTSTRAP_SKIP_LEN {
            debug!("discarding history preload, live traffic populated the buffer mid-flight");
            return;
        }

        info!(visits = visits.len(), "aggregation state preloaded from visit history");
        self.state = AggregationState::rebuild_from(visits);
    }
}
