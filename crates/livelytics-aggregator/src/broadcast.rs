use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use livelytics_core::visit::{time_ago, VisitEvent};

use crate::snapshot::StatsSnapshot;

/// Broadcast channel capacity. Slow dashboard consumers that lag more
/// than this many updates behind skip ahead rather than applying
/// backpressure to the aggregator.
const CHANNEL_CAPACITY: usize = 256;

/// A single classified visit as pushed to dashboards, annotated with a
/// humanized age.
#[derive(Debug, Clone, Serialize)]
pub struct NewVisit {
    pub path: String,
    pub country: String,
    pub agent: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    #[serde(with = "livelytics_core::visit::bot_flag")]
    pub bot: Option<String>,
    pub ip: String,
    pub session_id: String,
    pub timestamp: i64,
    pub time_ago: String,
}

impl NewVisit {
    pub fn from_event(event: &VisitEvent, now_ms: i64) -> Self {
        Self {
            path: event.path.clone(),
            country: event.country.clone(),
            agent: event.agent.clone(),
            browser: event.browser.clone(),
            os: event.os.clone(),
            device: event.device.clone(),
            bot: event.bot.clone(),
            ip: event.ip.clone(),
            session_id: event.session_id.clone(),
            timestamp: event.timestamp,
            time_ago: time_ago(event.timestamp, now_ms),
        }
    }
}

/// The trailing-hour per-minute traffic series payload.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyTraffic {
    pub hourly_traffic: Vec<u64>,
}

/// Everything the aggregator pushes to connected dashboards, on one
/// logical topic.
#[derive(Debug, Clone)]
pub enum DashboardUpdate {
    NewVisit(NewVisit),
    StatsUpdate(StatsSnapshot),
    HourlyTraffic(HourlyTraffic),
}

impl DashboardUpdate {
    pub fn event_name(&self) -> &'static str {
        match self {
            DashboardUpdate::NewVisit(_) => "new_visit",
            DashboardUpdate::StatsUpdate(_) => "stats_update",
            DashboardUpdate::HourlyTraffic(_) => "hourly_traffic_update",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            DashboardUpdate::NewVisit(v) => serde_json::json!(v),
            DashboardUpdate::StatsUpdate(s) => serde_json::json!(s),
            DashboardUpdate::HourlyTraffic(h) => serde_json::json!(h),
        }
    }
}

/// Topic-based fan-out to dashboard clients, backed by a tokio broadcast
/// channel. The transport (WebSocket handlers) subscribes; the aggregator
/// publishes. Publishing with no subscribers is a no-op.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<DashboardUpdate>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.tx.subscribe()
    }

    pub fn publish(&self, update: DashboardUpdate) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        if let Ok(delivered) = self.tx.send(update) {
            debug!(receivers = delivered, "dashboard update published");
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(DashboardUpdate::HourlyTraffic(HourlyTraffic {
            hourly_traffic: vec![0; 60],
        }));
    }

    #[tokio::test]
    async fn subscribers_receive_published_updates() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(DashboardUpdate::HourlyTraffic(HourlyTraffic {
            hourly_traffic: vec![1; 60],
        }));
        let update = rx.recv().await.expect("receive update");
        assert_eq!(update.event_name(), "hourly_traffic_update");
        assert_eq!(update.payload()["hourly_traffic"][0], 1);
    }

    #[test]
    fn new_visit_carries_humanized_age() {
        let event = VisitEvent {
            path: "/menu".to_string(),
            timestamp: 0,
            ..VisitEvent::default()
        };
        let visit = NewVisit::from_event(&event, 5 * 60_000);
        assert_eq!(visit.time_ago, "5 minutes ago");
        let json = serde_json::to_value(&visit).expect("serialize");
        assert_eq!(json["bot"], serde_json::Value::Bool(false));
    }
}
