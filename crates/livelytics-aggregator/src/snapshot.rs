use serde::Serialize;

use livelytics_core::visit::VisitEvent;

use crate::state::AggregationState;
use crate::topn::{
    country_rows, named_rows, page_rows, referrer_rows, CountryCount, NamedCount, PageCount,
    ReferrerCount, DEFAULT_TOP_LIMIT,
};
use crate::windows::{unique_sessions, Window};

/// The full `stats_update` payload: unique-session counts over all six
/// trailing windows plus every top-10 breakdown. Built fresh from actor
/// state on each ingest and on every stats broadcast tick.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub last_minute_count: usize,
    pub last_30_minutes_count: usize,
    pub last_hour_count: usize,
    pub last_6_hours_count: usize,
    pub last_12_hours_count: usize,
    pub last_24_hours_count: usize,
    pub top_pages: Vec<PageCount>,
    pub geographic: Vec<CountryCount>,
    pub top_referrers: Vec<ReferrerCount>,
    pub bot_counts: Vec<NamedCount>,
    pub os_counts: Vec<NamedCount>,
    pub browser_counts: Vec<NamedCount>,
}

impl StatsSnapshot {
    pub fn build(state: &AggregationState, now_ms: i64) -> Self {
        let count =
            |window: Window| unique_sessions(&state.recent_visitors, window, now_ms);
        Self {
            last_minute_count: count(Window::LastMinute),
            last_30_minutes_count: count(Window::Last30Minutes),
            last_hour_count: count(Window::LastHour),
            last_6_hours_count: count(Window::Last6Hours),
            last_12_hours_count: count(Window::Last12Hours),
            last_24_hours_count: count(Window::Last24Hours),
            top_pages: page_rows(&state.page_counts, DEFAULT_TOP_LIMIT),
            geographic: country_rows(&state.geographic, DEFAULT_TOP_LIMIT),
            top_referrers: referrer_rows(&state.referrers, DEFAULT_TOP_LIMIT),
            bot_counts: named_rows(&state.bot_counts, DEFAULT_TOP_LIMIT),
            os_counts: named_rows(&state.os_counts, DEFAULT_TOP_LIMIT),
            browser_counts: named_rows(&state.browser_counts, DEFAULT_TOP_LIMIT),
        }
    }
}

/// The dashboard's initial-load payload: a stats snapshot plus the two
/// visit panels, read in one consistent pass over actor state.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub recent_visitors: Vec<VisitEvent>,
    pub activity_buffer: Vec<VisitEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_ingested_visits() {
        let mut state = AggregationState::default();
        for i in 0..4 {
            state.apply(VisitEvent {
                path: "/menu".to_string(),
                session_id: format!("s{i}"),
                timestamp: 1_000 + i,
                ..VisitEvent::default()
            });
        }

        let snapshot = StatsSnapshot::build(&state, 2_000);
        assert_eq!(snapshot.last_minute_count, 4);
        assert_eq!(snapshot.last_24_hours_count, 4);
        assert_eq!(snapshot.top_pages.len(), 1);
        assert_eq!(snapshot.top_pages[0].path, "/menu");
        assert_eq!(snapshot.top_pages[0].count, 4);
    }

    #[test]
    fn empty_state_produces_zeroed_snapshot() {
        let snapshot = StatsSnapshot::build(&AggregationState::default(), 0);
        assert_eq!(snapshot.last_hour_count, 0);
        assert!(snapshot.top_pages.is_empty());
        assert!(snapshot.geographic.is_empty());
        assert!(snapshot.browser_counts.is_empty());
    }

    #[test]
    fn breakdowns_are_capped_at_ten() {
        let mut state = AggregationState::default();
        for i in 0..15 {
            state.apply(VisitEvent {
                path: format!("/p{i}"),
                session_id: format!("s{i}"),
                timestamp: 0,
                ..VisitEvent::default()
            });
        }
        let snapshot = StatsSnapshot::build(&state, 0);
        assert_eq!(snapshot.top_pages.len(), 10);
    }
}
