use std::collections::{HashMap, VecDeque};

use livelytics_core::visit::{is_internal_referrer, VisitEvent};

/// Maximum number of visits retained in the activity buffer.
pub const RECENT_VISITORS_CAP: usize = 100;

/// Buffer entries older than this are evicted by the cleanup tick.
pub const BUFFER_RETENTION_MS: i64 = 60 * 60 * 1000;

/// The in-memory aggregation model. Owned exclusively by the aggregator
/// actor task — there is exactly one writer, enforced by the mailbox, so
/// no field needs a lock.
///
/// The count maps grow in key-space only (bounded in practice by the
/// finite set of paths, countries and agents seen) and are never pruned
/// for the lifetime of the process. Buffer eviction does not touch them.
#[derive(Debug, Default)]
pub struct AggregationState {
    /// Newest-first activity buffer, capped at [`RECENT_VISITORS_CAP`].
    pub recent_visitors: VecDeque<VisitEvent>,
    pub page_counts: HashMap<String, u64>,
    pub geographic: HashMap<String, u64>,
    pub referrers: HashMap<String, u64>,
    pub bot_counts: HashMap<String, u64>,
    pub os_counts: HashMap<String, u64>,
    pub browser_counts: HashMap<String, u64>,
}

impl AggregationState {
    /// Fold one visit into the state: prepend to the buffer (evicting the
    /// oldest entry past capacity) and bump every count map whose filter
    /// predicate the event satisfies.
    pub fn apply(&mut self, event: VisitEvent) {
        self.bump_counts(&event);
        self.recent_visitors.push_front(event);
        self.recent_visitors.truncate(RECENT_VISITORS_CAP);
    }

    fn bump_counts(&mut self, event: &VisitEvent) {
        bump(&mut self.page_counts, &event.path);

        if !event.country.is_empty() {
            bump(&mut self.geographic, &event.country);
        }

        if !event.referer.is_empty() && !is_internal_referrer(&event.referer) {
            bump(&mut self.referrers, &event.referer);
        }

        if let Some(bot_name) = &event.bot {
            bump(&mut self.bot_counts, bot_name);
        }

        if is_known(&event.os) {
            bump(&mut self.os_counts, &event.os);
        }

        if is_known(&event.browser) && event.bot.is_none() {
            bump(&mut self.browser_counts, &event.browser);
        }
    }

    /// Drop buffer entries with `timestamp < cutoff_ms`. Count maps are
    /// deliberately untouched — they track the whole process lifetime.
    /// Returns the number of evicted entries.
    pub fn evict_older_than(&mut self, cutoff_ms: i64) -> usize {
        let before = self.recent_visitors.len();
        self.recent_visitors.retain(|v| v.timestamp >= cutoff_ms);
        before - self.recent_visitors.len()
    }

    /// Rebuild state wholesale from an hour of durable-store rows, newest
    /// first. Count maps reflect *every* row; the buffer keeps only the
    /// most recent [`RECENT_VISITORS_CAP`] for the activity feed.
    pub fn rebuild_from(visits: Vec<VisitEvent>) -> Self {
        let mut state = Self::default();
        for visit in &visits {
            state.bump_counts(visit);
        }
        state.recent_visitors = visits
            .into_iter()
            .take(RECENT_VISITORS_CAP)
            .collect();
        state
    }
}

fn is_known(value: &str) -> bool {
    !value.is_empty() && value != "Unknown"
}

fn bump(map: &mut HashMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}
