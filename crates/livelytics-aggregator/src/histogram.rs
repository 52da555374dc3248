use std::collections::HashSet;

use tracing::warn;

use crate::state::AggregationState;
use crate::store::VisitStore;

/// Number of per-minute buckets in the hourly traffic series.
pub const HISTOGRAM_MINUTES: usize = 60;

const MINUTE_MS: i64 = 60 * 1000;

/// Bucket `(session_id, timestamp)` stamps into distinct-session counts
/// per trailing minute. Index 0 is the current minute. Empty sessions and
/// stamps bucketed past index 58 are skipped; the output is always
/// exactly [`HISTOGRAM_MINUTES`] long.
pub fn minute_buckets<'a, I>(stamps: I, now_ms: i64) -> Vec<u64>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut buckets: Vec<HashSet<&str>> = vec![HashSet::new(); HISTOGRAM_MINUTES];
    for (session_id, timestamp) in stamps {
        if session_id.is_empty() {
            continue;
        }
        // div_euclid floors, so stamps from the future bucket negative
        // and fall outside the range below.
        let minutes_ago = (now_ms - timestamp).div_euclid(MINUTE_MS);
        if !(0..59).contains(&minutes_ago) {
            continue;
        }
        buckets[minutes_ago as usize].insert(session_id);
    }
    buckets.into_iter().map(|set| set.len() as u64).collect()
}

/// Hourly series from the in-memory activity buffer.
///
/// Used for direct queries only — the buffer's 100-entry cap cannot
/// reliably cover a full hour under moderate traffic, so the scheduled
/// hourly broadcast goes to the durable store instead.
pub fn from_buffer(state: &AggregationState, now_ms: i64) -> Vec<u64> {
    minute_buckets(
        state
            .recent_visitors
            .iter()
            .map(|v| (v.session_id.as_str(), v.timestamp)),
        now_ms,
    )
}

/// Authoritative hourly series from the durable store.
///
/// A failed query is logged and degrades to sixty zeros — the dashboard
/// always receives a well-formed array.
pub async fn from_store(store: &dyn VisitStore, now_ms: i64) -> Vec<u64> {
    match store.session_activity_last_hour().await {
        Ok(stamps) => minute_buckets(
            stamps.iter().map(|s| (s.session_id.as_str(), s.timestamp)),
            now_ms,
        ),
        Err(e) => {
            warn!(error = %e, "hourly traffic query failed, returning empty series");
            vec![0; HISTOGRAM_MINUTES]
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use livelytics_core::visit::VisitEvent;

    use crate::store::SessionStamp;

    use super::*;

    #[test]
    fn always_sixty_buckets() {
        assert_eq!(minute_buckets(std::iter::empty(), 0).len(), HISTOGRAM_MINUTES);
    }

    #[test]
    fn stamps_land_in_their_minute_bucket() {
        let now = 10 * MINUTE_MS;
        let stamps = vec![
            ("a", now),                  // current minute
            ("b", now - 30_000),         // still current minute
            ("c", now - 2 * MINUTE_MS),  // two minutes ago
        ];
        let series = minute_buckets(stamps.iter().map(|(s, t)| (*s, *t)), now);
        assert_eq!(series[0], 2);
        assert_eq!(series[1], 0);
        assert_eq!(series[2], 1);
    }

    #[test]
    fn duplicate_sessions_count_once_per_bucket() {
        let now = MINUTE_MS;
        let stamps = vec![("a", now), ("a", now - 10_000), ("a", now - 20_000)];
        let series = minute_buckets(stamps.iter().map(|(s, t)| (*s, *t)), now);
        assert_eq!(series[0], 1);
    }

    #[test]
    fn empty_sessions_and_out_of_range_stamps_are_skipped() {
        let now = 100 * MINUTE_MS;
        let stamps = vec![
            ("", now),                    // empty session
            ("a", now - 59 * MINUTE_MS),  // past the bucketed range
            ("b", now + 2 * MINUTE_MS),   // future stamp
        ];
        let series = minute_buckets(stamps.iter().map(|(s, t)| (*s, *t)), now);
        assert!(series.iter().all(|&n| n == 0));
    }

    #[test]
    fn buffer_path_returns_sixty_zeros_when_empty() {
        let series = from_buffer(&AggregationState::default(), 0);
        assert_eq!(series.len(), HISTOGRAM_MINUTES);
        assert!(series.iter().all(|&n| n == 0));
    }

    #[test]
    fn buffer_path_counts_distinct_sessions() {
        let mut state = AggregationState::default();
        let now = 10 * MINUTE_MS;
        for session in ["a", "b", "a"] {
            state.apply(VisitEvent {
                session_id: session.to_string(),
                timestamp: now,
                ..VisitEvent::default()
            });
        }
        let series = from_buffer(&state, now);
        assert_eq!(series[0], 2);
    }

    struct DownStore;

    #[async_trait]
    impl VisitStore for DownStore {
        async fn visits_last_hour(&self) -> anyhow::Result<Vec<VisitEvent>> {
            Err(anyhow!("connection refused"))
        }

        async fn session_activity_last_hour(&self) -> anyhow::Result<Vec<SessionStamp>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn store_failure_degrades_to_zeros() {
        let series = from_store(&DownStore, 0).await;
        assert_eq!(series.len(), HISTOGRAM_MINUTES);
        assert!(series.iter().all(|&n| n == 0));
    }

    struct StampStore(Vec<SessionStamp>);

    #[async_trait]
    impl VisitStore for StampStore {
        async fn visits_last_hour(&self) -> anyhow::Result<Vec<VisitEvent>> {
            Ok(Vec::new())
        }

        async fn session_activity_last_hour(&self) -> anyhow::Result<Vec<SessionStamp>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn store_path_buckets_like_the_buffer_path() {
        let now = 30 * MINUTE_MS;
        let store = StampStore(vec![
            SessionStamp {
                session_id: "a".to_string(),
                timestamp: now - 5 * MINUTE_MS,
            },
            SessionStamp {
                session_id: "b".to_string(),
                timestamp: now - 5 * MINUTE_MS,
            },
        ]);
        let series = from_store(&store, now).await;
        assert_eq!(series[5], 2);
        assert_eq!(series.iter().sum::<u64>(), 2);
    }
}
