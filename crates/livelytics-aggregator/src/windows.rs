use std::collections::HashSet;

use livelytics_core::visit::VisitEvent;

/// The six trailing windows the dashboard tracks unique visitors over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    LastMinute,
    Last30Minutes,
    LastHour,
    Last6Hours,
    Last12Hours,
    Last24Hours,
}

impl Window {
    pub const ALL: [Window; 6] = [
        Window::LastMinute,
        Window::Last30Minutes,
        Window::LastHour,
        Window::Last6Hours,
        Window::Last12Hours,
        Window::Last24Hours,
    ];

    pub fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        match self {
            Window::LastMinute => MINUTE,
            Window::Last30Minutes => 30 * MINUTE,
            Window::LastHour => 60 * MINUTE,
            Window::Last6Hours => 6 * 60 * MINUTE,
            Window::Last12Hours => 12 * 60 * MINUTE,
            Window::Last24Hours => 24 * 60 * MINUTE,
        }
    }

    /// Parse the short form used in query strings: `1m`, `30m`, `1h`,
    /// `6h`, `12h`, `24h`.
    pub fn parse(raw: &str) -> Option<Window> {
        match raw {
            "1m" => Some(Window::LastMinute),
            "30m" => Some(Window::Last30Minutes),
            "1h" => Some(Window::LastHour),
            "6h" => Some(Window::Last6Hours),
            "12h" => Some(Window::Last12Hours),
            "24h" => Some(Window::Last24Hours),
            _ => None,
        }
    }
}

/// Count distinct non-empty sessions among `events` whose timestamp falls
/// within the trailing `window` ending at `now_ms`.
///
/// All six windows read the same capped activity buffer, so a window
/// longer than the buffer's actual time span under-counts once traffic
/// exceeds the buffer capacity within that span. That memory/accuracy
/// trade-off is intentional and relied upon by the dashboard.
pub fn unique_sessions<'a, I>(events: I, window: Window, now_ms: i64) -> usize
where
    I: IntoIterator<Item = &'a VisitEvent>,
{
    let cutoff = now_ms - window.duration_ms();
    let sessions: HashSet<&str> = events
        .into_iter()
        .filter(|v| v.timestamp >= cutoff)
        .map(|v| v.session_id.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(session: &str, ts: i64) -> VisitEvent {
        VisitEvent {
            path: "/".to_string(),
            session_id: session.to_string(),
            timestamp: ts,
            ..VisitEvent::default()
        }
    }

    #[test]
    fn same_session_counts_once_per_window() {
        // Three hits for one session at t=0, t=1000, t=61000.
        let events = vec![visit("s1", 0), visit("s1", 1_000), visit("s1", 61_000)];

        // At now=61500 only the third hit is inside the last minute, and
        // the session still counts exactly once.
        assert_eq!(
            unique_sessions(&events, Window::LastMinute, 61_500),
            1
        );
        // The 30-minute window sees all three hits — same session, still 1.
        assert_eq!(
            unique_sessions(&events, Window::Last30Minutes, 61_500),
            1
        );
    }

    #[test]
    fn events_outside_the_window_are_excluded() {
        let events = vec![visit("a", 0), visit("b", 50_000)];
        assert_eq!(unique_sessions(&events, Window::LastMinute, 70_000), 1);
        assert_eq!(unique_sessions(&events, Window::Last30Minutes, 70_000), 2);
    }

    #[test]
    fn boundary_timestamp_is_included() {
        // timestamp == now - w is inside the window (>= comparison).
        let events = vec![visit("a", 10_000)];
        assert_eq!(unique_sessions(&events, Window::LastMinute, 70_000), 1);
        assert_eq!(unique_sessions(&events, Window::LastMinute, 70_001), 0);
    }

    #[test]
    fn empty_sessions_are_dropped() {
        let events = vec![visit("", 1_000), visit("", 2_000), visit("s", 3_000)];
        assert_eq!(unique_sessions(&events, Window::LastMinute, 3_000), 1);
    }

    #[test]
    fn window_parse_round_trip() {
        for (raw, window) in [
            ("1m", Window::LastMinute),
            ("30m", Window::Last30Minutes),
            ("1h", Window::LastHour),
            ("6h", Window::Last6Hours),
            ("12h", Window::Last12Hours),
            ("24h", Window::Last24Hours),
        ] {
            assert_eq!(Window::parse(raw), Some(window));
        }
        assert_eq!(Window::parse("2h"), None);
    }
}
