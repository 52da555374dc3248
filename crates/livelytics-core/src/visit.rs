use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single page-view occurrence, fully classified at the ingestion boundary.
///
/// The HTTP pipeline resolves IP, country and user-agent classification
/// *before* constructing the event; nothing downstream re-parses the agent
/// string. Empty strings stand in for absent optional fields, `"Unknown"`
/// for unclassifiable browser/os/device, and `bot: None` for human traffic.
/// Events are never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    pub path: String,
    pub agent: String,
    pub ip: String,
    /// ISO country code, or empty when geo resolution was unavailable.
    pub country: String,
    pub referer: String,
    /// Cookie-based pseudo-anonymous identifier used to dedupe unique
    /// visitors within a time window. Empty when the client sent none.
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub browser: String,
    pub os: String,
    pub device: String,
    /// Bot name when the agent was classified as a crawler.
    /// Serialized as the name string, or JSON `false` for human traffic —
    /// the dashboard wire contract predates this implementation.
    #[serde(with = "bot_flag")]
    pub bot: Option<String>,
}

impl Default for VisitEvent {
    fn default() -> Self {
        Self {
            path: String::new(),
            agent: String::new(),
            ip: String::new(),
            country: String::new(),
            referer: String::new(),
            session_id: String::new(),
            timestamp: now_ms(),
            browser: "Unknown".to_string(),
            os: "Unknown".to_string(),
            device: "Unknown".to_string(),
            bot: None,
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Referrer values that point back at the site itself (dev/local hosts).
/// These never count as acquisition sources.
const INTERNAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Return `true` if `referer` points at an internal host.
///
/// Empty referrers are not internal — they are simply absent, and the
/// caller filters those separately.
pub fn is_internal_referrer(referer: &str) -> bool {
    INTERNAL_HOSTS.iter().any(|host| referer.contains(host))
}

/// Humanize the distance between an event timestamp and `now_ms`,
/// e.g. "just now", "5 minutes ago", "2 hours ago".
pub fn time_ago(timestamp_ms: i64, now_ms: i64) -> String {
    let elapsed_secs = (now_ms - timestamp_ms).max(0) / 1000;
    match elapsed_secs {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(elapsed_secs / 60, "minute"),
        3600..=86_399 => plural(elapsed_secs / 3600, "hour"),
        _ => plural(elapsed_secs / 86_400, "day"),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Serde adapter keeping the `bot` wire contract: a bot name string, or
/// literal `false` when the visit is human.
pub mod bot_flag {
    use serde::de::{self, Deserializer, Visitor};
    use serde::{Serialize, Serializer};

    pub fn serialize<S: Serializer>(bot: &Option<String>, ser: S) -> Result<S::Ok, S::Error> {
        match bot {
            Some(name) => name.serialize(ser),
            None => false.serialize(ser),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        struct BotVisitor;

        impl<'de> Visitor<'de> for BotVisitor {
            type Value = Option<String>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a bot name string or false")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                if v {
                    Err(E::custom("bot flag cannot be literal true"))
                } else {
                    Ok(None)
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(v.to_string()))
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }
        }

        de.deserialize_any(BotVisitor)
    }
}
