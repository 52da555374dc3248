use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use livelytics_core::visit::VisitEvent;

/// One `(session_id, timestamp)` row from the durable store, feeding the
/// hourly traffic series.
#[derive(Debug, Clone)]
pub struct SessionStamp {
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Read-only view of the durable visit log. The aggregator consumes
/// exactly two query shapes: the full last hour of visits (cold-start
/// preload) and the last hour of session stamps (hourly traffic series).
/// Writing the log is the ingestion pipeline's concern, not ours.
#[async_trait]
pub trait VisitStore: Send + Sync + 'static {
    /// All visits in the trailing hour, newest first.
    async fn visits_last_hour(&self) -> Result<Vec<VisitEvent>>;

    /// `(session_id, timestamp)` for all trailing-hour rows with a
    /// non-empty session.
    async fn session_activity_last_hour(&self) -> Result<Vec<SessionStamp>>;
}

/// HTTP client for a ClickHouse-backed visit log.
///
/// Uses ClickHouse's HTTP API: SQL is posted as the request body; named
/// parameters are passed as `param_<name>` query-string entries, allowing
/// ClickHouse to substitute them safely (no SQL injection).
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseStore {
    pub fn new(url: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        }
    }

    /// Execute a SELECT and return the `data` array of the JSON response.
    async fn query(&self, sql: &str) -> Result<Vec<Value>> {
        let mut url = reqwest::Url::parse(&self.url).context("invalid store URL")?;
        url.query_pairs_mut()
            .append_pair("default_format", "JSON")
            .append_pair("database", &self.database);

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await
            .context("store HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("store error {status}: {body}");
        }

        let json: Value = resp.json().await.context("store response parse failed")?;
        Ok(json
            .get("data")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl VisitStore for ClickHouseStore {
    async fn visits_last_hour(&self) -> Result<Vec<VisitEvent>> {
        let rows = self
            .query(
                "SELECT path, agent, ip, referer, country, session_id, \
                        toUnixTimestamp64Milli(inserted_at) AS ts, \
                        browser, os, device, bot \
                 FROM visits \
                 WHERE inserted_at >= now() - INTERVAL 1 HOUR \
                 ORDER BY inserted_at DESC",
            )
            .await?;

        Ok(rows.iter().map(visit_from_row).collect())
    }

    async fn session_activity_last_hour(&self) -> Result<Vec<SessionStamp>> {
        let rows = self
            .query(
                "SELECT session_id, toUnixTimestamp64Milli(inserted_at) AS ts \
                 FROM visits \
                 WHERE inserted_at >= now() - INTERVAL 1 HOUR \
                   AND session_id != ''",
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| SessionStamp {
                session_id: field_str(row, "session_id"),
                timestamp: field_i64(row, "ts"),
            })
            .collect())
    }
}

fn visit_from_row(row: &Value) -> VisitEvent {
    let bot = match field_str(row, "bot") {
        name if name.is_empty() => None,
        name => Some(name),
    };
    VisitEvent {
        path: field_str(row, "path"),
        agent: field_str(row, "agent"),
        ip: field_str(row, "ip"),
        country: field_str(row, "country"),
        referer: field_str(row, "referer"),
        session_id: field_str(row, "session_id"),
        timestamp: field_i64(row, "ts"),
        browser: field_or_unknown(row, "browser"),
        os: field_or_unknown(row, "os"),
        device: field_or_unknown(row, "device"),
        bot,
    }
}

fn field_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn field_or_unknown(row: &Value, key: &str) -> String {
    match field_str(row, key) {
        value if value.is_empty() => "Unknown".to_string(),
        value => value,
    }
}

/// 64-bit integers arrive as JSON strings from ClickHouse's JSON format;
/// accept either representation.
fn field_i64(row: &Value, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn visit_row_parses_typed_fields() {
        let row = json!({
            "path": "/menu",
            "agent": "Mozilla/5.0",
            "ip": "1.2.3.4",
            "referer": "https://google.com",
            "country": "DE",
            "session_id": "abc",
            "ts": "1700000000000",
            "browser": "Chrome",
            "os": "Linux",
            "device": "desktop",
            "bot": ""
        });
        let visit = visit_from_row(&row);
        assert_eq!(visit.path, "/menu");
        assert_eq!(visit.timestamp, 1_700_000_000_000);
        assert_eq!(visit.bot, None);
        assert_eq!(visit.browser, "Chrome");
    }

    #[test]
    fn missing_fields_degrade_to_defaults() {
        let visit = visit_from_row(&json!({ "path": "/" }));
        assert_eq!(visit.path, "/");
        assert_eq!(visit.session_id, "");
        assert_eq!(visit.timestamp, 0);
        assert_eq!(visit.browser, "Unknown");
        assert_eq!(visit.os, "Unknown");
        assert_eq!(visit.bot, None);
    }

    #[test]
    fn bot_column_maps_empty_to_human() {
        let visit = visit_from_row(&json!({ "bot": "Googlebot" }));
        assert_eq!(visit.bot, Some("Googlebot".to_string()));
    }

    #[test]
    fn numeric_timestamps_are_accepted_too() {
        let visit = visit_from_row(&json!({ "ts": 42 }));
        assert_eq!(visit.timestamp, 42);
    }
}
