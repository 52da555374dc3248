//! User-agent classification and GeoIP lookup for the ingestion path.
//!
//! Both are pure lookups the request handler runs *before* constructing a
//! [`livelytics_core::visit::VisitEvent`]; everything downstream consumes
//! the classified fields only.

/// Parsed User-Agent fields, normalized for aggregation: `"Unknown"` for
/// anything woothee cannot classify, and the crawler name in `bot` when
/// the agent is not a browser at all.
#[derive(Debug, Clone)]
pub struct Classification {
    pub browser: String,
    pub os: String,
    pub device: String,
    pub bot: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            browser: "Unknown".to_string(),
            os: "Unknown".to_string(),
            device: "Unknown".to_string(),
            bot: None,
        }
    }
}

/// Classify a `User-Agent` string via the `woothee` crate.
///
/// Empty or unparseable agents degrade to `"Unknown"` fields rather than
/// failing — unclassified traffic still counts as traffic.
pub fn classify_agent(agent: &str) -> Classification {
    if agent.is_empty() {
        return Classification::unknown();
    }

    let Some(result) = woothee::parser::Parser::new().parse(agent) else {
        return Classification::unknown();
    };

    // woothee `category` maps to our device convention:
    //   "smartphone" / "mobilephone" → "mobile"
    //   "tablet"                     → "tablet"
    //   "crawler"                    → "bot"
    //   everything else              → "desktop" (conservative default)
    let device = match result.category {
        "smartphone" | "mobilephone" => "mobile",
        "tablet" => "tablet",
        "crawler" => "bot",
        _ => "desktop",
    }
    .to_string();

    let bot = (result.category == "crawler").then(|| result.name.to_string());

    Classification {
        browser: normalize(result.name),
        os: normalize(result.os),
        device,
        bot,
    }
}

/// woothee reports unknowns as "UNKNOWN" (or empty); fold both into the
/// single "Unknown" value the count-map predicates test against.
fn normalize(value: &str) -> String {
    if value.is_empty() || value == "UNKNOWN" {
        "Unknown".to_string()
    } else {
        value.to_string()
    }
}

/// Attempt a GeoIP country lookup for `ip` using the MaxMind database at
/// `path`. Returns the ISO country code, or an empty string if the
/// database file is missing or the IP cannot be resolved — events are
/// stored without geography rather than rejected.
pub fn lookup_country(path: &str, ip: &str) -> String {
    use std::net::IpAddr;
    use std::str::FromStr;

    let lookup = || -> Option<String> {
        if !std::path::Path::new(path).exists() {
            // Database absent — non-fatal. Warning already logged at startup.
            return None;
        }
        let reader = maxminddb::Reader::open_readfile(path).ok()?;
        let ip_addr = IpAddr::from_str(ip).ok()?;
        let record: maxminddb::geoip2::Country = reader.lookup(ip_addr).ok()?.decode().ok()??;
        record
            .country
            .iso_code
            .map(|s| s.to_string())
    };

    lookup().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn desktop_browser_is_classified() {
        let c = classify_agent(CHROME_LINUX);
        assert_eq!(c.browser, "Chrome");
        assert_eq!(c.os, "Linux");
        assert_eq!(c.device, "desktop");
        assert_eq!(c.bot, None);
    }

    #[test]
    fn crawlers_carry_their_bot_name() {
        let c = classify_agent(GOOGLEBOT);
        assert_eq!(c.bot.as_deref(), Some("Googlebot"));
        assert_eq!(c.device, "bot");
    }

    #[test]
    fn empty_agent_degrades_to_unknown() {
        let c = classify_agent("");
        assert_eq!(c.browser, "Unknown");
        assert_eq!(c.os, "Unknown");
        assert_eq!(c.device, "Unknown");
        assert_eq!(c.bot, None);
    }

    #[test]
    fn missing_geoip_database_yields_empty_country() {
        assert_eq!(lookup_country("/nonexistent/GeoLite2-City.mmdb", "1.2.3.4"), "");
    }
}
