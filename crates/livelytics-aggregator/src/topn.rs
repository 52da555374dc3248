use std::collections::HashMap;

use serde::Serialize;

/// Default number of entries in a ranked breakdown.
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// The count maps a breakdown can be ranked over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Pages,
    Geographic,
    Referrers,
    Bots,
    OperatingSystems,
    Browsers,
}

impl Dimension {
    pub fn parse(raw: &str) -> Option<Dimension> {
        match raw {
            "pages" => Some(Dimension::Pages),
            "countries" => Some(Dimension::Geographic),
            "referrers" => Some(Dimension::Referrers),
            "bots" => Some(Dimension::Bots),
            "os" => Some(Dimension::OperatingSystems),
            "browsers" => Some(Dimension::Browsers),
            _ => None,
        }
    }
}

/// Rank a count map: count descending, key ascending on ties, first
/// `limit` entries. The tie-break keeps the output stable, so ranking an
/// unchanged map twice yields identical ordered output.
pub fn top_n(counts: &HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}

// Ranked rows carry a per-dimension label key on the wire: `path` for
// pages, `country` for geography, `referrer` for acquisition, and `name`
// for bots, operating systems and browsers.

#[derive(Debug, Clone, Serialize)]
pub struct PageCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

pub fn page_rows(counts: &HashMap<String, u64>, limit: usize) -> Vec<PageCount> {
    top_n(counts, limit)
        .into_iter()
        .map(|(path, count)| PageCount { path, count })
        .collect()
}

pub fn country_rows(counts: &HashMap<String, u64>, limit: usize) -> Vec<CountryCount> {
    top_n(counts, limit)
        .into_iter()
        .map(|(country, count)| CountryCount { country, count })
        .collect()
}

pub fn referrer_rows(counts: &HashMap<String, u64>, limit: usize) -> Vec<ReferrerCount> {
    top_n(counts, limit)
        .into_iter()
        .map(|(referrer, count)| ReferrerCount { referrer, count })
        .collect()
}

pub fn named_rows(counts: &HashMap<String, u64>, limit: usize) -> Vec<NamedCount> {
    top_n(counts, limit)
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect()
}

/// A ranked breakdown for one dimension, serialized with that dimension's
/// label key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TopBreakdown {
    Pages(Vec<PageCount>),
    Countries(Vec<CountryCount>),
    Referrers(Vec<ReferrerCount>),
    Named(Vec<NamedCount>),
}
