//! Scan history data models.
//!
//! `ScanRecord` is the only durable entity: one row per completed capture
//! decision. After creation only `pinned` ever changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Rotten,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "Fresh",
            Freshness::Rotten => "Rotten",
        }
    }
}

/// One persisted scan outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Assigned by the store on insert; `None` for records not yet persisted.
    pub id: Option<i64>,
    pub fruit_name: String,
    /// Absent when no freshness model applies or confidence was too low.
    pub freshness: Option<Freshness>,
    pub confidence: f32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub pinned: bool,
}

/// Result of a pin/unpin request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum PinOutcome {
    Updated,
    NotFound,
    LimitReached { limit: i64 },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FreshnessFilter {
    #[default]
    All,
    Fresh,
    Rotten,
    /// Records without a freshness verdict.
    NotChecked,
}

/// History screen query: freshness chip plus a fruit-name search box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    pub freshness: FreshnessFilter,
    pub search: Option<String>,
}

impl HistoryFilter {
    /// Same predicate the SQL query applies (ASCII case-insensitive name match),
    /// for filtering live snapshots.
    pub fn matches(&self, record: &ScanRecord) -> bool {
        let freshness_ok = match self.freshness {
            FreshnessFilter::All => true,
            FreshnessFilter::Fresh => record.freshness == Some(Freshness::Fresh),
            FreshnessFilter::Rotten => record.freshness == Some(Freshness::Rotten),
            FreshnessFilter::NotChecked => record.freshness.is_none(),
        };

        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => record
                .fruit_name
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
        };

        freshness_ok && search_ok
    }
}
