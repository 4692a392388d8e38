use anyhow::{anyhow, Result};
use rusqlite::Row;

use crate::db::models::{Freshness, ScanRecord};

pub const SCAN_RECORD_COLUMNS: &str = "id, fruit_name, freshness, confidence, timestamp, pinned";

pub fn parse_freshness(value: Option<String>) -> Result<Option<Freshness>> {
    match value.as_deref() {
        None => Ok(None),
        Some("Fresh") => Ok(Some(Freshness::Fresh)),
        Some("Rotten") => Ok(Some(Freshness::Rotten)),
        Some(other) => Err(anyhow!("unknown freshness value {other}")),
    }
}

pub fn row_to_scan_record(row: &Row) -> Result<ScanRecord> {
    let confidence: f64 = row.get("confidence")?;
    let pinned: i64 = row.get("pinned")?;

    Ok(ScanRecord {
        id: Some(row.get("id")?),
        fruit_name: row.get("fruit_name")?,
        freshness: parse_freshness(row.get("freshness")?)?,
        confidence: confidence as f32,
        timestamp: row.get("timestamp")?,
        pinned: pinned != 0,
    })
}

/// Escapes `%`, `_` and `\` so user input matches literally inside LIKE.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
