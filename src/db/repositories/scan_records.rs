use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    helpers::{like_pattern, row_to_scan_record, SCAN_RECORD_COLUMNS},
    models::{FreshnessFilter, HistoryFilter, PinOutcome, ScanRecord},
    Database,
};

/// Upper bound on concurrently pinned records.
pub const MAX_PINNED: i64 = 3;

const HISTORY_ORDER: &str = "ORDER BY pinned DESC, timestamp DESC, id DESC";

pub(crate) fn load_history(conn: &Connection) -> Result<Vec<ScanRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_RECORD_COLUMNS} FROM scan_results {HISTORY_ORDER}"
    ))?;

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_scan_record(row)?);
    }

    Ok(records)
}

fn validate(record: &ScanRecord) -> Result<()> {
    if record.fruit_name.trim().is_empty() {
        bail!("fruit name must not be empty");
    }
    if !(0.0..=1.0).contains(&record.confidence) {
        bail!("confidence {} is outside [0, 1]", record.confidence);
    }
    Ok(())
}

impl Database {
    /// Persists a record and returns its id.
    /// A record carrying an id that already exists replaces that row. A pinned
    /// record is refused when [`MAX_PINNED`] other records are already pinned.
    pub async fn insert_scan_record(&self, record: &ScanRecord) -> Result<i64> {
        validate(record)?;
        let record = record.clone();
        self.mutate(move |conn| {
            if record.pinned {
                // The row being replaced does not count against the cap.
                let pinned_elsewhere: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM scan_results WHERE pinned = 1 AND id IS NOT ?1",
                    params![record.id],
                    |row| row.get(0),
                )?;
                if pinned_elsewhere >= MAX_PINNED {
                    bail!("Maximum of {} pinned scans reached", MAX_PINNED);
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO scan_results (id, fruit_name, freshness, confidence, timestamp, pinned)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.fruit_name,
                    record.freshness.map(|f| f.as_str()),
                    record.confidence as f64,
                    record.timestamp,
                    record.pinned,
                ],
            )
            .with_context(|| "failed to insert scan record")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// All records, pinned first, then newest first.
    pub async fn list_scan_records(&self) -> Result<Vec<ScanRecord>> {
        self.execute(|conn| load_history(conn)).await
    }

    pub async fn get_scan_record(&self, id: i64) -> Result<Option<ScanRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCAN_RECORD_COLUMNS} FROM scan_results WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_scan_record(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// History narrowed by freshness and a case-insensitive name search,
    /// in the same order as [`Database::list_scan_records`].
    pub async fn search_scan_records(&self, filter: &HistoryFilter) -> Result<Vec<ScanRecord>> {
        let filter = filter.clone();
        self.execute(move |conn| {
            let mut clauses = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            match filter.freshness {
                FreshnessFilter::All => {}
                FreshnessFilter::Fresh | FreshnessFilter::Rotten => {
                    let value = if filter.freshness == FreshnessFilter::Fresh {
                        "Fresh"
                    } else {
                        "Rotten"
                    };
                    clauses.push("freshness = ?");
                    params_vec.push(Box::new(value));
                }
                FreshnessFilter::NotChecked => clauses.push("freshness IS NULL"),
            }

            if let Some(needle) = filter.search.as_deref().map(str::trim) {
                if !needle.is_empty() {
                    clauses.push("fruit_name LIKE ? ESCAPE '\\'");
                    params_vec.push(Box::new(like_pattern(needle)));
                }
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let query = format!(
                "SELECT {SCAN_RECORD_COLUMNS} FROM scan_results {where_clause} {HISTORY_ORDER}"
            );

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params_refs.as_slice())?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_scan_record(row)?);
            }

            Ok(records)
        })
        .await
    }

    pub async fn pinned_count(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM scan_results WHERE pinned = 1",
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Pins or unpins one record. Pinning is refused once [`MAX_PINNED`]
    /// other records are pinned.
    pub async fn set_scan_pinned(&self, id: i64, pinned: bool) -> Result<PinOutcome> {
        self.mutate(move |conn| {
            let current: Option<bool> = conn
                .query_row(
                    "SELECT pinned FROM scan_results WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, i64>(0).map(|v| v != 0),
                )
                .optional()?;

            let Some(currently_pinned) = current else {
                return Ok(PinOutcome::NotFound);
            };

            // Count and update inside the same DB task so the cap cannot race.
            if pinned && !currently_pinned {
                let pinned_now: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM scan_results WHERE pinned = 1",
                    [],
                    |row| row.get(0),
                )?;
                if pinned_now >= MAX_PINNED {
                    return Ok(PinOutcome::LimitReached { limit: MAX_PINNED });
                }
            }

            conn.execute(
                "UPDATE scan_results SET pinned = ?1 WHERE id = ?2",
                params![pinned, id],
            )
            .with_context(|| "failed to update pinned flag")?;

            Ok(PinOutcome::Updated)
        })
        .await
    }

    /// Removes one record. Returns whether anything was deleted; a missing id
    /// is not an error.
    pub async fn delete_scan_record(&self, id: i64) -> Result<bool> {
        self.mutate(move |conn| {
            let rows_affected = conn
                .execute("DELETE FROM scan_results WHERE id = ?1", params![id])
                .with_context(|| "failed to delete scan record")?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn delete_all_scan_records(&self) -> Result<usize> {
        self.mutate(|conn| {
            let rows_affected = conn
                .execute("DELETE FROM scan_results", [])
                .with_context(|| "failed to clear scan history")?;
            Ok(rows_affected)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Freshness;
    use tempfile::tempdir;

    fn record(name: &str, timestamp: i64) -> ScanRecord {
        ScanRecord {
            id: None,
            fruit_name: name.to_string(),
            freshness: None,
            confidence: 0.9,
            timestamp,
            pinned: false,
        }
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();
        assert!(db.insert_scan_record(&record("  ", 1)).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();
        let mut bad = record("Apple", 1);
        bad.confidence = 1.5;
        assert!(db.insert_scan_record(&bad).await.is_err());
    }

    #[tokio::test]
    async fn explicit_id_replaces_existing_row() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();

        let id = db.insert_scan_record(&record("Apple", 1)).await.unwrap();
        let mut replacement = record("Banana", 2);
        replacement.id = Some(id);
        replacement.freshness = Some(Freshness::Fresh);
        let same_id = db.insert_scan_record(&replacement).await.unwrap();

        assert_eq!(id, same_id);
        let all = db.list_scan_records().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fruit_name, "Banana");
    }

    #[tokio::test]
    async fn search_filters_by_freshness_and_name() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();

        let mut fresh = record("Banana", 1);
        fresh.freshness = Some(Freshness::Fresh);
        let mut rotten = record("Banana", 2);
        rotten.freshness = Some(Freshness::Rotten);
        db.insert_scan_record(&fresh).await.unwrap();
        db.insert_scan_record(&rotten).await.unwrap();
        db.insert_scan_record(&record("Pineapple", 3)).await.unwrap();
        db.insert_scan_record(&record("Apple", 4)).await.unwrap();

        let not_checked = db
            .search_scan_records(&HistoryFilter {
                freshness: FreshnessFilter::NotChecked,
                search: None,
            })
            .await
            .unwrap();
        let names: Vec<_> = not_checked.iter().map(|r| r.fruit_name.as_str()).collect();
        assert_eq!(names, ["Apple", "Pineapple"]);

        let apples = db
            .search_scan_records(&HistoryFilter {
                freshness: FreshnessFilter::All,
                search: Some("APPLE".into()),
            })
            .await
            .unwrap();
        assert_eq!(apples.len(), 2);

        let rotten_only = db
            .search_scan_records(&HistoryFilter {
                freshness: FreshnessFilter::Rotten,
                search: Some("ban".into()),
            })
            .await
            .unwrap();
        assert_eq!(rotten_only.len(), 1);
        assert_eq!(rotten_only[0].timestamp, 2);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();
        db.insert_scan_record(&record("Kiwi", 1)).await.unwrap();

        let hits = db
            .search_scan_records(&HistoryFilter {
                freshness: FreshnessFilter::All,
                search: Some("%".into()),
            })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn repinning_a_pinned_record_does_not_count_twice() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("scans.sqlite3")).unwrap();

        let mut ids = Vec::new();
        for ts in 0..3 {
            let id = db.insert_scan_record(&record("Fig", ts)).await.unwrap();
            db.set_scan_pinned(id, true).await.unwrap();
            ids.push(id);
        }

        assert_eq!(
            db.set_scan_pinned(ids[0], true).await.unwrap(),
            PinOutcome::Updated
        );
        assert_eq!(db.pinned_count().await.unwrap(), 3);
    }
}
