use crate::batch::BatchSummary;
use crate::error::AppError;
use crate::types::{HistoryRecord, UnifiedRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;

const SCHEMA_VERSION: i64 = 1;

const SELECT_HISTORY: &str = "SELECT id, created_at, source_name, language, page_count, succeeded, failed, unified_data, status, error_message FROM history";

pub struct Db {
    conn: Mutex<Connection>,
}

/// `success` with no failures, `failed` with no successes, `partial` otherwise.
pub fn history_status(summary: &BatchSummary) -> &'static str {
    if summary.failed == 0 {
        "success"
    } else if summary.succeeded == 0 {
        "failed"
    } else {
        "partial"
    }
}

impl Db {
    pub fn new(db_path: PathBuf) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                source_name TEXT NOT NULL,
                language TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                succeeded INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                unified_data TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_history_created ON history(created_at);
            ",
        )?;
        conn.execute(
            "INSERT INTO schema_version (version) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AppError> {
        self.conn.lock().map_err(|e| AppError::Database(e.to_string()))
    }

    pub fn add_history_record(
        &self,
        source_name: &str,
        language: &str,
        summary: &BatchSummary,
        unified: &UnifiedRecord,
        error_message: Option<&str>,
    ) -> Result<i64, AppError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let data_str = serde_json::to_string(unified)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (created_at, source_name, language, page_count, succeeded, failed, unified_data, status, error_message) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                created_at,
                source_name,
                language,
                summary.total as i64,
                summary.succeeded as i64,
                summary.failed as i64,
                data_str,
                history_status(summary),
                error_message
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first. `search` matches source name or stored field values.
    pub fn get_history(&self, search: Option<&str>) -> Result<Vec<HistoryRecord>, AppError> {
        let conn = self.lock()?;
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let mut out = Vec::new();
        match search {
            Some(s) => {
                let pattern = format!("%{}%", s);
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE (source_name LIKE ?1 OR unified_data LIKE ?1) ORDER BY created_at DESC, id DESC",
                    SELECT_HISTORY
                ))?;
                let rows = stmt.query_map(params![pattern], row_to_record)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_HISTORY))?;
                let rows = stmt.query_map([], row_to_record)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    pub fn get_history_by_id(&self, id: i64) -> Result<Option<HistoryRecord>, AppError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_HISTORY),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Replace the stored unified data, e.g. after the user corrected fields.
    pub fn update_unified_data(&self, id: i64, unified: &UnifiedRecord) -> Result<(), AppError> {
        let data_str = serde_json::to_string(unified)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE history SET unified_data = ? WHERE id = ?",
            params![data_str, id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("history record {}", id)));
        }
        Ok(())
    }

    pub fn delete_history_record(&self, id: i64) -> Result<(), AppError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM history WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("history record {}", id)));
        }
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let data: String = row.get(7)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        source_name: row.get(2)?,
        language: row.get(3)?,
        page_count: row.get(4)?,
        succeeded: row.get(5)?,
        failed: row.get(6)?,
        unified_data: serde_json::from_str(&data).unwrap_or(Value::String(data)),
        status: row.get(8)?,
        error_message: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unified(name: &str) -> UnifiedRecord {
        let mut record = UnifiedRecord::default();
        record.fields.insert("Name".into(), name.into());
        record
    }

    fn summary(succeeded: usize, failed: usize) -> BatchSummary {
        BatchSummary {
            total: succeeded + failed,
            succeeded,
            failed,
        }
    }

    #[test]
    fn status_reflects_outcome_mix() {
        assert_eq!(history_status(&summary(3, 0)), "success");
        assert_eq!(history_status(&summary(2, 1)), "partial");
        assert_eq!(history_status(&summary(0, 2)), "failed");
    }

    #[test]
    fn records_round_trip_and_search() {
        let db = Db::open_in_memory().unwrap();
        let first = db
            .add_history_record("passport.pdf", "en", &summary(2, 0), &unified("Alice"), None)
            .unwrap();
        let second = db
            .add_history_record(
                "scan_1.png",
                "ko",
                &summary(1, 1),
                &unified("Kim"),
                Some("Processed 1/2 successfully, 1 failed"),
            )
            .unwrap();

        let all = db.get_history(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second);

        let hits = db.get_history(Some("Alice")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, first);
        assert_eq!(hits[0].unified_data["fields"]["Name"], "Alice");

        let record = db.get_history_by_id(second).unwrap().unwrap();
        assert_eq!(record.status, "partial");
        assert_eq!(record.language, "ko");
        assert_eq!(record.page_count, 2);
        assert_eq!(
            record.error_message.as_deref(),
            Some("Processed 1/2 successfully, 1 failed")
        );
    }

    #[test]
    fn update_and_delete() {
        let db = Db::open_in_memory().unwrap();
        let id = db
            .add_history_record("a.png", "en", &summary(1, 0), &unified("Old"), None)
            .unwrap();
        db.update_unified_data(id, &unified("New")).unwrap();
        let record = db.get_history_by_id(id).unwrap().unwrap();
        assert_eq!(record.unified_data["fields"]["Name"], "New");

        db.delete_history_record(id).unwrap();
        assert!(db.get_history_by_id(id).unwrap().is_none());
        assert!(matches!(db.delete_history_record(id), Err(AppError::NotFound(_))));
        assert!(matches!(
            db.update_unified_data(id, &unified("x")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn file_database_is_created_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let db = Db::new(path.clone()).unwrap();
        db.add_history_record("a.png", "en", &summary(1, 0), &unified("A"), None)
            .unwrap();
        drop(db);
        let reopened = Db::new(path).unwrap();
        assert_eq!(reopened.get_history(None).unwrap().len(), 1);
    }
}
