//! `compaction_records` table — backing C15's persisted L2 summaries.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionRecord {
    pub user_id: String,
    pub summary: String,
    pub replaced_before: i64,
    pub created_at: i64,
}

impl Store {
    pub fn insert_compaction_record(&self, r: &CompactionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO compaction_records (user_id, summary, replaced_before, created_at)
             VALUES (?1,?2,?3,?4)",
            params![r.user_id, r.summary, r.replaced_before, r.created_at],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    /// Only the latest record is consulted.
    pub fn latest_compaction_record(&self, user_id: &str) -> Result<Option<CompactionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_id, summary, replaced_before, created_at FROM compaction_records
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT 1",
            params![user_id],
            |row| {
                Ok(CompactionRecord {
                    user_id: row.get(0)?,
                    summary: row.get(1)?,
                    replaced_before: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_is_returned() {
        let s = Store::open_in_memory().unwrap();
        s.insert_compaction_record(&CompactionRecord {
            user_id: "u1".into(),
            summary: "first".into(),
            replaced_before: 100,
            created_at: 100,
        })
        .unwrap();
        s.insert_compaction_record(&CompactionRecord {
            user_id: "u1".into(),
            summary: "second".into(),
            replaced_before: 200,
            created_at: 200,
        })
        .unwrap();
        let latest = s.latest_compaction_record("u1").unwrap().unwrap();
        assert_eq!(latest.summary, "second");
    }
}
