//! `task_metrics` table — append-only samples consumed by the timeout
//! estimator (C10).

use rusqlite::params;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetric {
    pub user_id: String,
    pub task_type: String,
    pub tier: String,
    pub duration_ms: u64,
    pub iterations: u32,
    pub success: bool,
    pub created_at: i64,
}

impl Store {
    pub fn record_task_metric(&self, m: &TaskMetric) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO task_metrics (user_id, task_type, tier, duration_ms, iterations, success, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                m.user_id,
                m.task_type,
                m.tier,
                m.duration_ms as i64,
                m.iterations as i64,
                m.success,
                m.created_at,
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    /// All `durationMs` values recorded for `(task_type, tier)`, newest last.
    pub fn durations_for(&self, task_type: &str, tier: &str) -> Result<Vec<u64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT duration_ms FROM task_metrics WHERE task_type = ?1 AND tier = ?2
                 ORDER BY created_at ASC",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![task_type, tier], |r| r.get::<_, i64>(0))
            .map_err(|e| Error::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .map(|v| v.into_iter().map(|x| x as u64).collect())
            .map_err(|e| Error::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_bucket() {
        let s = Store::open_in_memory().unwrap();
        for i in 0..6 {
            s.record_task_metric(&TaskMetric {
                user_id: "u1".into(),
                task_type: "research".into(),
                tier: "complex".into(),
                duration_ms: 1000 + i * 100,
                iterations: 3,
                success: true,
                created_at: i as i64,
            })
            .unwrap();
        }
        let durations = s.durations_for("research", "complex").unwrap();
        assert_eq!(durations.len(), 6);
        assert_eq!(durations[0], 1000);
    }
}
