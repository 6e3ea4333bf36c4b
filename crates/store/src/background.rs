//! `background_tasks` table — persisted `BackgroundTask`s (§3, backing C14).

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Delivered,
}

impl TaskStatus {
    fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Delivered => "delivered",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "delivered" => TaskStatus::Delivered,
            _ => TaskStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub task_description: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub delivered_at: Option<i64>,
}

impl Store {
    pub fn count_running_tasks(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM background_tasks WHERE user_id = ?1 AND status = 'running'",
                params![user_id],
                |r| r.get(0),
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n as usize)
    }

    pub fn create_background_task(
        &self,
        id: String,
        user_id: String,
        agent_id: String,
        task_description: String,
        now: i64,
    ) -> Result<BackgroundTask> {
        let task = BackgroundTask {
            id,
            user_id,
            agent_id,
            task_description,
            status: TaskStatus::Running,
            result: None,
            started_at: now,
            completed_at: None,
            delivered_at: None,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO background_tasks (id, user_id, agent_id, task_description, status,
                result, started_at, completed_at, delivered_at)
             VALUES (?1,?2,?3,'running',NULL,?4,NULL,NULL)",
            params![task.id, task.user_id, task.agent_id, task.task_description, task.started_at],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(task)
    }

    pub fn get_background_task(&self, id: &str) -> Result<Option<BackgroundTask>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, agent_id, task_description, status, result,
                started_at, completed_at, delivered_at
             FROM background_tasks WHERE id = ?1",
            params![id],
            row_to_task,
        )
        .optional()
        .map_err(|e| Error::Store(e.to_string()))
    }

    /// Transition `running -> completed|failed`. Refuses to move a task that
    /// is not currently `running` (terminal transitions never skip/reverse).
    pub fn complete_background_task(
        &self,
        id: &str,
        success: bool,
        result: String,
        now: i64,
    ) -> Result<()> {
        let status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE background_tasks SET status = ?1, result = ?2, completed_at = ?3
                 WHERE id = ?4 AND status = 'running'",
                params![status.as_str(), result, now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!(
                "task '{id}' not found or not running"
            )));
        }
        Ok(())
    }

    /// Transition `completed|failed -> delivered`. One-way terminal state.
    pub fn mark_task_delivered(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE background_tasks SET status = 'delivered', delivered_at = ?1
                 WHERE id = ?2 AND status IN ('completed', 'failed')",
                params![now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!(
                "task '{id}' not found or not terminal"
            )));
        }
        Ok(())
    }

    /// Terminal-but-not-delivered tasks, oldest completion first.
    pub fn undelivered_tasks(&self, user_id: &str) -> Result<Vec<BackgroundTask>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, agent_id, task_description, status, result,
                    started_at, completed_at, delivered_at
                 FROM background_tasks
                 WHERE user_id = ?1 AND status IN ('completed', 'failed') AND delivered_at IS NULL
                 ORDER BY completed_at ASC",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id], row_to_task)
            .map_err(|e| Error::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))
    }

    /// Force-fail `running` tasks started before `older_than`. Returns the
    /// count marked stale.
    pub fn cleanup_stale_tasks(&self, older_than: i64, now: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE background_tasks SET status = 'failed', result = 'Task timed out (stale)',
                    completed_at = ?1
                 WHERE status = 'running' AND started_at < ?2",
                params![now, older_than],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n)
    }

    pub fn running_tasks_for_agent(&self, agent_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM background_tasks WHERE agent_id = ?1 AND status = 'running'",
                params![agent_id],
                |r| r.get(0),
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n as usize)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<BackgroundTask> {
    Ok(BackgroundTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        task_description: row.get(3)?,
        status: TaskStatus::parse(&row.get::<_, String>(4)?),
        result: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        delivered_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_a_strict_prefix() {
        let s = Store::open_in_memory().unwrap();
        s.create_background_task("t1".into(), "u1".into(), "a1".into(), "do x".into(), 100)
            .unwrap();
        assert_eq!(s.count_running_tasks("u1").unwrap(), 1);

        s.complete_background_task("t1", true, "done".into(), 200)
            .unwrap();
        assert_eq!(s.count_running_tasks("u1").unwrap(), 0);

        let undelivered = s.undelivered_tasks("u1").unwrap();
        assert_eq!(undelivered.len(), 1);

        s.mark_task_delivered("t1", 300).unwrap();
        assert!(s.undelivered_tasks("u1").unwrap().is_empty());

        // Cannot re-complete a delivered task.
        assert!(s
            .complete_background_task("t1", true, "again".into(), 400)
            .is_err());
    }

    #[test]
    fn cleanup_stale_marks_old_running_tasks_failed() {
        let s = Store::open_in_memory().unwrap();
        s.create_background_task("t1".into(), "u1".into(), "a1".into(), "do x".into(), 100)
            .unwrap();
        let n = s.cleanup_stale_tasks(1000, 2000).unwrap();
        assert_eq!(n, 1);
        let t = s.get_background_task("t1").unwrap().unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
    }
}
