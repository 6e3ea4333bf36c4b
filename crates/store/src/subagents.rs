//! `sub_agents` table — persisted `SubAgentRecord`s (§3, backing C12).

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentStatus {
    Active,
    Suspended,
    SoftDeleted,
}

impl SubAgentStatus {
    fn as_str(self) -> &'static str {
        match self {
            SubAgentStatus::Active => "active",
            SubAgentStatus::Suspended => "suspended",
            SubAgentStatus::SoftDeleted => "soft_deleted",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "suspended" => SubAgentStatus::Suspended,
            "soft_deleted" => SubAgentStatus::SoftDeleted,
            _ => SubAgentStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRecord {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub system_prompt: String,
    pub tools_granted: Vec<String>,
    pub tier_preference: Option<String>,
    pub status: SubAgentStatus,
    pub performance_score: f64,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub template_id: Option<String>,
    pub created_at: i64,
    pub last_active_at: i64,
    pub deleted_at: Option<i64>,
}

/// Fields accepted by `Store::create_sub_agent`.
pub struct NewSubAgent {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub system_prompt: String,
    pub tools_granted: Vec<String>,
    pub tier_preference: Option<String>,
    pub template_id: Option<String>,
    pub now: i64,
}

impl Store {
    pub fn create_sub_agent(&self, new: NewSubAgent) -> Result<SubAgentRecord> {
        let record = SubAgentRecord {
            id: new.id,
            user_id: new.user_id,
            role: new.role,
            system_prompt: new.system_prompt,
            tools_granted: new.tools_granted,
            tier_preference: new.tier_preference,
            status: SubAgentStatus::Active,
            performance_score: 0.0,
            total_tasks: 0,
            successful_tasks: 0,
            template_id: new.template_id,
            created_at: new.now,
            last_active_at: new.now,
            deleted_at: None,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sub_agents (id, user_id, role, system_prompt, tools_granted,
                tier_preference, status, performance_score, total_tasks, successful_tasks,
                template_id, created_at, last_active_at, deleted_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                record.id,
                record.user_id,
                record.role,
                record.system_prompt,
                serde_json::to_string(&record.tools_granted).unwrap(),
                record.tier_preference,
                record.status.as_str(),
                record.performance_score,
                record.total_tasks as i64,
                record.successful_tasks as i64,
                record.template_id,
                record.created_at,
                record.last_active_at,
                record.deleted_at,
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(record)
    }

    pub fn get_sub_agent(&self, id: &str) -> Result<Option<SubAgentRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, role, system_prompt, tools_granted, tier_preference,
                status, performance_score, total_tasks, successful_tasks, template_id,
                created_at, last_active_at, deleted_at
             FROM sub_agents WHERE id = ?1",
            params![id],
            row_to_sub_agent,
        )
        .optional()
        .map_err(|e| Error::Store(e.to_string()))
    }

    pub fn list_sub_agents(&self, user_id: &str) -> Result<Vec<SubAgentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, role, system_prompt, tools_granted, tier_preference,
                    status, performance_score, total_tasks, successful_tasks, template_id,
                    created_at, last_active_at, deleted_at
                 FROM sub_agents WHERE user_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id], row_to_sub_agent)
            .map_err(|e| Error::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))
    }

    pub fn set_sub_agent_status(
        &self,
        id: &str,
        status: SubAgentStatus,
        deleted_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE sub_agents SET status = ?1, deleted_at = ?2, last_active_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), deleted_at, now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!("sub-agent '{id}' not found")));
        }
        Ok(())
    }

    /// Increment task counters and recompute `performance_score` as the
    /// running success ratio `successfulTasks / totalTasks`.
    pub fn record_sub_agent_task_result(&self, id: &str, success: bool, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE sub_agents SET
                    total_tasks = total_tasks + 1,
                    successful_tasks = successful_tasks + ?1,
                    performance_score = CAST(successful_tasks + ?1 AS REAL) / CAST(total_tasks + 1 AS REAL),
                    last_active_at = ?2
                 WHERE id = ?3",
                params![if success { 1 } else { 0 }, now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!("sub-agent '{id}' not found")));
        }
        Ok(())
    }

    /// Delete soft-deleted records older than `cutoff` (deleted_at < cutoff).
    /// Returns the number of rows removed.
    pub fn gc_soft_deleted_agents(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "DELETE FROM sub_agents WHERE status = 'soft_deleted' AND deleted_at IS NOT NULL AND deleted_at < ?1",
                params![cutoff],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n)
    }
}

fn row_to_sub_agent(row: &rusqlite::Row) -> rusqlite::Result<SubAgentRecord> {
    let tools_granted: String = row.get(4)?;
    Ok(SubAgentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        system_prompt: row.get(3)?,
        tools_granted: serde_json::from_str(&tools_granted).unwrap_or_default(),
        tier_preference: row.get(5)?,
        status: SubAgentStatus::parse(&row.get::<_, String>(6)?),
        performance_score: row.get(7)?,
        total_tasks: row.get::<_, i64>(8)? as u64,
        successful_tasks: row.get::<_, i64>(9)? as u64,
        template_id: row.get(10)?,
        created_at: row.get(11)?,
        last_active_at: row.get(12)?,
        deleted_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn new_agent(id: &str) -> NewSubAgent {
        NewSubAgent {
            id: id.to_string(),
            user_id: "u1".into(),
            role: "researcher".into(),
            system_prompt: "you research things".into(),
            tools_granted: vec!["web_search".into()],
            tier_preference: None,
            template_id: None,
            now: 1000,
        }
    }

    #[test]
    fn create_and_get_round_trips() {
        let s = store();
        s.create_sub_agent(new_agent("a1")).unwrap();
        let got = s.get_sub_agent("a1").unwrap().unwrap();
        assert_eq!(got.status, SubAgentStatus::Active);
        assert_eq!(got.total_tasks, 0);
    }

    #[test]
    fn record_task_result_keeps_invariant() {
        let s = store();
        s.create_sub_agent(new_agent("a1")).unwrap();
        s.record_sub_agent_task_result("a1", true, 1001).unwrap();
        s.record_sub_agent_task_result("a1", false, 1002).unwrap();
        let got = s.get_sub_agent("a1").unwrap().unwrap();
        assert_eq!(got.total_tasks, 2);
        assert_eq!(got.successful_tasks, 1);
        assert!(got.successful_tasks <= got.total_tasks);
        assert!((got.performance_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn soft_delete_then_gc() {
        let s = store();
        s.create_sub_agent(new_agent("a1")).unwrap();
        s.set_sub_agent_status("a1", SubAgentStatus::SoftDeleted, Some(1000), 1000)
            .unwrap();
        assert_eq!(s.gc_soft_deleted_agents(999).unwrap(), 0);
        assert_eq!(s.gc_soft_deleted_agents(1001).unwrap(), 1);
        assert!(s.get_sub_agent("a1").unwrap().is_none());
    }
}
