//! `role_templates` table — persisted `RoleTemplate`s (§3, backing C13).

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub role_description: String,
    pub default_tools: Vec<String>,
    pub default_tier: Option<String>,
    pub times_used: u64,
    pub avg_performance: f64,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct NewRoleTemplate {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub role_description: String,
    pub default_tools: Vec<String>,
    pub default_tier: Option<String>,
    pub tags: Vec<String>,
    pub now: i64,
}

impl Store {
    pub fn count_role_templates(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM role_templates WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n as usize)
    }

    pub fn create_role_template(&self, new: NewRoleTemplate) -> Result<RoleTemplate> {
        let record = RoleTemplate {
            id: new.id,
            user_id: new.user_id,
            name: new.name,
            role_description: new.role_description,
            default_tools: new.default_tools,
            default_tier: new.default_tier,
            times_used: 0,
            avg_performance: 0.0,
            tags: new.tags,
            created_at: new.now,
            updated_at: new.now,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO role_templates (id, user_id, name, role_description, default_tools,
                default_tier, times_used, avg_performance, tags, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                record.id,
                record.user_id,
                record.name,
                record.role_description,
                serde_json::to_string(&record.default_tools).unwrap(),
                record.default_tier,
                record.times_used as i64,
                record.avg_performance,
                serde_json::to_string(&record.tags).unwrap(),
                record.created_at,
                record.updated_at,
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(record)
    }

    pub fn list_role_templates(&self, user_id: &str) -> Result<Vec<RoleTemplate>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, name, role_description, default_tools, default_tier,
                    times_used, avg_performance, tags, created_at, updated_at
                 FROM role_templates WHERE user_id = ?1",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id], row_to_template)
            .map_err(|e| Error::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))
    }

    pub fn get_role_template(&self, id: &str) -> Result<Option<RoleTemplate>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, name, role_description, default_tools, default_tier,
                times_used, avg_performance, tags, created_at, updated_at
             FROM role_templates WHERE id = ?1",
            params![id],
            row_to_template,
        )
        .optional()
        .map_err(|e| Error::Store(e.to_string()))
    }

    /// `timesUsed += 1`; `avgPerformance = (old * (n - 1) + score) / n` where
    /// `n` is the post-increment `timesUsed`.
    pub fn record_template_usage(&self, id: &str, score: f64, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE role_templates SET
                    avg_performance = (avg_performance * times_used + ?1) / (times_used + 1),
                    times_used = times_used + 1,
                    updated_at = ?2
                 WHERE id = ?3",
                params![score, now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!("template '{id}' not found")));
        }
        Ok(())
    }

    pub fn delete_role_template(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM role_templates WHERE id = ?1", params![id])
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }
}

fn row_to_template(row: &rusqlite::Row) -> rusqlite::Result<RoleTemplate> {
    let default_tools: String = row.get(4)?;
    let tags: String = row.get(8)?;
    Ok(RoleTemplate {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        role_description: row.get(3)?,
        default_tools: serde_json::from_str(&default_tools).unwrap_or_default(),
        default_tier: row.get(5)?,
        times_used: row.get::<_, i64>(6)? as u64,
        avg_performance: row.get(7)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_template(id: &str) -> NewRoleTemplate {
        NewRoleTemplate {
            id: id.to_string(),
            user_id: "u1".into(),
            name: "researcher".into(),
            role_description: "digs up facts".into(),
            default_tools: vec!["web_search".into()],
            default_tier: None,
            tags: vec!["research".into()],
            now: 1000,
        }
    }

    #[test]
    fn record_usage_updates_running_average() {
        let s = Store::open_in_memory().unwrap();
        s.create_role_template(new_template("t1")).unwrap();
        s.record_template_usage("t1", 0.8, 1001).unwrap();
        s.record_template_usage("t1", 0.4, 1002).unwrap();
        let t = s.get_role_template("t1").unwrap().unwrap();
        assert_eq!(t.times_used, 2);
        assert!((t.avg_performance - 0.6).abs() < 1e-9);
    }

    #[test]
    fn cap_is_observable_via_count() {
        let s = Store::open_in_memory().unwrap();
        for i in 0..3 {
            s.create_role_template(new_template(&format!("t{i}")))
                .unwrap();
        }
        assert_eq!(s.count_role_templates("u1").unwrap(), 3);
    }
}
