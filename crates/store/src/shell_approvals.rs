//! `shell_approvals` table — persisted `ShellApproval`s (§3, backing the
//! persistent half of C9's approval store). Session-scoped approvals never
//! reach this table; they live only in the shell permission engine's
//! in-memory set and vanish on restart.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellApproval {
    pub command: String,
    pub persistent: bool,
    pub approved_at: i64,
}

impl Store {
    /// Upsert a persistent approval. Only called for `persistent = true`
    /// approvals; session approvals never touch the store.
    pub fn upsert_shell_approval(&self, command: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO shell_approvals (command, persistent, approved_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT(command) DO UPDATE SET approved_at = excluded.approved_at",
            params![command, now],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    pub fn revoke_shell_approval(&self, command: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM shell_approvals WHERE command = ?1",
            params![command],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    pub fn get_shell_approval(&self, command: &str) -> Result<Option<ShellApproval>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT command, persistent, approved_at FROM shell_approvals WHERE command = ?1",
            params![command],
            row_to_approval,
        )
        .optional()
        .map_err(|e| Error::Store(e.to_string()))
    }

    pub fn list_shell_approvals(&self) -> Result<Vec<ShellApproval>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT command, persistent, approved_at FROM shell_approvals")
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_approval)
            .map_err(|e| Error::Store(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))
    }
}

fn row_to_approval(row: &rusqlite::Row) -> rusqlite::Result<ShellApproval> {
    Ok(ShellApproval {
        command: row.get(0)?,
        persistent: row.get::<_, i64>(1)? != 0,
        approved_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_roundtrips() {
        let s = Store::open_in_memory().unwrap();
        s.upsert_shell_approval("git push", 1000).unwrap();
        let a = s.get_shell_approval("git push").unwrap().unwrap();
        assert!(a.persistent);
        assert_eq!(a.approved_at, 1000);
    }

    #[test]
    fn upsert_is_idempotent_on_command() {
        let s = Store::open_in_memory().unwrap();
        s.upsert_shell_approval("npm install", 1000).unwrap();
        s.upsert_shell_approval("npm install", 2000).unwrap();
        assert_eq!(s.list_shell_approvals().unwrap().len(), 1);
        let a = s.get_shell_approval("npm install").unwrap().unwrap();
        assert_eq!(a.approved_at, 2000);
    }

    #[test]
    fn revoke_removes_entry() {
        let s = Store::open_in_memory().unwrap();
        s.upsert_shell_approval("git push", 1000).unwrap();
        s.revoke_shell_approval("git push").unwrap();
        assert!(s.get_shell_approval("git push").unwrap().is_none());
    }
}
