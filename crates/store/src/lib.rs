//! `sa-store` — the embedded relational store (C1) plus the FTS-backed
//! episodic memory index (C16) that sits under it.
//!
//! Conversation transcripts and session bookkeeping already live in
//! `sa-sessions` (the gateway's JSON-file session store, inherited from the
//! teacher codebase); this crate owns the tables the distilled spec adds on
//! top of that: sub-agents, role templates, background tasks, task metrics,
//! compaction records, and episodic memory events. All tables share one
//! `tinyclaw.db` SQLite file so a single `PRAGMA user_version` migration
//! ladder governs the whole schema.
//!
//! Writes are synchronous and durable before the call returns (`journal_mode
//! = WAL`, default synchronous), matching the spec's explicit durability
//! requirement and its explicit disclaimer of cross-process coherence.

pub mod background;
pub mod compaction;
pub mod episodic;
pub mod metrics;
pub mod shell_approvals;
pub mod subagents;
pub mod templates;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use sa_domain::error::{Error, Result};

pub use background::{BackgroundTask, TaskStatus};
pub use compaction::CompactionRecord;
pub use episodic::{EpisodicEvent, EventType, SearchHit};
pub use metrics::TaskMetric;
pub use shell_approvals::ShellApproval;
pub use subagents::{SubAgentRecord, SubAgentStatus};
pub use templates::RoleTemplate;

const SCHEMA_VERSION: i64 = 2;

/// The embedded store. Cheap to clone-share via `Arc`; internally
/// single-connection and mutex-guarded since `rusqlite::Connection` is not
/// `Sync` and the spec does not require cross-process coherence.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the SQLite file at `path` and run pending
    /// migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| Error::Store(e.to_string()))?;
        Self::init(conn)
    }

    /// Open an in-memory store — used throughout this crate's tests and
    /// available to dependents for unit tests of their own.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Store(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::Store(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| Error::Store(e.to_string()))?;
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        let current: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .map_err(|e| Error::Store(e.to_string()))?;
        if current >= SCHEMA_VERSION {
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sub_agents (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                role             TEXT NOT NULL,
                system_prompt    TEXT NOT NULL,
                tools_granted    TEXT NOT NULL,
                tier_preference  TEXT,
                status           TEXT NOT NULL,
                performance_score REAL NOT NULL DEFAULT 0,
                total_tasks      INTEGER NOT NULL DEFAULT 0,
                successful_tasks INTEGER NOT NULL DEFAULT 0,
                template_id      TEXT,
                created_at       INTEGER NOT NULL,
                last_active_at   INTEGER NOT NULL,
                deleted_at       INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_sub_agents_user ON sub_agents(user_id);

            CREATE TABLE IF NOT EXISTS role_templates (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                name             TEXT NOT NULL,
                role_description TEXT NOT NULL,
                default_tools    TEXT NOT NULL,
                default_tier     TEXT,
                times_used       INTEGER NOT NULL DEFAULT 0,
                avg_performance  REAL NOT NULL DEFAULT 0,
                tags             TEXT NOT NULL,
                created_at       INTEGER NOT NULL,
                updated_at       INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_role_templates_user ON role_templates(user_id);

            CREATE TABLE IF NOT EXISTS background_tasks (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                agent_id         TEXT NOT NULL,
                task_description TEXT NOT NULL,
                status           TEXT NOT NULL,
                result           TEXT,
                started_at       INTEGER NOT NULL,
                completed_at     INTEGER,
                delivered_at     INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_background_tasks_user ON background_tasks(user_id);
            CREATE INDEX IF NOT EXISTS idx_background_tasks_agent ON background_tasks(agent_id);

            CREATE TABLE IF NOT EXISTS task_metrics (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                task_type   TEXT NOT NULL,
                tier        TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                iterations  INTEGER NOT NULL,
                success     INTEGER NOT NULL,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_metrics_type_tier
                ON task_metrics(task_type, tier, created_at);

            CREATE TABLE IF NOT EXISTS compaction_records (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL,
                summary         TEXT NOT NULL,
                replaced_before INTEGER NOT NULL,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_compaction_user_created
                ON compaction_records(user_id, created_at);

            CREATE TABLE IF NOT EXISTS episodic_events (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                event_type       TEXT NOT NULL,
                content          TEXT NOT NULL,
                outcome          TEXT,
                importance       REAL NOT NULL,
                access_count     INTEGER NOT NULL DEFAULT 0,
                created_at       INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodic_user ON episodic_events(user_id);

            CREATE VIRTUAL TABLE IF NOT EXISTS episodic_fts USING fts5(
                content,
                content='episodic_events',
                content_rowid='rowid'
            );
            CREATE TRIGGER IF NOT EXISTS episodic_ai AFTER INSERT ON episodic_events BEGIN
                INSERT INTO episodic_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER IF NOT EXISTS episodic_ad AFTER DELETE ON episodic_events BEGIN
                INSERT INTO episodic_fts(episodic_fts, rowid, content) VALUES('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER IF NOT EXISTS episodic_au AFTER UPDATE ON episodic_events BEGIN
                INSERT INTO episodic_fts(episodic_fts, rowid, content) VALUES('delete', old.rowid, old.content);
                INSERT INTO episodic_fts(rowid, content) VALUES (new.rowid, new.content);
            END;

            CREATE TABLE IF NOT EXISTS shell_approvals (
                command      TEXT PRIMARY KEY,
                persistent   INTEGER NOT NULL,
                approved_at  INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Store(e.to_string()))?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations_idempotently() {
        let store = Store::open_in_memory().unwrap();
        // Re-running migrate on an already-migrated connection is a no-op.
        store.migrate().unwrap();
    }

    #[test]
    fn open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tinyclaw.db");
        let store = Store::open(&path).unwrap();
        drop(store);
        assert!(path.exists());
    }
}
