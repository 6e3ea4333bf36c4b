//! Sub-agent lifecycle management (C12): create, suspend, revive, soft
//! delete, garbage collect, and transcript persistence.
//!
//! Policy shell over `sa_store::subagents`; the actual state machine
//! (`active -> suspended -> active`, `* -> soft_deleted -> gc'd`) lives in
//! the store's SQL, matching how `sa-sessions::LifecycleManager` keeps
//! session reset policy in the gateway layer while transcript storage
//! stays in `sa-store`/`sa-sessions`.

use std::path::Path;
use std::sync::Arc;

use sa_domain::config::SubagentLifecycleConfig;
use sa_domain::error::{Error, Result};
use sa_sessions::TranscriptWriter;
use sa_store::{SubAgentRecord, SubAgentStatus, Store};

pub struct LifecycleManager {
    store: Arc<Store>,
    config: SubagentLifecycleConfig,
    transcripts: TranscriptWriter,
}

impl LifecycleManager {
    pub fn new(store: Arc<Store>, config: SubagentLifecycleConfig, transcript_dir: &Path) -> Self {
        Self {
            store,
            config,
            transcripts: TranscriptWriter::new(transcript_dir),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        id: String,
        user_id: &str,
        role: &str,
        system_prompt: &str,
        tools_granted: Vec<String>,
        tier_preference: Option<String>,
        template_id: Option<String>,
        now: i64,
    ) -> Result<SubAgentRecord> {
        self.store.create_sub_agent(sa_store::subagents::NewSubAgent {
            id,
            user_id: user_id.to_string(),
            role: role.to_string(),
            system_prompt: system_prompt.to_string(),
            tools_granted,
            tier_preference,
            template_id,
            now,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<SubAgentRecord>> {
        self.store.get_sub_agent(id)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<SubAgentRecord>> {
        self.store.list_sub_agents(user_id)
    }

    pub fn suspend(&self, id: &str, now: i64) -> Result<()> {
        self.store.set_sub_agent_status(id, SubAgentStatus::Suspended, None, now)
    }

    /// Reactivate a suspended or soft-deleted agent. Refuses a
    /// soft-deleted agent whose TTL already elapsed — it is effectively
    /// gone even if `garbage_collect` hasn't swept it yet.
    pub fn revive(&self, id: &str, now: i64) -> Result<SubAgentRecord> {
        let agent = self
            .store
            .get_sub_agent(id)?
            .ok_or_else(|| Error::Other(format!("sub-agent '{id}' not found")))?;

        if agent.status == SubAgentStatus::SoftDeleted {
            let deleted_at = agent.deleted_at.unwrap_or(now);
            if now - deleted_at > self.config.soft_delete_ttl_ms as i64 {
                return Err(Error::Validation(format!(
                    "sub-agent '{id}' was soft-deleted past its retention window and cannot be revived"
                )));
            }
        }

        self.store.set_sub_agent_status(id, SubAgentStatus::Active, None, now)?;
        self.store
            .get_sub_agent(id)?
            .ok_or_else(|| Error::Other(format!("sub-agent '{id}' vanished during revive")))
    }

    pub fn soft_delete(&self, id: &str, now: i64) -> Result<()> {
        self.store.set_sub_agent_status(id, SubAgentStatus::SoftDeleted, Some(now), now)
    }

    pub fn record_task_result(&self, id: &str, success: bool, now: i64) -> Result<()> {
        self.store.record_sub_agent_task_result(id, success, now)
    }

    /// Permanently remove soft-deleted agents past their retention window.
    /// Returns the number of records removed.
    pub fn garbage_collect(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.config.soft_delete_ttl_ms as i64;
        self.store.gc_soft_deleted_agents(cutoff)
    }

    /// Append one turn of a sub-agent's transcript. Sub-agent transcripts
    /// live alongside session transcripts, keyed by agent id instead of
    /// session key.
    pub fn save_message(&self, agent_id: &str, role: &str, content: &str) -> Result<()> {
        self.transcripts
            .append(agent_id, &[TranscriptWriter::line(role, content)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (LifecycleManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LifecycleManager::new(
            Arc::new(Store::open_in_memory().unwrap()),
            SubagentLifecycleConfig::default(),
            dir.path(),
        );
        (mgr, dir)
    }

    #[test]
    fn create_then_suspend_then_revive() {
        let (mgr, _dir) = manager();
        mgr.create("a1".into(), "u1", "researcher", "you research", vec![], None, None, 1000)
            .unwrap();
        mgr.suspend("a1", 1001).unwrap();
        assert_eq!(mgr.get("a1").unwrap().unwrap().status, SubAgentStatus::Suspended);
        let revived = mgr.revive("a1", 1002).unwrap();
        assert_eq!(revived.status, SubAgentStatus::Active);
    }

    #[test]
    fn revive_refuses_past_ttl() {
        let (mgr, _dir) = manager();
        mgr.create("a1".into(), "u1", "researcher", "you research", vec![], None, None, 0)
            .unwrap();
        mgr.soft_delete("a1", 0).unwrap();
        let far_future = SubagentLifecycleConfig::default().soft_delete_ttl_ms as i64 + 1;
        assert!(mgr.revive("a1", far_future).is_err());
    }

    #[test]
    fn garbage_collect_only_sweeps_past_ttl() {
        let (mgr, _dir) = manager();
        mgr.create("a1".into(), "u1", "researcher", "you research", vec![], None, None, 0)
            .unwrap();
        mgr.soft_delete("a1", 0).unwrap();
        assert_eq!(mgr.garbage_collect(1000).unwrap(), 0);
        let ttl = SubagentLifecycleConfig::default().soft_delete_ttl_ms as i64;
        assert_eq!(mgr.garbage_collect(ttl + 1).unwrap(), 1);
    }

    #[test]
    fn save_message_appends_to_agent_transcript() {
        let (mgr, dir) = manager();
        mgr.create("a1".into(), "u1", "researcher", "you research", vec![], None, None, 0)
            .unwrap();
        mgr.save_message("a1", "assistant", "done").unwrap();
        assert!(dir.path().join("a1.jsonl").exists());
    }
}
