//! `episodic_events` table + FTS5 index — the memory engine's store (C16).
//!
//! Search ranking, decay, pruning, and merge are implemented here since they
//! are inseparable from the SQL that drives them; `sa-delegation`/the
//! gateway only calls the methods below, never touches the schema directly.

use std::collections::HashSet;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sa_domain::config::MemoryConfig;
use sa_domain::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Correction,
    PreferenceLearned,
    FactStored,
    TaskCompleted,
    DelegationResult,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Correction => "correction",
            EventType::PreferenceLearned => "preference_learned",
            EventType::FactStored => "fact_stored",
            EventType::TaskCompleted => "task_completed",
            EventType::DelegationResult => "delegation_result",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "preference_learned" => EventType::PreferenceLearned,
            "fact_stored" => EventType::FactStored,
            "task_completed" => EventType::TaskCompleted,
            "delegation_result" => EventType::DelegationResult,
            _ => EventType::Correction,
        }
    }

    /// Default importance by type (§4.16).
    pub fn default_importance(self, cfg: &sa_domain::config::DefaultImportance) -> f64 {
        match self {
            EventType::Correction => cfg.correction,
            EventType::PreferenceLearned => cfg.preference_learned,
            EventType::FactStored => cfg.fact_stored,
            EventType::TaskCompleted => cfg.task_completed,
            EventType::DelegationResult => cfg.delegation_result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: EventType,
    pub content: String,
    pub outcome: Option<String>,
    pub importance: f64,
    pub access_count: u64,
    pub created_at: i64,
    pub last_accessed_at: i64,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub event: EpisodicEvent,
    pub relevance: f64,
}

/// Outcome of `consolidate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidateReport {
    pub merged: usize,
    pub pruned: usize,
    pub decayed: usize,
}

impl Store {
    pub fn record_episodic_event(
        &self,
        user_id: &str,
        event_type: EventType,
        content: String,
        outcome: Option<String>,
        importance: Option<f64>,
        memory_cfg: &MemoryConfig,
        now: i64,
    ) -> Result<EpisodicEvent> {
        let event = EpisodicEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            event_type,
            content,
            outcome,
            importance: importance
                .unwrap_or_else(|| event_type.default_importance(&memory_cfg.default_importance)),
            access_count: 0,
            created_at: now,
            last_accessed_at: now,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO episodic_events (id, user_id, event_type, content, outcome, importance,
                access_count, created_at, last_accessed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                event.id,
                event.user_id,
                event.event_type.as_str(),
                event.content,
                event.outcome,
                event.importance,
                event.access_count as i64,
                event.created_at,
                event.last_accessed_at,
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(event)
    }

    /// `search`: sanitize `query` to an OR-of-tokens FTS5 match, compute
    /// `relevance = 0.4*fts + 0.3*temporal + 0.3*importance`, sort desc,
    /// cap at `limit`. `now` is the monotonic ms clock used for the
    /// temporal-decay term.
    pub fn search_episodic(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        now: i64,
    ) -> Result<Vec<SearchHit>> {
        let match_expr = sanitize_fts_query(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.user_id, e.event_type, e.content, e.outcome, e.importance,
                        e.access_count, e.created_at, e.last_accessed_at, fts.rank
                 FROM episodic_fts fts
                 JOIN episodic_events e ON e.rowid = fts.rowid
                 WHERE fts MATCH ?1 AND e.user_id = ?2",
            )
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut raw: Vec<(EpisodicEvent, f64)> = stmt
            .query_map(params![match_expr, user_id], |row| {
                let event = EpisodicEvent {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    event_type: EventType::parse(&row.get::<_, String>(2)?),
                    content: row.get(3)?,
                    outcome: row.get(4)?,
                    importance: row.get(5)?,
                    access_count: row.get::<_, i64>(6)? as u64,
                    created_at: row.get(7)?,
                    last_accessed_at: row.get(8)?,
                };
                let rank: f64 = row.get(9)?;
                Ok((event, rank))
            })
            .map_err(|e| Error::Store(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))?;

        if raw.is_empty() {
            return Ok(Vec::new());
        }

        // FTS5's built-in `rank` is negative bm25 (more negative = better
        // match); normalize its magnitude against the worst match in this
        // result set, per the spec's `ftsScore = |rank| / maxAbsRank`.
        let max_abs_rank = raw
            .iter()
            .map(|(_, rank)| rank.abs())
            .fold(0.0_f64, f64::max)
            .max(1e-9);

        let mut hits: Vec<SearchHit> = raw
            .drain(..)
            .map(|(event, rank)| {
                let fts_score = rank.abs() / max_abs_rank;
                let days_since_access = ((now - event.last_accessed_at).max(0) as f64)
                    / (24.0 * 60.0 * 60.0 * 1000.0);
                let temporal_score = (1.0_f64).min(
                    (-0.05 * days_since_access).exp() * (1.0 + 0.02 * event.access_count as f64),
                );
                let relevance = 0.4 * fts_score + 0.3 * temporal_score + 0.3 * event.importance;
                SearchHit { event, relevance }
            })
            .collect();

        hits.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap());
        hits.truncate(limit);
        Ok(hits)
    }

    pub fn reinforce_episodic(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE episodic_events SET access_count = access_count + 1, last_accessed_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        if n == 0 {
            return Err(Error::Store(format!("episodic event '{id}' not found")));
        }
        Ok(())
    }

    /// Decay (importance *= 0.95 for events unaccessed >= 7 days), prune
    /// (importance < 0.1 && accessCount == 0 && age > 30 days), then merge
    /// near-duplicates (Jaccard > 0.8 within the same event type: keep the
    /// newer, fold 20% of the older's importance in, sum access counts,
    /// delete the older).
    pub fn consolidate_episodic(
        &self,
        user_id: &str,
        memory_cfg: &MemoryConfig,
        now: i64,
    ) -> Result<ConsolidateReport> {
        let mut report = ConsolidateReport::default();
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;

        let conn = self.conn.lock();

        // ── decay ──────────────────────────────────────────────────
        let decayed = conn
            .execute(
                "UPDATE episodic_events SET importance = importance * ?1
                 WHERE user_id = ?2 AND (?3 - last_accessed_at) >= ?4",
                params![
                    memory_cfg.decay_factor,
                    user_id,
                    now,
                    memory_cfg.decay_after_days * DAY_MS
                ],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        report.decayed = decayed;

        // ── prune ──────────────────────────────────────────────────
        let pruned = conn
            .execute(
                "DELETE FROM episodic_events
                 WHERE user_id = ?1 AND importance < ?2 AND access_count = 0
                   AND (?3 - created_at) > ?4",
                params![
                    user_id,
                    memory_cfg.prune_importance_floor,
                    now,
                    memory_cfg.prune_after_days * DAY_MS
                ],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        report.pruned = pruned;

        // ── merge ──────────────────────────────────────────────────
        let mut stmt = conn
            .prepare(
                "SELECT id, event_type, content, importance, access_count, created_at, last_accessed_at
                 FROM episodic_events WHERE user_id = ?1 ORDER BY event_type, created_at DESC",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows: Vec<(String, String, String, f64, i64, i64, i64)> = stmt
            .query_map(params![user_id], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })
            .map_err(|e| Error::Store(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(e.to_string()))?;
        drop(stmt);

        let mut deleted: HashSet<String> = HashSet::new();
        let mut by_type: std::collections::HashMap<&str, Vec<usize>> =
            std::collections::HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            by_type.entry(row.1.as_str()).or_default().push(idx);
        }

        for (_, indices) in by_type {
            // Rows are already newest-first within a type (query ORDER BY
            // created_at DESC), so the first survivor seen is the newer one.
            for i in 0..indices.len() {
                let newer_idx = indices[i];
                if deleted.contains(&rows[newer_idx].0) {
                    continue;
                }
                let newer_tokens = content_tokens(&rows[newer_idx].2);
                for &older_idx in &indices[i + 1..] {
                    let older = &rows[older_idx];
                    if deleted.contains(&older.0) {
                        continue;
                    }
                    let older_tokens = content_tokens(&older.2);
                    if jaccard(&newer_tokens, &older_tokens) > memory_cfg.merge_similarity_threshold
                    {
                        let new_importance = rows[newer_idx].3 + 0.2 * older.3;
                        let new_access = rows[newer_idx].4 + older.4;
                        conn.execute(
                            "UPDATE episodic_events SET importance = ?1, access_count = ?2 WHERE id = ?3",
                            params![new_importance.min(1.0), new_access, rows[newer_idx].0],
                        )
                        .map_err(|e| Error::Store(e.to_string()))?;
                        conn.execute(
                            "DELETE FROM episodic_events WHERE id = ?1",
                            params![older.0],
                        )
                        .map_err(|e| Error::Store(e.to_string()))?;
                        deleted.insert(older.0.clone());
                        report.merged += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

fn content_tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Sanitize a free-text query into an FTS5 `OR`-of-tokens match expression.
/// Tokens are alphanumeric only, quoted to neutralize FTS5 special syntax.
fn sanitize_fts_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    tokens.join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_matching_events_and_ranks_by_relevance() {
        let s = Store::open_in_memory().unwrap();
        let cfg = MemoryConfig::default();
        s.record_episodic_event(
            "u1",
            EventType::FactStored,
            "the user prefers dark roast coffee".into(),
            None,
            None,
            &cfg,
            1_000_000,
        )
        .unwrap();
        s.record_episodic_event(
            "u1",
            EventType::FactStored,
            "the weather today is sunny".into(),
            None,
            None,
            &cfg,
            1_000_000,
        )
        .unwrap();

        let hits = s.search_episodic("u1", "coffee roast", 5, 1_000_000).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].event.content.contains("coffee"));
        assert!(hits[0].relevance > 0.0 && hits[0].relevance <= 1.0);
    }

    #[test]
    fn reinforce_increments_access_count() {
        let s = Store::open_in_memory().unwrap();
        let cfg = MemoryConfig::default();
        let e = s
            .record_episodic_event(
                "u1",
                EventType::FactStored,
                "likes tea".into(),
                None,
                None,
                &cfg,
                0,
            )
            .unwrap();
        s.reinforce_episodic(&e.id, 500).unwrap();
        let hits = s.search_episodic("u1", "tea", 5, 500).unwrap();
        assert_eq!(hits[0].event.access_count, 1);
    }

    #[test]
    fn consolidate_decays_prunes_and_merges() {
        let s = Store::open_in_memory().unwrap();
        let cfg = MemoryConfig::default();
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;

        // Decay candidate: accessed 8 days ago.
        let decay_me = s
            .record_episodic_event(
                "u1",
                EventType::FactStored,
                "user likes rust programming".into(),
                None,
                Some(0.6),
                &cfg,
                0,
            )
            .unwrap();

        // Prune candidate: low importance, never accessed, 31 days old.
        s.record_episodic_event(
            "u1",
            EventType::TaskCompleted,
            "ran a one-off script".into(),
            None,
            Some(0.05),
            &cfg,
            0,
        )
        .unwrap();

        // Merge candidates: near-duplicate content, same type.
        s.record_episodic_event(
            "u1",
            EventType::PreferenceLearned,
            "user prefers dark mode interfaces".into(),
            None,
            Some(0.5),
            &cfg,
            10 * DAY_MS,
        )
        .unwrap();
        s.record_episodic_event(
            "u1",
            EventType::PreferenceLearned,
            "user prefers dark mode interfaces always".into(),
            None,
            Some(0.5),
            &cfg,
            20 * DAY_MS,
        )
        .unwrap();

        let now = 31 * DAY_MS;
        let report = s.consolidate_episodic("u1", &cfg, now).unwrap();

        assert!(report.decayed >= 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.merged, 1);

        let decayed = s
            .search_episodic("u1", "rust programming", 5, now)
            .unwrap();
        assert!(decayed[0].event.importance < 0.6);
        let _ = decay_me;
    }
}
