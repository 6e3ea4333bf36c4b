//! Reusable role template matching and bookkeeping (C13).
//!
//! `find_best_match` does simple lexical tokenization and overlap scoring
//! rather than embeddings — consistent with the rest of this crate's C5
//! sibling, the pure rule-based query classifier, rather than the
//! embedding-backed router classifier `sa-providers` carries for C6.

use std::collections::HashSet;
use std::sync::Arc;

use sa_domain::config::TemplatesConfig;
use sa_domain::error::{Error, Result};
use sa_store::templates::NewRoleTemplate;
use sa_store::{RoleTemplate, Store};

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "for", "in", "on", "with", "is", "are", "be",
    "this", "that", "it", "me", "my", "you", "your",
];

/// Lowercase, strip non-alphanumerics, drop tokens of length <= 2 and stop
/// words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn overlap_ratio(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub struct TemplateManager {
    store: Arc<Store>,
    config: TemplatesConfig,
}

impl TemplateManager {
    pub fn new(store: Arc<Store>, config: TemplatesConfig) -> Self {
        Self { store, config }
    }

    /// Best existing template whose name/description tokens overlap the
    /// task description at or above `match_threshold`, or `None`.
    pub fn find_best_match(&self, user_id: &str, task_description: &str) -> Result<Option<RoleTemplate>> {
        let task_tokens = tokenize(task_description);
        let templates = self.store.list_role_templates(user_id)?;

        let mut best: Option<(f64, RoleTemplate)> = None;
        for template in templates {
            let template_tokens = tokenize(&format!("{} {}", template.name, template.role_description));
            let score = overlap_ratio(&task_tokens, &template_tokens);
            if score >= self.config.match_threshold {
                if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                    best = Some((score, template));
                }
            }
        }
        Ok(best.map(|(_, t)| t))
    }

    /// Create a template, auto-tagging it from the task description's
    /// tokens (deduplicated, capped at `auto_tag_cap`). Refuses once the
    /// user is at `max_per_user`.
    pub fn create(
        &self,
        id: String,
        user_id: &str,
        name: &str,
        role_description: &str,
        default_tools: Vec<String>,
        default_tier: Option<String>,
        now: i64,
    ) -> Result<RoleTemplate> {
        let existing = self.store.count_role_templates(user_id)?;
        if existing >= self.config.max_per_user {
            return Err(Error::Capacity(format!(
                "role template cap reached ({} per user)",
                self.config.max_per_user
            )));
        }

        let mut tags: Vec<String> = tokenize(role_description);
        tags.sort();
        tags.dedup();
        tags.truncate(self.config.auto_tag_cap);

        self.store.create_role_template(NewRoleTemplate {
            id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            role_description: role_description.to_string(),
            default_tools,
            default_tier,
            tags,
            now,
        })
    }

    pub fn record_usage(&self, id: &str, performance_score: f64, now: i64) -> Result<()> {
        self.store.record_template_usage(id, performance_score, now)
    }

    pub fn get(&self, id: &str) -> Result<Option<RoleTemplate>> {
        self.store.get_role_template(id)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<RoleTemplate>> {
        self.store.list_role_templates(user_id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_role_template(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TemplateManager {
        TemplateManager::new(Arc::new(Store::open_in_memory().unwrap()), TemplatesConfig::default())
    }

    #[test]
    fn tokenize_drops_stop_words_and_short_tokens() {
        let tokens = tokenize("Go and research the API of this system");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"of".to_string()));
        assert!(!tokens.contains(&"go".to_string())); // len 2, dropped
        assert!(tokens.contains(&"research".to_string()));
        assert!(tokens.contains(&"system".to_string()));
    }

    #[test]
    fn find_best_match_respects_threshold() {
        let mgr = manager();
        mgr.create(
            "t1".into(),
            "u1",
            "researcher",
            "digs up facts about markets and competitors",
            vec!["web_search".into()],
            None,
            1000,
        )
        .unwrap();

        let hit = mgr.find_best_match("u1", "research the competitor market landscape").unwrap();
        assert!(hit.is_some());

        let miss = mgr.find_best_match("u1", "write a poem about the ocean").unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn create_enforces_per_user_cap() {
        let mgr = TemplateManager::new(
            Arc::new(Store::open_in_memory().unwrap()),
            TemplatesConfig {
                max_per_user: 1,
                ..TemplatesConfig::default()
            },
        );
        mgr.create("t1".into(), "u1", "a", "desc one", vec![], None, 0).unwrap();
        assert!(mgr.create("t2".into(), "u1", "b", "desc two", vec![], None, 0).is_err());
    }
}
