use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory engine (C16)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub default_importance: DefaultImportance,
    /// Decay multiplier applied to importance when an event has not been
    /// accessed in `decay_after_days`.
    #[serde(default = "d_095")]
    pub decay_factor: f64,
    #[serde(default = "d_7")]
    pub decay_after_days: i64,
    /// Prune events below this importance once they're both unaccessed and
    /// older than `prune_after_days`.
    #[serde(default = "d_01")]
    pub prune_importance_floor: f64,
    #[serde(default = "d_30")]
    pub prune_after_days: i64,
    /// Jaccard similarity of content tokens above which two same-type
    /// events are merged during consolidation.
    #[serde(default = "d_08")]
    pub merge_similarity_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_importance: DefaultImportance::default(),
            decay_factor: 0.95,
            decay_after_days: 7,
            prune_importance_floor: 0.1,
            prune_after_days: 30,
            merge_similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DefaultImportance {
    #[serde(default = "d_09")]
    pub correction: f64,
    #[serde(default = "d_08")]
    pub preference_learned: f64,
    #[serde(default = "d_06")]
    pub fact_stored: f64,
    #[serde(default = "d_05")]
    pub task_completed: f64,
    #[serde(default = "d_05")]
    pub delegation_result: f64,
}

impl Default for DefaultImportance {
    fn default() -> Self {
        Self {
            correction: 0.9,
            preference_learned: 0.8,
            fact_stored: 0.6,
            task_completed: 0.5,
            delegation_result: 0.5,
        }
    }
}

fn d_095() -> f64 {
    0.95
}
fn d_7() -> i64 {
    7
}
fn d_01() -> f64 {
    0.1
}
fn d_30() -> i64 {
    30
}
fn d_08() -> f64 {
    0.8
}
fn d_09() -> f64 {
    0.9
}
fn d_06() -> f64 {
    0.6
}
fn d_05() -> f64 {
    0.5
}
