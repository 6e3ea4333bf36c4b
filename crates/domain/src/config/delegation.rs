use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delegation subsystem (C12 lifecycle, C13 templates, C14 background runner)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub lifecycle: SubagentLifecycleConfig,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            background: BackgroundConfig::default(),
            templates: TemplatesConfig::default(),
            lifecycle: SubagentLifecycleConfig::default(),
        }
    }
}

/// Background runner (C14) concurrency policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Maximum `running` tasks permitted per user at once.
    #[serde(default = "d_3")]
    pub max_concurrent_per_user: usize,
    /// A running task older than this (ms) is considered stale by
    /// `cleanup_stale` and force-failed.
    #[serde(default = "d_1800000")]
    pub stale_after_ms: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_user: 3,
            stale_after_ms: 1_800_000,
        }
    }
}

/// Role template manager (C13) policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "d_50")]
    pub max_per_user: usize,
    /// Minimum token-overlap ratio for `findBestMatch` to return a hit.
    #[serde(default = "d_03")]
    pub match_threshold: f64,
    /// Tags extracted from task text on auto-creation are capped at this
    /// many unique tokens (length > 3).
    #[serde(default = "d_10")]
    pub auto_tag_cap: usize,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            max_per_user: 50,
            match_threshold: 0.3,
            auto_tag_cap: 10,
        }
    }
}

/// Sub-agent lifecycle manager (C12) policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentLifecycleConfig {
    /// Soft-deleted agents are garbage collected after this TTL (ms).
    #[serde(default = "d_604800000")]
    pub soft_delete_ttl_ms: u64,
}

impl Default for SubagentLifecycleConfig {
    fn default() -> Self {
        Self {
            soft_delete_ttl_ms: 604_800_000, // 7 days
        }
    }
}

fn d_3() -> usize {
    3
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_50() -> usize {
    50
}
fn d_03() -> f64 {
    0.3
}
fn d_10() -> usize {
    10
}
fn d_604800000() -> u64 {
    604_800_000
}
