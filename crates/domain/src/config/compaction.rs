use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction collapses old conversation history into a tiered summary so
/// the context window doesn't overflow after many turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Enable automatic compaction when message count exceeds `threshold`.
    #[serde(default = "d_true")]
    pub auto: bool,
    /// Message-count threshold that triggers compaction.
    #[serde(default = "d_80")]
    pub threshold: usize,
    /// Number of most-recent messages kept verbatim after compaction.
    #[serde(default = "d_20")]
    pub keep_recent: usize,
    /// Near-duplicate dedup: 5-gram shingle Jaccard similarity above which
    /// a message is dropped as a near-duplicate of an earlier retained one.
    #[serde(default = "d_085")]
    pub dedup_threshold: f64,
    /// Token budgets for the tiered summary (L0 terse, L1 medium, L2 full).
    #[serde(default)]
    pub token_budgets: TokenBudgets,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            auto: true,
            threshold: 80,
            keep_recent: 20,
            dedup_threshold: 0.85,
            token_budgets: TokenBudgets::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudgets {
    #[serde(default = "d_200")]
    pub l0: usize,
    #[serde(default = "d_500")]
    pub l1: usize,
    #[serde(default = "d_1500")]
    pub l2: usize,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            l0: 200,
            l1: 500,
            l2: 1500,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls automatic memory capture — the always-on behaviour that
/// makes the agent feel alive across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLifecycleConfig {
    /// Automatically capture each turn to long-term memory.
    #[serde(default = "d_true")]
    pub auto_capture: bool,
    /// Ingest a session summary to memory when compaction runs.
    #[serde(default = "d_true")]
    pub capture_on_compaction: bool,
}

impl Default for MemoryLifecycleConfig {
    fn default() -> Self {
        Self {
            auto_capture: true,
            capture_on_compaction: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_80() -> usize {
    80
}
fn d_20() -> usize {
    20
}
fn d_085() -> f64 {
    0.85
}
fn d_200() -> usize {
    200
}
fn d_500() -> usize {
    500
}
fn d_1500() -> usize {
    1500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CompactionConfig::default();
        assert_eq!(cfg.threshold, 80);
        assert_eq!(cfg.keep_recent, 20);
        assert!((cfg.dedup_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(cfg.token_budgets.l0, 200);
        assert_eq!(cfg.token_budgets.l1, 500);
        assert_eq!(cfg.token_budgets.l2, 1500);
    }
}
