use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shield engine (C8)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Points the shield engine at its declarative threat feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Path to the markdown document embedding fenced YAML threat blocks.
    /// An absent or empty feed is a valid "inactive" state — everything
    /// resolves to `log`.
    #[serde(default)]
    pub feed_path: Option<PathBuf>,
    /// How often the feed is re-read from disk, in milliseconds.
    #[serde(default = "d_60000")]
    pub reload_interval_ms: u64,
    /// Confidence below which a `block` action is downgraded to
    /// `require_approval` (unless severity is `critical`).
    #[serde(default = "d_085")]
    pub block_confidence_floor: f64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            feed_path: None,
            reload_interval_ms: 60_000,
            block_confidence_floor: 0.85,
        }
    }
}

fn d_60000() -> u64 {
    60_000
}
fn d_085() -> f64 {
    0.85
}
