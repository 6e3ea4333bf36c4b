use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence store (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the relational store file. Defaults to `data/tinyclaw.db`
    /// under the workspace root.
    #[serde(default = "d_path")]
    pub path: PathBuf,
    /// Default number of recent conversation entries the primary loop
    /// loads per turn.
    #[serde(default = "d_20")]
    pub recent_history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            recent_history_limit: 20,
        }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("data/tinyclaw.db")
}
fn d_20() -> usize {
    20
}
