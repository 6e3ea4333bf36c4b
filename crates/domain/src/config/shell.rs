use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shell permission engine (C9) + exec tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub exec: ShellExecConfig,
    #[serde(default)]
    pub permission: ShellPermissionConfig,
}

/// Exec tool configuration (OpenClaw-style auto-backgrounding semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellExecConfig {
    /// Yield time in ms before a foreground command auto-backgrounds
    /// (0 = always foreground).
    #[serde(default = "d_10000")]
    pub background_ms: u64,
    /// Hard timeout for foreground commands (seconds).
    #[serde(default = "d_1800")]
    pub timeout_sec: u64,
    /// TTL for finished process sessions before cleanup (ms).
    #[serde(default = "d_1800000")]
    pub cleanup_ms: u64,
    /// Max output chars kept per process session.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
}

impl Default for ShellExecConfig {
    fn default() -> Self {
        Self {
            background_ms: 10_000,
            timeout_sec: 1800,
            cleanup_ms: 1_800_000,
            max_output_chars: 1_000_000,
        }
    }
}

/// Extra allow/deny patterns layered on top of the fixed deny set and
/// built-in allow set that the shell permission engine always enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellPermissionConfig {
    /// Log every exec decision at INFO (allow/log) or WARN (deny) level.
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Additional admin-supplied deny patterns (regex), evaluated with
    /// the fixed deny set and always winning over any allow.
    #[serde(default)]
    pub extra_deny_patterns: Vec<String>,
    /// Admin-supplied glob allow patterns (`*` wildcard), step 4 of the
    /// evaluation order.
    #[serde(default)]
    pub allow_patterns: Vec<String>,
}

impl Default for ShellPermissionConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            extra_deny_patterns: Vec::new(),
            allow_patterns: Vec::new(),
        }
    }
}

fn d_10000() -> u64 {
    10_000
}
fn d_1800() -> u64 {
    1800
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_1000000() -> usize {
    1_000_000
}
fn d_true() -> bool {
    true
}
