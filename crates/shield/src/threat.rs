//! Threat feed data model and parser (§3 `ThreatEntry`, §6 SHIELD format).
//!
//! The feed is a markdown document embedding fenced `yaml` blocks, one block
//! per threat entry. Each entry's `recommendation_agent` field carries one or
//! more `BLOCK:|APPROVE:|LOG: <condition>` directives as free text; this
//! module splits that text into structured [`Directive`]s so the engine
//! never has to re-parse it on every `evaluate` call.

use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tool,
    Prompt,
    Skill,
    SupplyChain,
    Vulnerability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Block,
    RequireApproval,
    Log,
}

impl Action {
    /// `block > require_approval > log`, used to rank competing matches.
    fn precedence(self) -> u8 {
        match self {
            Action::Block => 2,
            Action::RequireApproval => 1,
            Action::Log => 0,
        }
    }
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Directive — one BLOCK:/APPROVE:/LOG: <condition> clause
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Directive {
    pub action: Action,
    pub condition: String,
}

/// Split a `recommendation_agent` blob into its directives. A line (or
/// semicolon-separated clause) of form `BLOCK: ...`, `APPROVE: ...`, or
/// `LOG: ...` becomes one directive; free text with no recognized prefix is
/// kept as a single `Log` directive so it is never silently dropped.
pub fn parse_directives(recommendation_agent: &str) -> Vec<Directive> {
    let mut directives = Vec::new();
    for clause in recommendation_agent.split(['\n', ';']) {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (action, rest) = if let Some(rest) = strip_prefix_ci(clause, "BLOCK:") {
            (Action::Block, rest)
        } else if let Some(rest) = strip_prefix_ci(clause, "APPROVE:") {
            (Action::RequireApproval, rest)
        } else if let Some(rest) = strip_prefix_ci(clause, "LOG:") {
            (Action::Log, rest)
        } else {
            (Action::Log, clause)
        };
        let condition = rest.trim().to_string();
        if !condition.is_empty() {
            directives.push(Directive { action, condition });
        }
    }
    directives
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ThreatEntry (§3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
struct RawThreatEntry {
    id: String,
    fingerprint: String,
    category: Category,
    severity: Severity,
    confidence: f64,
    action: Action,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    recommendation_agent: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    revoked: bool,
    #[serde(default)]
    #[allow(dead_code)]
    revoked_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ThreatEntry {
    pub id: String,
    #[allow(dead_code)]
    pub fingerprint: String,
    pub category: Category,
    pub severity: Severity,
    pub confidence: f64,
    pub expires_at: Option<i64>,
    pub revoked: bool,
    /// Directives parsed out of `recommendation_agent`, falling back to a
    /// single directive built from the top-level `action` field when the
    /// text carries no recognized `BLOCK:`/`APPROVE:`/`LOG:` prefix.
    pub directives: Vec<Directive>,
}

impl From<RawThreatEntry> for ThreatEntry {
    fn from(raw: RawThreatEntry) -> Self {
        let mut directives = parse_directives(&raw.recommendation_agent);
        if directives.is_empty() {
            directives.push(Directive {
                action: raw.action,
                condition: raw.recommendation_agent.clone(),
            });
        }
        ThreatEntry {
            id: raw.id,
            fingerprint: raw.fingerprint,
            category: raw.category,
            severity: raw.severity,
            confidence: raw.confidence,
            expires_at: raw.expires_at,
            revoked: raw.revoked,
            directives,
        }
    }
}

impl ThreatEntry {
    /// Not revoked and (no expiry or expiry in the future relative to `now`).
    pub fn is_active(&self, now: i64) -> bool {
        !self.revoked && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feed parsing — fenced ```yaml blocks embedded in a markdown doc
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse every fenced `yaml` code block in `markdown` into a `ThreatEntry`.
/// Blocks that fail to parse are skipped with a warning rather than failing
/// the whole feed — one malformed entry must not blind the engine to the
/// rest of the feed.
pub fn parse_feed(markdown: &str) -> Vec<ThreatEntry> {
    let mut entries = Vec::new();
    let mut lines = markdown.lines().peekable();
    let mut block: Option<Vec<&str>> = None;

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        match &mut block {
            None => {
                if trimmed.starts_with("```yaml") || trimmed.starts_with("```yml") {
                    block = Some(Vec::new());
                }
            }
            Some(buf) => {
                if trimmed.starts_with("```") {
                    let yaml = buf.join("\n");
                    match serde_yaml::from_str::<RawThreatEntry>(&yaml) {
                        Ok(raw) => entries.push(ThreatEntry::from(raw)),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed threat feed block");
                        }
                    }
                    block = None;
                } else {
                    buf.push(line);
                }
            }
        }
    }
    entries
}

/// Load and parse a feed from disk. An absent file is a valid "inactive"
/// feed (returns an empty vec), not an error — the shield engine must keep
/// functioning (always `log`) when no feed has been configured yet.
pub fn load_feed(path: &std::path::Path) -> Result<Vec<ThreatEntry>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(parse_feed(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQL_FEED: &str = r#"
# Threat Feed

```yaml
id: t-sql-1
fingerprint: sql-injection-args
category: tool
severity: high
confidence: 0.9
action: block
title: SQL injection via tool arguments
recommendation_agent: "BLOCK: tool.call with arguments containing SQL syntax (DROP, DELETE)"
```
"#;

    #[test]
    fn parses_single_yaml_block() {
        let entries = parse_feed(SQL_FEED);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "t-sql-1");
        assert_eq!(entries[0].directives.len(), 1);
        assert_eq!(entries[0].directives[0].action, Action::Block);
    }

    #[test]
    fn revoked_entries_are_inactive() {
        let mut e = parse_feed(SQL_FEED).remove(0);
        e.revoked = true;
        assert!(!e.is_active(0));
    }

    #[test]
    fn expired_entries_are_inactive() {
        let mut e = parse_feed(SQL_FEED).remove(0);
        e.expires_at = Some(100);
        assert!(e.is_active(50));
        assert!(!e.is_active(150));
    }

    #[test]
    fn multi_directive_text_splits_on_newline() {
        let directives = parse_directives(
            "BLOCK: tool.call execute_code\nAPPROVE: tool.call write_file\nLOG: anything else",
        );
        assert_eq!(directives.len(), 3);
        assert_eq!(directives[0].action, Action::Block);
        assert_eq!(directives[1].action, Action::RequireApproval);
        assert_eq!(directives[2].action, Action::Log);
    }

    #[test]
    fn malformed_block_is_skipped_not_fatal() {
        let bad = "```yaml\nnot: [valid, entry\n```\n";
        assert!(parse_feed(bad).is_empty());
    }

    #[test]
    fn missing_file_is_an_inactive_feed_not_an_error() {
        let entries = load_feed(std::path::Path::new("/nonexistent/feed.md")).unwrap();
        assert!(entries.is_empty());
    }
}
