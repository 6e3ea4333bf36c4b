//! `sa-shield` — the Shield Engine (C8, §4.8) and Shell Permission Engine
//! (C9, §4.9). The spec treats these as one subsystem: both gate an
//! otherwise-autonomous tool call behind a declarative rule set, both
//! resolve to the same three-way verdict shape, and both hand `log` as the
//! safe default when unconfigured.

pub mod engine;
pub mod shell;
pub mod threat;

pub use engine::{Decision, DecisionAction, PolicyEvent, Scope, ShieldEngine};
pub use shell::{ApprovalRecord, ShellDecision, ShellEvalResult, ShellPermissionEngine};
pub use threat::{parse_feed, ThreatEntry};
