//! Skill discovery and readiness — scans `skills/` for `skill.toml` +
//! `SKILL.md` pairs, parses manifests, and tracks which skills are ready
//! to be offered to the agent loop (C3 in the component model).

pub mod aliases;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod types;

pub use aliases::ToolAliasMap;
pub use manifest::{ReadinessStatus, SkillManifest, SkillReadiness};
pub use registry::{ReadinessSummary, SkillsRegistry};
pub use types::{RiskTier, SkillEntry};
