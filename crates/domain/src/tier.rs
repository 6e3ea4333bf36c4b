use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Output of the query classifier (C5) and the key into the provider
/// routing map (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Simple,
    Moderate,
    Complex,
    Reasoning,
}

impl Tier {
    /// Fall-down order used by the provider registry: exact tier first,
    /// then each tier below it, then the mandatory fallback.
    pub fn fall_down(self) -> &'static [Tier] {
        use Tier::*;
        match self {
            Reasoning => &[Reasoning, Complex, Moderate, Simple],
            Complex => &[Complex, Moderate, Simple],
            Moderate => &[Moderate, Simple],
            Simple => &[Simple],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Moderate => "moderate",
            Tier::Complex => "complex",
            Tier::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
