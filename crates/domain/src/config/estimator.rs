use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timeout estimator (C10)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub tier_defaults_ms: TierDefaultsMs,
    /// Minimum `TaskMetric` rows required before a historical (P85) estimate
    /// is trusted over the tier default.
    #[serde(default = "d_5")]
    pub min_samples: usize,
    /// Multiplier applied to the P85 duration.
    #[serde(default = "d_15")]
    pub p85_multiplier: f64,
    /// Clamp range for the historical estimate, in ms.
    #[serde(default = "d_15000")]
    pub min_timeout_ms: u64,
    #[serde(default = "d_300000")]
    pub max_timeout_ms: u64,
    /// Sample count at which confidence saturates to 1.0.
    #[serde(default = "d_20")]
    pub confidence_saturation_samples: usize,
    /// Hard cap on adaptive extensions granted per run.
    #[serde(default = "d_2")]
    pub max_extensions: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            tier_defaults_ms: TierDefaultsMs::default(),
            min_samples: 5,
            p85_multiplier: 1.5,
            min_timeout_ms: 15_000,
            max_timeout_ms: 300_000,
            confidence_saturation_samples: 20,
            max_extensions: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierDefaultsMs {
    #[serde(default = "d_30000")]
    pub simple: u64,
    #[serde(default = "d_60000")]
    pub moderate: u64,
    #[serde(default = "d_120000")]
    pub complex: u64,
    #[serde(default = "d_180000")]
    pub reasoning: u64,
}

impl Default for TierDefaultsMs {
    fn default() -> Self {
        Self {
            simple: 30_000,
            moderate: 60_000,
            complex: 120_000,
            reasoning: 180_000,
        }
    }
}

fn d_5() -> usize {
    5
}
fn d_15() -> f64 {
    1.5
}
fn d_15000() -> u64 {
    15_000
}
fn d_300000() -> u64 {
    300_000
}
fn d_20() -> usize {
    20
}
fn d_2() -> u32 {
    2
}
fn d_30000() -> u64 {
    30_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_120000() -> u64 {
    120_000
}
fn d_180000() -> u64 {
    180_000
}
