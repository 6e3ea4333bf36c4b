use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query classifier (C5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tunable weights and tier thresholds for the rule-based query classifier.
/// The defaults reproduce the fixed weighting table exactly; they are
/// exposed as config so a deployment can retune without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryClassifierConfig {
    #[serde(default)]
    pub weights: DimensionWeights,
    #[serde(default)]
    pub thresholds: TierThresholds,
}

impl Default for QueryClassifierConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            thresholds: TierThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionWeights {
    #[serde(default = "d_020")]
    pub reasoning: f64,
    #[serde(default = "d_018")]
    pub code: f64,
    #[serde(default = "d_015")]
    pub multi_step: f64,
    #[serde(default = "d_012")]
    pub technical: f64,
    #[serde(default = "d_010")]
    pub length: f64,
    #[serde(default = "d_010")]
    pub greeting: f64,
    #[serde(default = "d_008")]
    pub constraint: f64,
    #[serde(default = "d_007")]
    pub creative: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            reasoning: 0.20,
            code: 0.18,
            multi_step: 0.15,
            technical: 0.12,
            length: 0.10,
            greeting: 0.10,
            constraint: 0.08,
            creative: 0.07,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Below this score → `simple`.
    #[serde(default = "d_neg005")]
    pub simple_max: f64,
    /// Below this score → `moderate`.
    #[serde(default = "d_015")]
    pub moderate_max: f64,
    /// Below this score → `complex`; else `reasoning`.
    #[serde(default = "d_035")]
    pub complex_max: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            simple_max: -0.05,
            moderate_max: 0.15,
            complex_max: 0.35,
        }
    }
}

fn d_020() -> f64 {
    0.20
}
fn d_018() -> f64 {
    0.18
}
fn d_015() -> f64 {
    0.15
}
fn d_012() -> f64 {
    0.12
}
fn d_010() -> f64 {
    0.10
}
fn d_008() -> f64 {
    0.08
}
fn d_007() -> f64 {
    0.07
}
fn d_neg005() -> f64 {
    -0.05
}
fn d_035() -> f64 {
    0.35
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = DimensionWeights::default();
        let sum = w.reasoning
            + w.code
            + w.multi_step
            + w.technical
            + w.length
            + w.greeting
            + w.constraint
            + w.creative;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_thresholds_match_spec() {
        let t = TierThresholds::default();
        assert!((t.simple_max - (-0.05)).abs() < f64::EPSILON);
        assert!((t.moderate_max - 0.15).abs() < f64::EPSILON);
        assert!((t.complex_max - 0.35).abs() < f64::EPSILON);
    }
}
