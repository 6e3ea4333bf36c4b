//! Adaptive task timeout estimation (C10).
//!
//! Falls back to fixed per-tier defaults until enough history accumulates
//! in `task_metrics`, then switches to a P85-of-history estimate. Grounded
//! on the config/store split the rest of this crate follows: constants
//! live in `sa_domain::config::EstimatorConfig`, samples live in
//! `sa_store::TaskMetric`, and this module is pure policy over both.

use std::sync::Arc;

use sa_domain::config::EstimatorConfig;
use sa_domain::error::Result;
use sa_domain::tier::Tier;
use sa_store::{Store, TaskMetric};

/// Coarse task-type bucket, used to key the historical-duration lookup.
/// Keyword matching is deliberately simple and order-sensitive: the first
/// bucket whose keywords appear in the description wins.
const RESEARCH_KEYWORDS: &[&str] = &["research", "investigate", "look into", "find out", "search for"];
const CODE_KEYWORDS: &[&str] = &[
    "implement", "code", "function", "bug", "refactor", "debug", "write a test", "fix the",
];
const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "analysis", "compare", "evaluate", "review"];
const WRITING_KEYWORDS: &[&str] = &["write", "draft", "compose", "summarize", "summary"];

pub fn classify_task_type(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if any(RESEARCH_KEYWORDS) {
        "research"
    } else if any(CODE_KEYWORDS) {
        "code"
    } else if any(ANALYSIS_KEYWORDS) {
        "analysis"
    } else if any(WRITING_KEYWORDS) {
        "writing"
    } else {
        "simple_lookup"
    }
}

/// Default extra iterations granted by an iteration-pressure extension.
const EXTRA_ITERATIONS: u32 = 5;

/// Default extra time granted by a time-pressure extension.
const EXTRA_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extension {
    pub extend: bool,
    pub extra_iterations: u32,
    pub extra_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub task_type: String,
    pub timeout_ms: u64,
    /// `0.0` when falling back to the tier default, rising to `1.0` as
    /// historical samples approach `confidence_saturation_samples`.
    pub confidence: f64,
    pub sample_count: usize,
}

pub struct TimeoutEstimator {
    store: Arc<Store>,
    config: EstimatorConfig,
}

impl TimeoutEstimator {
    pub fn new(store: Arc<Store>, config: EstimatorConfig) -> Self {
        Self { store, config }
    }

    pub fn estimate(&self, description: &str, tier: Tier) -> Result<Estimate> {
        let task_type = classify_task_type(description);
        let durations = self.store.durations_for(task_type, tier.as_str())?;

        if durations.len() >= self.config.min_samples {
            let p85 = percentile85(&durations);
            let scaled = (p85 as f64 * self.config.p85_multiplier).round() as u64;
            let timeout_ms = scaled.clamp(self.config.min_timeout_ms, self.config.max_timeout_ms);
            let confidence = (durations.len() as f64
                / self.config.confidence_saturation_samples as f64)
                .min(1.0);
            Ok(Estimate {
                task_type: task_type.to_string(),
                timeout_ms,
                confidence,
                sample_count: durations.len(),
            })
        } else {
            let timeout_ms = match tier {
                Tier::Simple => self.config.tier_defaults_ms.simple,
                Tier::Moderate => self.config.tier_defaults_ms.moderate,
                Tier::Complex => self.config.tier_defaults_ms.complex,
                Tier::Reasoning => self.config.tier_defaults_ms.reasoning,
            };
            Ok(Estimate {
                task_type: task_type.to_string(),
                timeout_ms,
                confidence: 0.0,
                sample_count: durations.len(),
            })
        }
    }

    /// Whether a running task should be granted another extension, given
    /// iteration and time pressure against its budget. Refuses once
    /// `extensions_so_far` already hit `max_extensions`.
    ///
    /// Two independent pressure signals, checked in order:
    /// - iteration pressure: burning through iterations faster than time
    ///   (`iterDone ≥ 0.7·iterMax` while `elapsed < 0.8·budget`) grants
    ///   more iterations.
    /// - time pressure: burning through the clock faster than iterations
    ///   (`elapsed ≥ 0.9·budget` while `iterDone < 0.5·iterMax`) grants
    ///   more wall-clock time.
    ///
    /// Neither condition stacks with the other; the first one that fires
    /// wins.
    pub fn should_extend(
        &self,
        iterations_done: u32,
        iterations_max: u32,
        elapsed_ms: u64,
        budget_ms: u64,
        extensions_so_far: u32,
    ) -> Extension {
        if extensions_so_far >= self.config.max_extensions {
            return Extension::default();
        }

        let iter_done = iterations_done as f64;
        let iter_max = iterations_max as f64;
        let elapsed = elapsed_ms as f64;
        let budget = budget_ms as f64;

        let iteration_pressure = iter_max > 0.0 && iter_done >= 0.7 * iter_max && elapsed < 0.8 * budget;
        if iteration_pressure {
            return Extension {
                extend: true,
                extra_iterations: EXTRA_ITERATIONS,
                extra_ms: 0,
            };
        }

        let time_pressure = budget > 0.0 && elapsed >= 0.9 * budget && iter_done < 0.5 * iter_max;
        if time_pressure {
            return Extension {
                extend: true,
                extra_iterations: 0,
                extra_ms: EXTRA_MS,
            };
        }

        Extension::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        user_id: &str,
        task_type: &str,
        tier: Tier,
        duration_ms: u64,
        iterations: u32,
        success: bool,
        now: i64,
    ) -> Result<()> {
        self.store.record_task_metric(&TaskMetric {
            user_id: user_id.to_string(),
            task_type: task_type.to_string(),
            tier: tier.as_str().to_string(),
            duration_ms,
            iterations,
            success,
            created_at: now,
        })
    }
}

/// Nearest-rank P85 over an unsorted sample set.
fn percentile85(samples: &[u64]) -> u64 {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64 - 1.0) * 0.85).ceil() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TimeoutEstimator {
        TimeoutEstimator::new(Arc::new(Store::open_in_memory().unwrap()), EstimatorConfig::default())
    }

    #[test]
    fn classifies_by_keyword_bucket() {
        assert_eq!(classify_task_type("please research the competitive landscape"), "research");
        assert_eq!(classify_task_type("implement a retry helper"), "code");
        assert_eq!(classify_task_type("analyze last week's latency"), "analysis");
        assert_eq!(classify_task_type("draft a summary email"), "writing");
        assert_eq!(classify_task_type("what time is it"), "simple_lookup");
    }

    #[test]
    fn falls_back_to_tier_default_with_no_history() {
        let est = estimator();
        let estimate = est.estimate("what time is it", Tier::Simple).unwrap();
        assert_eq!(estimate.timeout_ms, 30_000);
        assert_eq!(estimate.confidence, 0.0);
        assert_eq!(estimate.sample_count, 0);
    }

    #[test]
    fn uses_historical_p85_once_enough_samples_exist() {
        let est = estimator();
        for d in [1000u64, 2000, 3000, 4000, 10000] {
            est.record("u1", "research", Tier::Complex, d, 3, true, 1).unwrap();
        }
        let estimate = est.estimate("research the market", Tier::Complex).unwrap();
        assert_eq!(estimate.sample_count, 5);
        assert!(estimate.confidence > 0.0);
        // p85 of [1000,2000,3000,4000,10000] (nearest-rank, ceil((5-1)*0.85)=4) is 10000.
        assert_eq!(estimate.timeout_ms, 15_000.max((10_000f64 * 1.5) as u64).min(300_000));
    }

    #[test]
    fn should_extend_respects_hard_cap() {
        let est = estimator();
        let granted = est.should_extend(9, 10, 0, 100_000, 0);
        assert!(granted.extend);
        assert_eq!(granted.extra_iterations, 5);
        assert_eq!(granted.extra_ms, 0);

        let capped = est.should_extend(9, 10, 0, 100_000, 2);
        assert!(!capped.extend);
    }

    #[test]
    fn should_extend_time_pressure_grants_extra_ms() {
        let est = estimator();
        // Elapsed is 95% of budget, only 2/10 iterations used.
        let granted = est.should_extend(2, 10, 95_000, 100_000, 0);
        assert!(granted.extend);
        assert_eq!(granted.extra_ms, 30_000);
        assert_eq!(granted.extra_iterations, 0);
    }

    #[test]
    fn should_extend_neither_pressure_refuses() {
        let est = estimator();
        let result = est.should_extend(3, 10, 10_000, 100_000, 0);
        assert!(!result.extend);
    }
}
