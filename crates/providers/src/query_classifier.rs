//! Pure rule-based query classifier (C5).
//!
//! Scores raw message text across eight weighted dimensions and derives a
//! tier from fixed thresholds. No I/O, no async, no history — the same
//! string always yields the same `Classification`. This is distinct from
//! [`crate::classifier`], which classifies by embedding similarity against
//! reference prompts for the smart router; this module is the cheap,
//! synchronous fallback/primary path that needs no embedding endpoint.

use std::collections::HashMap;

use sa_domain::config::QueryClassifierConfig;
use sa_domain::tier::Tier;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixed vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Single-word entries are matched as whole tokens (so "hi" doesn't fire
// inside "this"); entries containing whitespace or punctuation are matched
// as substrings of the lowercased message.

const REASONING_KEYWORDS: &[&str] = &[
    "why", "prove", "derive", "justify", "reasoning", "theorem", "logically", "rigorously",
];
const CODE_KEYWORDS: &[&str] = &[
    "algorithm", "function", "refactor", "compile", "variable", "code", "script", "regex",
    "stack trace", "bug",
];
const MULTI_STEP_MARKERS: &[&str] = &[
    "step by step", "step 1", "first,", "firstly", "secondly", "finally,", "after that", "then,",
];
const TECHNICAL_KEYWORDS: &[&str] = &[
    "algorithm", "complexity", "o(n", "log n", "api", "database", "server", "protocol",
    "architecture", "kubernetes", "docker", "schema",
];
const GREETING_KEYWORDS: &[&str] = &["hi", "hello", "hey", "yo", "good morning", "good evening"];
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "must", "should", "required", "constraint", "no more than", "at least", "within",
];
const CREATIVE_KEYWORDS: &[&str] = &[
    "poem", "story", "imagine", "brainstorm", "creative", "fictional",
];

/// Count distinct vocabulary entries present in the message.
///
/// Keywords with no whitespace/punctuation are matched as whole tokens;
/// keywords containing a space or symbol are matched as substrings of the
/// lowercased text (safe for short fragments like `"o(n"` that tokenizing
/// would otherwise mangle).
fn count_matches(lower: &str, tokens: &[&str], vocab: &[&str]) -> usize {
    vocab
        .iter()
        .filter(|kw| {
            if kw.chars().all(|c| c.is_ascii_alphanumeric()) {
                tokens.iter().any(|t| t == *kw)
            } else {
                lower.contains(*kw)
            }
        })
        .count()
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tier: Tier,
    pub score: f64,
    /// `1 / (1 + exp(-12 * d))` where `d` is the distance from `score` to
    /// the nearest tier boundary. High when the score sits far from a
    /// threshold, low near one.
    pub confidence: f64,
    pub dimensions: HashMap<&'static str, f64>,
    pub estimated_tokens: usize,
}

/// Classify a message's text. Pure: identical input always yields an
/// identical `Classification`.
pub fn classify(message: &str, config: &QueryClassifierConfig) -> Classification {
    let lower = message.to_lowercase();
    let tokens = tokenize(&lower);
    let w = &config.weights;

    let mut dims = HashMap::new();

    let reasoning = match count_matches(&lower, &tokens, REASONING_KEYWORDS) {
        0 => 0.0,
        1 => 0.3,
        _ => 1.0,
    };
    dims.insert("reasoning", reasoning * w.reasoning);

    let code = match count_matches(&lower, &tokens, CODE_KEYWORDS) {
        0 => 0.0,
        1 => 0.3,
        _ => 1.0,
    };
    dims.insert("code", code * w.code);

    let multi_step = match count_matches(&lower, &tokens, MULTI_STEP_MARKERS) {
        0 => 0.0,
        1 => 0.4,
        _ => 0.8,
    };
    dims.insert("multi_step", multi_step * w.multi_step);

    let technical = match count_matches(&lower, &tokens, TECHNICAL_KEYWORDS) {
        0 => 0.0,
        1 | 2 => 0.3,
        _ => 1.0,
    };
    dims.insert("technical", technical * w.technical);

    let estimated_tokens = (message.chars().count() + 3) / 4;
    let length = if estimated_tokens < 30 {
        -0.5
    } else if estimated_tokens > 200 {
        0.8
    } else if estimated_tokens >= 100 {
        0.3
    } else {
        0.0
    };
    dims.insert("length", length * w.length);

    let greeting = if count_matches(&lower, &tokens, GREETING_KEYWORDS) > 0 {
        -1.0
    } else {
        0.0
    };
    dims.insert("greeting", greeting * w.greeting);

    let constraint = match count_matches(&lower, &tokens, CONSTRAINT_KEYWORDS) {
        0 => 0.0,
        1 => 0.3,
        _ => 1.0,
    };
    dims.insert("constraint", constraint * w.constraint);

    let creative = if count_matches(&lower, &tokens, CREATIVE_KEYWORDS) > 0 {
        0.7
    } else {
        0.0
    };
    dims.insert("creative", creative * w.creative);

    let score: f64 = dims.values().sum();

    let t = &config.thresholds;
    let tier = if score < t.simple_max {
        Tier::Simple
    } else if score < t.moderate_max {
        Tier::Moderate
    } else if score < t.complex_max {
        Tier::Complex
    } else {
        Tier::Reasoning
    };

    let d = [t.simple_max, t.moderate_max, t.complex_max]
        .iter()
        .map(|b| (score - b).abs())
        .fold(f64::INFINITY, f64::min);
    let confidence = 1.0 / (1.0 + (-12.0 * d).exp());

    Classification {
        tier,
        score,
        confidence,
        dimensions: dims,
        estimated_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> QueryClassifierConfig {
        QueryClassifierConfig::default()
    }

    #[test]
    fn classify_is_pure() {
        let a = classify("Write me a story about a dragon", &cfg());
        let b = classify("Write me a story about a dragon", &cfg());
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_in_bounds() {
        for msg in ["hi there!", "Prove step by step why this algorithm is O(n log n).", ""] {
            let c = classify(msg, &cfg());
            assert!((0.0..=1.0).contains(&c.confidence), "{msg:?} -> {}", c.confidence);
        }
    }

    #[test]
    fn s1_simple_greeting() {
        let c = classify("hi there!", &cfg());
        assert_eq!(c.tier, Tier::Simple);
        assert!(c.score <= -0.05, "score was {}", c.score);
    }

    #[test]
    fn s2_reasoning_proof_question() {
        let c = classify(
            "Prove step by step why this algorithm is O(n log n).",
            &cfg(),
        );
        assert_eq!(c.tier, Tier::Reasoning, "score was {}", c.score);
    }

    #[test]
    fn long_technical_prompt_skews_complex_or_above() {
        let long_prompt = "Design a REST API for a multi-tenant SaaS application with rate limiting, an authentication protocol, and a database schema that scales. ".repeat(3);
        let c = classify(&long_prompt, &cfg());
        assert!(c.tier >= Tier::Moderate, "tier was {:?}", c.tier);
    }

    #[test]
    fn greeting_does_not_false_positive_on_substrings() {
        // "this" contains "hi" as a substring but must not match the
        // whole-token greeting keyword "hi".
        let c = classify("this is a short question", &cfg());
        assert_eq!(*c.dimensions.get("greeting").unwrap(), 0.0);
    }

    #[test]
    fn token_estimate_matches_chars_over_four() {
        let c = classify("abcd", &cfg());
        assert_eq!(c.estimated_tokens, 1);
        let c = classify("abcde", &cfg());
        assert_eq!(c.estimated_tokens, 2);
    }
}
