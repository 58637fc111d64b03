//! Rate-limit detector. A pure function over an iteration's raw
//! output; no state, no I/O. Grounded in the text-matching style of
//! `services/priority_calculator.rs` (small deterministic helpers) and the
//! regex-based scanning `services/circuit_breaker.rs` uses for failure
//! classification.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::models::iteration_result::RateLimitInfo;

/// Known substrings emitted by supported agent CLIs when they've been
/// rate-limited. Matched case-insensitively against combined stdout+stderr.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimited",
    "too many requests",
    "quota exceeded",
    "usage limit reached",
    "429",
];

static RETRY_AFTER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry-after:\s*(\d+)").unwrap());

static RETRY_AFTER_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:retry|try again|wait)\D{0,10}(\d+)\s*(?:s|sec|second|seconds|m|min|minute|minutes)\b")
        .unwrap()
});

#[derive(Debug, Clone)]
pub struct AgentOutput<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub exit_code: Option<i32>,
    pub agent_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct RateLimitDetection {
    pub is_rate_limit: bool,
    pub info: Option<RateLimitInfo>,
}

/// Classifies an iteration's output as rate-limited or not. Exit code alone
/// is never sufficient — a nonzero exit with no matching text is an
/// ordinary failure, not a rate limit.
pub fn detect(output: &AgentOutput<'_>) -> RateLimitDetection {
    let combined = format!("{}\n{}", output.stdout, output.stderr);
    let lower = combined.to_lowercase();

    let matched = RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p));
    if !matched {
        return RateLimitDetection {
            is_rate_limit: false,
            info: None,
        };
    }

    let retry_after_seconds = RETRY_AFTER_HEADER
        .captures(&combined)
        .or_else(|| RETRY_AFTER_PHRASE.captures(&combined))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    RateLimitDetection {
        is_rate_limit: true,
        info: Some(RateLimitInfo {
            message: extract_message(&combined),
            retry_after_seconds,
        }),
    }
}

fn extract_message(combined: &str) -> String {
    combined
        .lines()
        .find(|line| {
            let lower = line.to_lowercase();
            RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
        })
        .map_or_else(|| "rate limited".to_string(), str::trim)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output<'a>(stdout: &'a str, stderr: &'a str) -> AgentOutput<'a> {
        AgentOutput {
            stdout,
            stderr,
            exit_code: Some(1),
            agent_id: "claude",
        }
    }

    #[test]
    fn detects_common_rate_limit_phrasing() {
        let out = output("Error: rate limit exceeded, please slow down", "");
        let result = detect(&out);
        assert!(result.is_rate_limit);
        assert!(result.info.unwrap().message.to_lowercase().contains("rate limit"));
    }

    #[test]
    fn exit_code_alone_is_not_sufficient() {
        let out = output("compilation failed: missing semicolon", "");
        let result = detect(&out);
        assert!(!result.is_rate_limit);
    }

    #[test]
    fn extracts_retry_after_header_seconds() {
        let out = output("429 too many requests\nRetry-After: 45", "");
        let result = detect(&out);
        assert!(result.is_rate_limit);
        assert_eq!(result.info.unwrap().retry_after_seconds, Some(45));
    }

    #[test]
    fn extracts_retry_after_from_prose_phrasing() {
        let out = output("", "quota exceeded, please try again in 30 seconds");
        let result = detect(&out);
        assert!(result.is_rate_limit);
        assert_eq!(result.info.unwrap().retry_after_seconds, Some(30));
    }

    #[test]
    fn missing_retry_after_is_none() {
        let out = output("usage limit reached for this billing period", "");
        let result = detect(&out);
        assert!(result.is_rate_limit);
        assert_eq!(result.info.unwrap().retry_after_seconds, None);
    }
}
