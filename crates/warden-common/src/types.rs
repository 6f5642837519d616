//! Core types shared across Warden components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-action gating policy.
///
/// - `max_fail_count == 0`: every request must carry a solved challenge
/// - `max_fail_count > 0`: a challenge is demanded only once the caller has
///   failed more than `max_fail_count` times in a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPolicy {
    /// Request field whose value identifies the caller
    pub identifier_field: String,

    /// Consecutive failures tolerated before verification kicks in
    pub max_fail_count: u32,
}

impl ActionPolicy {
    pub fn new(identifier_field: impl Into<String>, max_fail_count: u32) -> Self {
        Self {
            identifier_field: identifier_field.into(),
            max_fail_count,
        }
    }

    /// Returns true if every request to this action must be verified
    pub fn always_requires_captcha(&self) -> bool {
        self.max_fail_count == 0
    }

    /// Returns true if downstream outcomes feed the failure tracker
    pub fn tracks_failures(&self) -> bool {
        self.max_fail_count > 0
    }

    /// Returns true if a recorded failure count triggers verification
    pub fn is_exceeded_by(&self, count: u64) -> bool {
        count > u64::from(self.max_fail_count)
    }
}

/// Failure tracker key: the action name plus the caller's identifier value.
///
/// Counters never cross actions since the action is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureKey {
    pub action: String,
    pub identifier: String,
}

impl FailureKey {
    pub fn new(action: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for FailureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.action, self.identifier)
    }
}

/// Outcome of a downstream operation, reported back to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Success,
    Failure,
}

impl ActionOutcome {
    /// Parse a reported outcome (`success`/`ok`/`true` or `failure`/`error`/`false`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" | "true" => Some(Self::Success),
            "failure" | "fail" | "error" | "false" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Result of checking an answer against a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Answer matched
    Correct,
    /// Answer did not match
    Wrong,
    /// Challenge id unknown or expired
    Unknown,
}

/// Metrics snapshot for monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateStatsSnapshot {
    /// Challenge ids issued
    pub issued: u64,

    /// Challenge images rendered
    pub rendered: u64,

    /// Successful verifications
    pub verified: u64,

    /// Requests rejected for a missing challenge id/answer
    pub rejected_missing: u64,

    /// Requests rejected for a wrong answer
    pub rejected_wrong: u64,

    /// Downstream failures recorded against a caller
    pub failures_recorded: u64,

    /// Live failure counters
    pub tracked_keys: u64,

    /// Live challenges (memory store only)
    pub live_challenges: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_threshold_is_strict() {
        let policy = ActionPolicy::new("User", 2);
        assert!(policy.tracks_failures());
        assert!(!policy.always_requires_captcha());
        assert!(!policy.is_exceeded_by(2));
        assert!(policy.is_exceeded_by(3));
    }

    #[test]
    fn test_zero_policy_always_requires() {
        let policy = ActionPolicy::new("", 0);
        assert!(policy.always_requires_captcha());
        assert!(!policy.tracks_failures());
    }

    #[test]
    fn test_failure_key_display() {
        let key = FailureKey::new("User.Login", "alice");
        assert_eq!(key.to_string(), "User.Login|alice");
        assert_ne!(key, FailureKey::new("User.Reset", "alice"));
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!(ActionOutcome::parse("Success"), Some(ActionOutcome::Success));
        assert_eq!(ActionOutcome::parse(" failure "), Some(ActionOutcome::Failure));
        assert_eq!(ActionOutcome::parse("maybe"), None);
    }
}
