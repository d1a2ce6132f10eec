//! Engine error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why the compliance gate refused a send.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceReason {
    /// Destination is on the suppression list.
    Suppressed,
    /// Per-number rate limit exceeded.
    RateLimited,
}

impl core::fmt::Display for ComplianceReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ComplianceReason::Suppressed => f.write_str("number is suppressed"),
            ComplianceReason::RateLimited => f.write_str("rate limit exceeded"),
        }
    }
}

/// Engine-level error.
///
/// Every variant is scoped to a single lead: the sweep catches it, logs it and
/// moves on to the next lead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Required input is missing or malformed (abort this lead only).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Suppressed or rate-limited destination. Hard stop, never retried in-sweep.
    #[error("compliance blocked send to {number}: {reason}")]
    ComplianceBlocked {
        number: String,
        reason: ComplianceReason,
    },

    /// Text generation failed and no usable fallback existed.
    #[error("message generation failed: {0}")]
    GenerationFailure(String),

    /// The messaging gateway rejected or failed the send.
    #[error("delivery failed: {0}")]
    DeliveryFailure(String),

    /// Nothing to do (already contacted, already claimed, frequency cap).
    #[error("no-op: {0}")]
    SchedulingNoOp(String),

    /// A domain invariant was violated (e.g. mutating a sent message).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Datastore failure.
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn compliance(number: impl Into<String>, reason: ComplianceReason) -> Self {
        Self::ComplianceBlocked {
            number: number.into(),
            reason,
        }
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::GenerationFailure(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::DeliveryFailure(msg.into())
    }

    pub fn noop(msg: impl Into<String>) -> Self {
        Self::SchedulingNoOp(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// `SchedulingNoOp` is a short-circuit, not a failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, EngineError::SchedulingNoOp(_))
    }

    pub fn is_compliance(&self) -> bool {
        matches!(self, EngineError::ComplianceBlocked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compliance_error_names_number_and_reason() {
        let err = EngineError::compliance("+15550100", ComplianceReason::RateLimited);
        assert!(err.is_compliance());
        assert!(!err.is_noop());
        assert_eq!(
            err.to_string(),
            "compliance blocked send to +15550100: rate limit exceeded"
        );
    }

    #[test]
    fn noop_is_not_compliance() {
        let err = EngineError::noop("already claimed");
        assert!(err.is_noop());
        assert!(!err.is_compliance());
    }
}
