//! Advisory optimization insights mined from send/response history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::InsightId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Timing,
    Content,
    Frequency,
    Targeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// An insight is never auto-applied; a human or downstream process decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationInsight {
    pub id: InsightId,
    pub insight_type: InsightType,
    pub confidence: f64,
    pub impact: Impact,
    pub recommendation: String,
    /// Expected relative improvement (0.25 = 25%).
    pub expected_improvement: f64,
    pub created_at: DateTime<Utc>,
}

impl OptimizationInsight {
    pub fn new(
        insight_type: InsightType,
        recommendation: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InsightId::new(),
            insight_type,
            confidence: 0.0,
            impact: Impact::Low,
            recommendation: recommendation.into(),
            expected_improvement: 0.0,
            created_at,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_impact(mut self, impact: Impact) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_expected_improvement(mut self, improvement: f64) -> Self {
        self.expected_improvement = improvement;
        self
    }
}
