//! Behavioral triggers fired by the rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::{LeadId, TriggerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PriceSensitive,
    UrgentBuyer,
    CompetitorShopping,
    GoingCold,
    HotEngagement,
    NegativeSentiment,
    NewLeadStalled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::PriceSensitive => "price_sensitive",
            TriggerType::UrgentBuyer => "urgent_buyer",
            TriggerType::CompetitorShopping => "competitor_shopping",
            TriggerType::GoingCold => "going_cold",
            TriggerType::HotEngagement => "hot_engagement",
            TriggerType::NegativeSentiment => "negative_sentiment",
            TriggerType::NewLeadStalled => "new_lead_stalled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A persisted rule firing for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralTrigger {
    pub id: TriggerId,
    pub lead_id: LeadId,
    pub trigger_type: TriggerType,
    pub urgency: UrgencyLevel,
    /// Fraction of satisfied rule conditions, in \[0, 1\].
    pub confidence: f64,
    /// Metric snapshot the rule was evaluated against.
    pub context: JsonValue,
    pub recommended_action: String,
    pub detected_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl BehavioralTrigger {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}
