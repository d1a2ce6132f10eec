//! Aggressive-sequence schedule entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{LeadId, ScheduleEntryId};

/// Content strategy of an aggressive-sequence message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    FeaturesBenefits,
    UrgencyScarcity,
    IncentivesDeals,
    FinalPush,
    GentleFollowup,
}

impl StrategyTag {
    pub const ALL: [StrategyTag; 5] = [
        StrategyTag::FeaturesBenefits,
        StrategyTag::UrgencyScarcity,
        StrategyTag::IncentivesDeals,
        StrategyTag::FinalPush,
        StrategyTag::GentleFollowup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTag::FeaturesBenefits => "features_benefits",
            StrategyTag::UrgencyScarcity => "urgency_scarcity",
            StrategyTag::IncentivesDeals => "incentives_deals",
            StrategyTag::FinalPush => "final_push",
            StrategyTag::GentleFollowup => "gentle_followup",
        }
    }
}

/// One pre-materialized message slot of the 14-day plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub id: ScheduleEntryId,
    pub lead_id: LeadId,
    /// 1..=14
    pub day: u8,
    pub message_index: u8,
    pub scheduled_at: DateTime<Utc>,
    pub strategy: StrategyTag,
    pub sent: bool,
    /// Set when the entry is voided (pause, frequency cap, pending human).
    pub skipped: Option<String>,
}

impl ScheduledEntry {
    pub fn new(
        lead_id: LeadId,
        day: u8,
        message_index: u8,
        scheduled_at: DateTime<Utc>,
        strategy: StrategyTag,
    ) -> Self {
        Self {
            id: ScheduleEntryId::new(),
            lead_id,
            day,
            message_index,
            scheduled_at,
            strategy,
            sent: false,
            skipped: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.sent && self.skipped.is_none()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.scheduled_at <= now
    }
}
