//! Declarative trigger rules.

use serde::{Deserialize, Serialize};

use leadflow_core::{TriggerType, UrgencyLevel};

use super::context::LeadContext;
use crate::result::AiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DaysSinceCreated,
    DaysSinceLastReply,
    ResponseRate,
    PriceMentions,
    UrgencyMentions,
    CompetitorMentions,
    Sentiment,
    EngagementTrend,
    InboundCount,
    OutboundCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    AtLeast { metric: Metric, value: f64 },
    AtMost { metric: Metric, value: f64 },
    Above { metric: Metric, value: f64 },
    Below { metric: Metric, value: f64 },
    /// Inclusive on both ends.
    Between { metric: Metric, low: f64, high: f64 },
}

impl Condition {
    pub fn metric(&self) -> Metric {
        match *self {
            Condition::AtLeast { metric, .. }
            | Condition::AtMost { metric, .. }
            | Condition::Above { metric, .. }
            | Condition::Below { metric, .. }
            | Condition::Between { metric, .. } => metric,
        }
    }

    pub fn is_satisfied(&self, ctx: &LeadContext) -> bool {
        let v = ctx.metric(self.metric());
        match *self {
            Condition::AtLeast { value, .. } => v >= value,
            Condition::AtMost { value, .. } => v <= value,
            Condition::Above { value, .. } => v > value,
            Condition::Below { value, .. } => v < value,
            Condition::Between { low, high, .. } => (low..=high).contains(&v),
        }
    }

    fn validate(&self) -> Result<(), AiError> {
        let finite = match *self {
            Condition::AtLeast { value, .. }
            | Condition::AtMost { value, .. }
            | Condition::Above { value, .. }
            | Condition::Below { value, .. } => value.is_finite(),
            Condition::Between { low, high, .. } => {
                if low > high {
                    return Err(AiError::InvalidRule(format!(
                        "between bounds reversed for {:?}: {low} > {high}",
                        self.metric()
                    )));
                }
                low.is_finite() && high.is_finite()
            }
        };
        if finite {
            Ok(())
        } else {
            Err(AiError::InvalidRule(format!(
                "non-finite threshold for {:?}",
                self.metric()
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub trigger_type: TriggerType,
    pub conditions: Vec<Condition>,
    pub recommended_action: String,
    pub urgency: UrgencyLevel,
}

impl Rule {
    pub fn new(
        trigger_type: TriggerType,
        conditions: Vec<Condition>,
        recommended_action: impl Into<String>,
        urgency: UrgencyLevel,
    ) -> Result<Self, AiError> {
        if conditions.is_empty() {
            return Err(AiError::InvalidRule(format!(
                "{} has no conditions",
                trigger_type.as_str()
            )));
        }
        for c in &conditions {
            c.validate()?;
        }
        Ok(Self {
            trigger_type,
            conditions,
            recommended_action: recommended_action.into(),
            urgency,
        })
    }

    /// Fraction of conditions satisfied by `ctx`, in \[0, 1\].
    pub fn satisfied_fraction(&self, ctx: &LeadContext) -> f64 {
        let hits = self.conditions.iter().filter(|c| c.is_satisfied(ctx)).count();
        hits as f64 / self.conditions.len() as f64
    }
}

/// The built-in rule catalog.
pub fn standard_catalog() -> Vec<Rule> {
    use Condition::*;
    use Metric::*;

    let rules = [
        Rule::new(
            TriggerType::PriceSensitive,
            vec![
                AtLeast { metric: PriceMentions, value: 2.0 },
                AtLeast { metric: Sentiment, value: -0.5 },
                AtLeast { metric: InboundCount, value: 1.0 },
            ],
            "Send a transparent price breakdown with current incentives",
            UrgencyLevel::High,
        ),
        Rule::new(
            TriggerType::UrgentBuyer,
            vec![
                AtLeast { metric: UrgencyMentions, value: 1.0 },
                AtMost { metric: DaysSinceLastReply, value: 1.0 },
                AtLeast { metric: ResponseRate, value: 0.5 },
            ],
            "Call within the hour and offer a same-day appointment",
            UrgencyLevel::Critical,
        ),
        Rule::new(
            TriggerType::CompetitorShopping,
            vec![
                AtLeast { metric: CompetitorMentions, value: 1.0 },
                AtLeast { metric: PriceMentions, value: 1.0 },
                AtMost { metric: DaysSinceLastReply, value: 3.0 },
            ],
            "Send a price-match offer and highlight dealership advantages",
            UrgencyLevel::High,
        ),
        Rule::new(
            TriggerType::GoingCold,
            vec![
                AtLeast { metric: DaysSinceLastReply, value: 3.0 },
                Below { metric: ResponseRate, value: 0.3 },
                Below { metric: EngagementTrend, value: 0.0 },
                AtLeast { metric: OutboundCount, value: 2.0 },
            ],
            "Enter the re-engagement sequence",
            UrgencyLevel::Medium,
        ),
        Rule::new(
            TriggerType::HotEngagement,
            vec![
                AtLeast { metric: ResponseRate, value: 0.6 },
                Above { metric: EngagementTrend, value: 0.0 },
                AtMost { metric: DaysSinceLastReply, value: 1.0 },
                AtLeast { metric: InboundCount, value: 3.0 },
            ],
            "Hand off to a sales manager for a personal call",
            UrgencyLevel::High,
        ),
        Rule::new(
            TriggerType::NegativeSentiment,
            vec![
                AtMost { metric: Sentiment, value: -0.3 },
                AtLeast { metric: InboundCount, value: 1.0 },
            ],
            "Pause automation and have a manager reach out personally",
            UrgencyLevel::High,
        ),
        Rule::new(
            TriggerType::NewLeadStalled,
            vec![
                Between { metric: DaysSinceCreated, low: 1.0, high: 7.0 },
                AtMost { metric: InboundCount, value: 0.0 },
                AtLeast { metric: OutboundCount, value: 1.0 },
            ],
            "Try a different channel or time of day",
            UrgencyLevel::Medium,
        ),
    ];

    // The catalog is static; an invalid entry is a programming error caught by tests.
    rules.into_iter().filter_map(Result::ok).collect()
}
