//! Behavioral trigger engine.
//!
//! Evaluates the rule catalog against a lead's [`LeadContext`]. A rule fires
//! when at least [`DEFAULT_FIRE_THRESHOLD`] of its conditions hold; the
//! satisfied fraction becomes the trigger's confidence.

pub mod context;
pub mod rules;

use chrono::{DateTime, Duration, Utc};

use leadflow_core::{BehavioralTrigger, Lead, Message, TriggerId};

pub use context::LeadContext;
pub use rules::{Condition, Metric, Rule, standard_catalog};

use crate::result::AiError;

pub const DEFAULT_FIRE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct TriggerEngine {
    rules: Vec<Rule>,
    threshold: f64,
    /// Per (lead, type) quiet period; `None` fires on every evaluation.
    cooldown: Option<Duration>,
}

impl TriggerEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            threshold: DEFAULT_FIRE_THRESHOLD,
            cooldown: None,
        }
    }

    pub fn standard() -> Self {
        Self::new(standard_catalog())
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, AiError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AiError::InvalidInput(format!(
                "fire threshold must be in (0, 1], got {threshold}"
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn with_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Triggers that fire for `lead` right now.
    ///
    /// `history` is the lead's previously persisted triggers; it is only
    /// consulted when a cooldown is configured.
    pub fn evaluate(
        &self,
        lead: &Lead,
        messages: &[Message],
        history: &[BehavioralTrigger],
        now: DateTime<Utc>,
    ) -> Vec<BehavioralTrigger> {
        let ctx = LeadContext::build(lead, messages, now);
        self.evaluate_context(lead, &ctx, history, now)
    }

    pub fn evaluate_context(
        &self,
        lead: &Lead,
        ctx: &LeadContext,
        history: &[BehavioralTrigger],
        now: DateTime<Utc>,
    ) -> Vec<BehavioralTrigger> {
        let snapshot = ctx.to_json();

        self.rules
            .iter()
            .filter_map(|rule| {
                let fraction = rule.satisfied_fraction(ctx);
                if fraction < self.threshold {
                    return None;
                }
                if self.cooling_down(rule, history, now) {
                    return None;
                }
                Some(BehavioralTrigger {
                    id: TriggerId::new(),
                    lead_id: lead.id,
                    trigger_type: rule.trigger_type,
                    urgency: rule.urgency,
                    confidence: fraction,
                    context: snapshot.clone(),
                    recommended_action: rule.recommended_action.clone(),
                    detected_at: now,
                    processed_at: None,
                })
            })
            .collect()
    }

    fn cooling_down(&self, rule: &Rule, history: &[BehavioralTrigger], now: DateTime<Utc>) -> bool {
        let Some(cooldown) = self.cooldown else {
            return false;
        };
        history
            .iter()
            .any(|t| t.trigger_type == rule.trigger_type && now - t.detected_at < cooldown)
    }
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use leadflow_core::{TriggerType, UrgencyLevel};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 16, 0, 0).unwrap()
    }

    fn stalled_lead() -> (Lead, Vec<Message>) {
        let lead = Lead::new("Kim", t0());
        let log = vec![Message::outbound_human(lead.id, "Hi Kim!", t0())];
        (lead, log)
    }

    #[test]
    fn new_lead_without_reply_fires_stalled() {
        let (lead, log) = stalled_lead();
        let fired = TriggerEngine::standard().evaluate(&lead, &log, &[], t0() + Duration::days(2));
        let stalled = fired
            .iter()
            .find(|t| t.trigger_type == TriggerType::NewLeadStalled)
            .expect("stalled fires");
        assert_eq!(stalled.confidence, 1.0);
        assert_eq!(stalled.urgency, UrgencyLevel::Medium);
        assert!(!stalled.is_processed());
        assert_eq!(stalled.context["inbound_count"], 0.0);
    }

    #[test]
    fn fraction_below_threshold_does_not_fire() {
        // 3 of 4 conditions = 0.75 fires; 2 of 4 = 0.5 does not.
        let rule = Rule::new(
            TriggerType::GoingCold,
            vec![
                Condition::AtLeast { metric: Metric::OutboundCount, value: 1.0 },
                Condition::AtLeast { metric: Metric::DaysSinceCreated, value: 1.0 },
                Condition::AtLeast { metric: Metric::InboundCount, value: 5.0 },
                Condition::AtLeast { metric: Metric::PriceMentions, value: 5.0 },
            ],
            "x",
            UrgencyLevel::Low,
        )
        .unwrap();
        let (lead, log) = stalled_lead();
        let engine = TriggerEngine::new(vec![rule]);
        assert!(engine.evaluate(&lead, &log, &[], t0() + Duration::days(2)).is_empty());

        let lenient = engine.with_threshold(0.5).unwrap();
        let fired = lenient.evaluate(&lead, &log, &[], t0() + Duration::days(2));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].confidence, 0.5);
    }

    #[test]
    fn without_cooldown_repeat_evaluations_fire_again() {
        let (lead, log) = stalled_lead();
        let engine = TriggerEngine::standard();
        let now = t0() + Duration::days(2);
        let first = engine.evaluate(&lead, &log, &[], now);
        let second = engine.evaluate(&lead, &log, &first, now + Duration::minutes(5));
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn cooldown_suppresses_recent_types() {
        let (lead, log) = stalled_lead();
        let engine = TriggerEngine::standard().with_cooldown(Some(Duration::hours(24)));
        let now = t0() + Duration::days(2);
        let first = engine.evaluate(&lead, &log, &[], now);
        assert!(!first.is_empty());
        assert!(engine.evaluate(&lead, &log, &first, now + Duration::hours(1)).is_empty());
        assert_eq!(
            engine.evaluate(&lead, &log, &first, now + Duration::hours(25)).len(),
            first.len()
        );
    }

    #[test]
    fn threshold_is_validated() {
        assert!(TriggerEngine::standard().with_threshold(0.0).is_err());
        assert!(TriggerEngine::standard().with_threshold(1.5).is_err());
    }
}
