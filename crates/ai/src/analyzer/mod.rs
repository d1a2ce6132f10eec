//! Conversation analyzer.
//!
//! Turns a transcript plus the latest inbound message into a structured
//! [`ConversationAnalysis`]. Same input, same output: no clock, no randomness.

pub mod discovery;
pub mod signals;
pub mod stage;
pub mod vehicle;

use serde::{Deserialize, Serialize};

use leadflow_core::Message;

pub use discovery::DiscoveryQuestion;
pub use signals::{BuyingSignal, SignalFamily, SignalUrgency};
pub use stage::ConversationStage;
pub use vehicle::{FeatureKind, FeatureMention, Importance, UseCase, VehicleInterest};

use crate::text::{customer_text, normalize};

const MAX_ACTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub vehicle_interest: VehicleInterest,
    pub buying_signals: Vec<BuyingSignal>,
    /// 0..=100
    pub temperature: u8,
    pub stage: ConversationStage,
    pub discovery_questions: Vec<DiscoveryQuestion>,
    pub next_best_actions: Vec<String>,
}

impl ConversationAnalysis {
    pub fn top_signal(&self) -> Option<&BuyingSignal> {
        self.buying_signals.first()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationAnalyzer;

impl ConversationAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze `transcript` (oldest first) with `latest_inbound` as the
    /// message being answered.
    ///
    /// Vehicle interest, budget and timeline are read from everything the
    /// customer wrote; signals and stage only from the latest message.
    pub fn analyze(&self, transcript: &[Message], latest_inbound: &str) -> ConversationAnalysis {
        let mut customer_raw: Vec<&str> = transcript
            .iter()
            .filter(|m| m.is_inbound())
            .map(|m| m.body.as_str())
            .collect();
        if customer_raw.last() != Some(&latest_inbound) {
            customer_raw.push(latest_inbound);
        }
        let customer_raw = customer_raw.join("\n");

        let latest = normalize(latest_inbound);
        let mut customer = customer_text(transcript);
        if !customer.ends_with(&latest) {
            customer.push('\n');
            customer.push_str(&latest);
        }

        let outbound_raw: Vec<&str> = transcript
            .iter()
            .filter(|m| m.is_outbound())
            .map(|m| m.body.as_str())
            .collect();
        let outbound_raw = outbound_raw.join("\n");

        let interest = vehicle::extract(&customer_raw);
        let buying_signals = signals::detect(&latest);
        let temperature = stage::temperature(&buying_signals, &interest, &latest);

        let latest_mentions_feature = !vehicle::extract(latest_inbound).features.is_empty();
        let stage = stage::classify(&buying_signals, &latest, latest_mentions_feature);

        let discovery_questions = discovery::suggest(&outbound_raw, &customer);
        let next_best_actions = next_best_actions(stage, buying_signals.first(), &interest);

        ConversationAnalysis {
            vehicle_interest: interest,
            buying_signals,
            temperature,
            stage,
            discovery_questions,
            next_best_actions,
        }
    }
}

fn next_best_actions(
    stage: ConversationStage,
    top: Option<&BuyingSignal>,
    interest: &VehicleInterest,
) -> Vec<String> {
    let vehicle = interest
        .label()
        .unwrap_or_else(|| "the vehicle".to_string());

    let mut actions: Vec<String> = match stage {
        ConversationStage::Closing => vec![
            "Confirm purchase details and send the credit application".to_string(),
            format!("Book a delivery appointment for {vehicle}"),
        ],
        ConversationStage::ObjectionHandling => vec![
            "Acknowledge the concern and present payment options".to_string(),
            "Offer a no-pressure test drive".to_string(),
        ],
        ConversationStage::Presentation => vec![
            format!("Share a feature walkthrough for {vehicle}"),
            "Offer a test drive".to_string(),
        ],
        ConversationStage::FollowUp => {
            vec!["Schedule a check-in at the customer's preferred time".to_string()]
        }
        ConversationStage::Discovery => {
            vec!["Ask discovery questions to qualify the lead".to_string()]
        }
    };

    if let Some(signal) = top {
        let extra = match signal.family {
            SignalFamily::PriceShopping => Some("Send a transparent out-the-door quote"),
            SignalFamily::HighIntent => Some("Propose two concrete appointment times"),
            SignalFamily::ReadyToBuy | SignalFamily::Objection => None,
            SignalFamily::InformationSeeking => Some("Answer the question directly with specifics"),
        };
        if let Some(extra) = extra {
            actions.push(extra.to_string());
        }
    }

    if interest.model.is_none() {
        actions.push("Confirm the exact vehicle of interest".to_string());
    }

    let mut seen = std::collections::BTreeSet::new();
    actions.retain(|a| seen.insert(a.clone()));
    actions.truncate(MAX_ACTIONS);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use leadflow_core::LeadId;
    use proptest::prelude::*;

    fn transcript(lines: &[(bool, &str)]) -> Vec<Message> {
        let lead = LeadId::new();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        lines
            .iter()
            .enumerate()
            .map(|(i, (inbound, body))| {
                let at = t0 + Duration::minutes(i as i64 * 5);
                if *inbound {
                    Message::inbound(lead, *body, at)
                } else {
                    Message::outbound_human(lead, *body, at)
                }
            })
            .collect()
    }

    #[test]
    fn interest_rate_question_scores_budget_bonus() {
        let analyzer = ConversationAnalyzer::new();
        let history = transcript(&[(false, "Hi Sam, thanks for reaching out!")]);
        let a = analyzer.analyze(&history, "what's the interest rate on the LTZ");
        let b = analyzer.analyze(&history, "what's the color on the LTZ");
        assert_eq!(a.temperature, b.temperature + 10);
        assert_eq!(a.vehicle_interest.trim.as_deref(), Some("LTZ"));
    }

    #[test]
    fn interest_accumulates_across_inbound_messages() {
        let history = transcript(&[
            (true, "looking at a 2023 silverado"),
            (false, "Great choice! Any must-haves?"),
        ]);
        let a = ConversationAnalyzer::new().analyze(&history, "needs to tow 9000 lbs");
        let v = &a.vehicle_interest;
        assert_eq!(v.year, Some(2023));
        assert_eq!(v.model.as_deref(), Some("Silverado"));
        assert_eq!(v.features.len(), 1);
        assert_eq!(a.stage, ConversationStage::Presentation);
        // must-haves already asked
        assert!(a.discovery_questions.iter().all(|q| q.topic != "must_haves"));
    }

    #[test]
    fn actions_are_capped_and_unique() {
        let a = ConversationAnalyzer::new().analyze(&[], "best price out the door?");
        assert!(a.next_best_actions.len() <= MAX_ACTIONS);
        assert!(
            a.next_best_actions
                .contains(&"Send a transparent out-the-door quote".to_string())
        );
    }

    proptest! {
        #[test]
        fn analysis_is_deterministic_and_bounded(text in "[a-zA-Z0-9 ?!.$']{0,120}") {
            let history = transcript(&[(true, "hello"), (false, "When are you hoping to buy?")]);
            let analyzer = ConversationAnalyzer::new();
            let first = analyzer.analyze(&history, &text);
            let second = analyzer.analyze(&history, &text);
            prop_assert!(first.temperature <= 100);
            prop_assert!(first.buying_signals.len() <= 3);
            prop_assert!(first.discovery_questions.len() <= 2);
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }
}
