//! Temperature scoring and stage classification.

use serde::{Deserialize, Serialize};

use super::signals::{BuyingSignal, SignalFamily, URGENT_TERMS};
use super::vehicle::VehicleInterest;
use crate::text::contains_any;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    Discovery,
    Presentation,
    ObjectionHandling,
    Closing,
    FollowUp,
}

impl ConversationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStage::Discovery => "discovery",
            ConversationStage::Presentation => "presentation",
            ConversationStage::ObjectionHandling => "objection_handling",
            ConversationStage::Closing => "closing",
            ConversationStage::FollowUp => "follow_up",
        }
    }
}

const SPEC_TERMS: &[&str] = &[
    "features",
    "feature",
    "specs",
    "specifications",
    "towing capacity",
    "horsepower",
    "mpg",
    "trim",
    "package",
    "options",
    "engine",
    "interior",
    "safety",
];

const DEFERRAL_TERMS: &[&str] = &[
    "later",
    "next week",
    "next month",
    "not right now",
    "not ready",
    "busy",
    "get back to you",
    "few weeks",
    "few months",
    "hold off",
    "circle back",
];

/// 50 + Σ(strength·30) + confidence·20 + features·5 + 15 (urgent) + 10 (budget),
/// clamped to \[0, 100\] and rounded.
pub fn temperature(signals: &[BuyingSignal], interest: &VehicleInterest, latest: &str) -> u8 {
    let mut score = 50.0;
    score += signals.iter().map(|s| s.strength * 30.0).sum::<f64>();
    score += interest.confidence * 20.0;
    score += interest.features.len() as f64 * 5.0;
    if contains_any(latest, URGENT_TERMS) {
        score += 15.0;
    }
    if interest.has_budget() {
        score += 10.0;
    }
    score.clamp(0.0, 100.0).round() as u8
}

/// First matching rule wins: closing, objection handling, presentation,
/// follow-up, discovery.
pub fn classify(signals: &[BuyingSignal], latest: &str, latest_mentions_feature: bool) -> ConversationStage {
    let strong_ready = signals
        .iter()
        .any(|s| s.family == SignalFamily::ReadyToBuy && s.strength > 0.8);
    if strong_ready {
        return ConversationStage::Closing;
    }
    if signals.iter().any(|s| s.family == SignalFamily::Objection) {
        return ConversationStage::ObjectionHandling;
    }
    if latest_mentions_feature || contains_any(latest, SPEC_TERMS) {
        return ConversationStage::Presentation;
    }
    if contains_any(latest, DEFERRAL_TERMS) {
        return ConversationStage::FollowUp;
    }
    ConversationStage::Discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{signals, vehicle};
    use crate::text::normalize;

    fn stage_of(text: &str) -> ConversationStage {
        let norm = normalize(text);
        let s = signals::detect(&norm);
        let features = !vehicle::extract(text).features.is_empty();
        classify(&s, &norm, features)
    }

    #[test]
    fn stage_priority_order() {
        assert_eq!(stage_of("ready to buy, too expensive"), ConversationStage::Closing);
        assert_eq!(stage_of("too expensive, what about awd"), ConversationStage::ObjectionHandling);
        assert_eq!(stage_of("can it tow 9000 lbs"), ConversationStage::Presentation);
        assert_eq!(stage_of("maybe later"), ConversationStage::FollowUp);
        assert_eq!(stage_of("hi there"), ConversationStage::Discovery);
    }

    #[test]
    fn weak_ready_signal_is_not_closing() {
        // "paperwork" alone is 0.5.
        assert_ne!(stage_of("send the paperwork"), ConversationStage::Closing);
    }

    #[test]
    fn budget_keyword_adds_ten() {
        let with = normalize("what's the interest rate on the LTZ");
        let without = normalize("what's the color on the LTZ");
        let t = |n: &str, raw: &str| temperature(&signals::detect(n), &vehicle::extract(raw), n);
        let a = t(&with, "what's the interest rate on the LTZ");
        let b = t(&without, "what's the color on the LTZ");
        assert_eq!(a, b + 10);
    }

    #[test]
    fn temperature_is_clamped() {
        let text = "ready to buy today! i'll take it asap. test drive? 2024 chevy silverado, need to tow, awd, diesel, crew cab, budget $600";
        let norm = normalize(text);
        assert_eq!(temperature(&signals::detect(&norm), &vehicle::extract(text), &norm), 100);
    }
}
