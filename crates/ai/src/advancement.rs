//! Conversation advancement: answering a customer message that has gone
//! unanswered past the advancement threshold.

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analyzer::vehicle::find_trim;
use crate::text::{contains_any, normalize};

static RATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("rate pattern"));
static ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{5})\b").expect("zip pattern"));

const FINANCE_TERMS: &[&str] = &[
    "interest rate",
    "rate",
    "rates",
    "apr",
    "financing",
    "finance",
    "credit",
    "loan",
    "monthly payment",
    "down payment",
    "pre-approved",
    "approved",
];

const PRICING_TERMS: &[&str] = &[
    "price",
    "pricing",
    "cost",
    "how much",
    "otd",
    "out the door",
    "discount",
    "deal",
    "msrp",
    "quote",
];

const FEATURE_TERMS: &[&str] = &[
    "feature", "features", "tow", "towing", "mpg", "trim", "package", "specs", "awd", "4x4",
    "color", "seats", "engine",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancementTopic {
    Finance,
    Pricing,
    Feature,
    Stalled,
}

impl AdvancementTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvancementTopic::Finance => "finance",
            AdvancementTopic::Pricing => "pricing",
            AdvancementTopic::Feature => "feature",
            AdvancementTopic::Stalled => "stalled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancementUrgency {
    Low,
    Medium,
    High,
}

/// Finance replies graduate with how long the customer has been waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinanceVariant {
    /// waiting < 2h
    Immediate,
    /// waiting < 24h
    SameDay,
    FinalPush,
}

impl FinanceVariant {
    pub fn for_wait(waiting: Duration) -> Self {
        if waiting < Duration::hours(2) {
            FinanceVariant::Immediate
        } else if waiting < Duration::hours(24) {
            FinanceVariant::SameDay
        } else {
            FinanceVariant::FinalPush
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FinanceVariant::Immediate => "immediate",
            FinanceVariant::SameDay => "same_day",
            FinanceVariant::FinalPush => "final_push",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancementHints {
    /// Rate the customer quoted, in percent.
    pub rate: Option<f64>,
    pub zip: Option<String>,
    pub trim: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancementPlan {
    pub topic: AdvancementTopic,
    pub hints: AdvancementHints,
    pub urgency: AdvancementUrgency,
    pub finance_variant: Option<FinanceVariant>,
    /// Template draft.
    pub message: String,
    /// Template id, e.g. "advancement_finance_same_day".
    pub template: String,
}

/// Finance wins over pricing, pricing over features. A quoted percentage
/// counts as a finance question.
pub fn classify_topic(text: &str) -> AdvancementTopic {
    let norm = normalize(text);
    if contains_any(&norm, FINANCE_TERMS) || RATE.is_match(&norm) {
        AdvancementTopic::Finance
    } else if contains_any(&norm, PRICING_TERMS) {
        AdvancementTopic::Pricing
    } else if contains_any(&norm, FEATURE_TERMS) {
        AdvancementTopic::Feature
    } else {
        AdvancementTopic::Stalled
    }
}

pub fn extract_hints(text: &str) -> AdvancementHints {
    let rate = RATE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let zip = ZIP
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let trim = find_trim(text);
    AdvancementHints { rate, zip, trim }
}

/// Build the advancement reply for an inbound message that has waited
/// `waiting` without an answer.
pub fn plan(
    first_name: &str,
    vehicle: Option<&str>,
    inbound: &str,
    waiting: Duration,
    temperature: u8,
) -> AdvancementPlan {
    let topic = classify_topic(inbound);
    let hints = extract_hints(inbound);
    let name = match first_name.trim() {
        "" => "there",
        n => n,
    };
    let subject = hints
        .trim
        .as_deref()
        .map(|t| format!("the {t}"))
        .or_else(|| vehicle.map(|v| format!("the {v}")))
        .unwrap_or_else(|| "your vehicle".to_string());

    let (urgency, finance_variant, message) = match topic {
        AdvancementTopic::Finance => {
            let variant = FinanceVariant::for_wait(waiting);
            let rate = hints
                .rate
                .map(|r| format!("You mentioned {r}%, and we can often match or beat that. "))
                .unwrap_or_default();
            let zip = hints
                .zip
                .as_deref()
                .map(|z| format!(" I can also check incentives for {z}."))
                .unwrap_or_default();
            let body = match variant {
                FinanceVariant::Immediate => format!(
                    "Hi {name}, great question on financing for {subject}. {rate}I can have our finance team run real numbers for you right now. Want me to?{zip}"
                ),
                FinanceVariant::SameDay => format!(
                    "Hi {name}, following up on your financing question for {subject}. {rate}I'd love to lock in numbers for you today. What's a good time to chat?{zip}"
                ),
                FinanceVariant::FinalPush => format!(
                    "Hi {name}, I still have financing options ready for {subject}. {rate}Reply YES and I'll send the exact payment breakdown.{zip}"
                ),
            };
            let urgency = match variant {
                FinanceVariant::FinalPush => AdvancementUrgency::Medium,
                _ => AdvancementUrgency::High,
            };
            (urgency, Some(variant), body)
        }
        AdvancementTopic::Pricing => {
            let urgency = if temperature >= 70 {
                AdvancementUrgency::High
            } else {
                AdvancementUrgency::Medium
            };
            let body = format!(
                "Hi {name}, I pulled together current pricing on {subject}. Want me to text over an out-the-door breakdown?"
            );
            (urgency, None, body)
        }
        AdvancementTopic::Feature => (
            AdvancementUrgency::Medium,
            None,
            format!(
                "Hi {name}, happy to walk you through the features on {subject}. Want a quick video or a test drive?"
            ),
        ),
        AdvancementTopic::Stalled => (
            AdvancementUrgency::Low,
            None,
            format!("Hi {name}, just checking in about {subject}. Any questions I can answer?"),
        ),
    };

    let template = match finance_variant {
        Some(v) => format!("advancement_finance_{}", v.as_str()),
        None => format!("advancement_{}", topic.as_str()),
    };

    AdvancementPlan {
        topic,
        hints,
        urgency,
        finance_variant,
        message,
        template,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finance_is_checked_before_pricing() {
        assert_eq!(classify_topic("what's the interest rate on the LTZ"), AdvancementTopic::Finance);
        assert_eq!(classify_topic("best price with financing?"), AdvancementTopic::Finance);
        assert_eq!(classify_topic("how much is it"), AdvancementTopic::Pricing);
        assert_eq!(classify_topic("does it have awd"), AdvancementTopic::Feature);
        assert_eq!(classify_topic("ok"), AdvancementTopic::Stalled);
    }

    #[test]
    fn hints_pick_up_rate_zip_and_trim() {
        let h = extract_hints("my bank offered 4.9% and I'm in 48201, looking at the LTZ");
        assert_eq!(h.rate, Some(4.9));
        assert_eq!(h.zip.as_deref(), Some("48201"));
        assert_eq!(h.trim.as_deref(), Some("LTZ"));
    }

    #[test]
    fn hints_match_trim_codes_in_any_case() {
        let h = extract_hints("what's the interest rate on the ltz");
        assert_eq!(h.trim.as_deref(), Some("LTZ"));
    }

    #[test]
    fn finance_variant_graduates_with_wait() {
        assert_eq!(FinanceVariant::for_wait(Duration::minutes(119)), FinanceVariant::Immediate);
        assert_eq!(FinanceVariant::for_wait(Duration::hours(3)), FinanceVariant::SameDay);
        assert_eq!(FinanceVariant::for_wait(Duration::hours(24)), FinanceVariant::FinalPush);
    }

    #[test]
    fn finance_plan_references_trim_and_rate() {
        let p = plan(
            "Sam",
            Some("Chevrolet Silverado"),
            "can you beat 5.5% on the LTZ?",
            Duration::hours(3),
            60,
        );
        assert_eq!(p.topic, AdvancementTopic::Finance);
        assert_eq!(p.finance_variant, Some(FinanceVariant::SameDay));
        assert_eq!(p.urgency, AdvancementUrgency::High);
        assert_eq!(p.template, "advancement_finance_same_day");
        assert!(p.message.contains("the LTZ"));
        assert!(p.message.contains("5.5%"));
    }

    #[test]
    fn stalled_plan_is_low_urgency() {
        let p = plan("", None, "hmm", Duration::hours(5), 40);
        assert_eq!(p.urgency, AdvancementUrgency::Low);
        assert_eq!(p.template, "advancement_stalled");
        assert!(p.message.starts_with("Hi there"));
    }
}
