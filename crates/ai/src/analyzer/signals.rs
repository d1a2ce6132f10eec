//! Weighted buying-signal pattern families.

use serde::{Deserialize, Serialize};

use crate::text::{contains_any, contains_term};

/// Families in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFamily {
    HighIntent,
    ReadyToBuy,
    PriceShopping,
    Objection,
    InformationSeeking,
}

impl SignalFamily {
    pub const ALL: [SignalFamily; 5] = [
        SignalFamily::HighIntent,
        SignalFamily::ReadyToBuy,
        SignalFamily::PriceShopping,
        SignalFamily::Objection,
        SignalFamily::InformationSeeking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalFamily::HighIntent => "high_intent",
            SignalFamily::ReadyToBuy => "ready_to_buy",
            SignalFamily::PriceShopping => "price_shopping",
            SignalFamily::Objection => "objection",
            SignalFamily::InformationSeeking => "information_seeking",
        }
    }

    fn patterns(self) -> &'static [(&'static str, f64)] {
        match self {
            SignalFamily::HighIntent => &[
                ("test drive", 0.5),
                ("still available", 0.5),
                ("is it available", 0.5),
                ("hold it", 0.5),
                ("come in", 0.4),
                ("come by", 0.4),
                ("stop by", 0.4),
                ("in stock", 0.4),
                ("appointment", 0.4),
                ("see it", 0.3),
                ("schedule", 0.3),
            ],
            SignalFamily::ReadyToBuy => &[
                ("ready to buy", 0.9),
                ("ready to sign", 0.9),
                ("i'll take it", 0.9),
                ("buy today", 0.9),
                ("sign today", 0.9),
                ("let's do it", 0.8),
                ("lets do it", 0.8),
                ("ready to move forward", 0.8),
                ("put down a deposit", 0.7),
                ("want to buy", 0.6),
                ("paperwork", 0.5),
                ("pick it up", 0.5),
            ],
            SignalFamily::PriceShopping => &[
                ("best price", 0.6),
                ("lowest price", 0.6),
                ("out the door", 0.6),
                ("otd", 0.5),
                ("another dealer", 0.5),
                ("other dealer", 0.5),
                ("cheaper", 0.5),
                ("discount", 0.4),
                ("quote", 0.4),
                ("beat", 0.4),
                ("rebate", 0.3),
            ],
            SignalFamily::Objection => &[
                ("not interested", 0.8),
                ("too expensive", 0.7),
                ("can't afford", 0.7),
                ("cant afford", 0.7),
                ("out of my budget", 0.7),
                ("too high", 0.6),
                ("too much", 0.5),
                ("think about it", 0.5),
                ("need to wait", 0.5),
                ("bad credit", 0.5),
                ("not sure", 0.4),
                ("talk to my", 0.4),
            ],
            SignalFamily::InformationSeeking => &[
                ("how much", 0.4),
                ("does it", 0.3),
                ("do you have", 0.3),
                ("features", 0.3),
                ("specs", 0.3),
                ("mpg", 0.3),
                ("warranty", 0.3),
                ("what", 0.2),
                ("colors", 0.2),
                ("options", 0.2),
                ("?", 0.2),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalUrgency {
    Low,
    Medium,
    High,
}

impl SignalUrgency {
    fn bump(self) -> Self {
        match self {
            SignalUrgency::Low => SignalUrgency::Medium,
            _ => SignalUrgency::High,
        }
    }
}

pub const URGENT_TERMS: &[&str] = &[
    "asap",
    "as soon as possible",
    "today",
    "tonight",
    "right now",
    "right away",
    "immediately",
    "urgent",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyingSignal {
    pub family: SignalFamily,
    /// min(1, sum of matched pattern weights)
    pub strength: f64,
    pub urgency: SignalUrgency,
    pub matched: Vec<String>,
}

/// Top three signals in normalized `text`, strongest first.
pub fn detect(text: &str) -> Vec<BuyingSignal> {
    let urgent = contains_any(text, URGENT_TERMS);

    let mut signals: Vec<BuyingSignal> = SignalFamily::ALL
        .iter()
        .filter_map(|family| {
            let matched: Vec<(&str, f64)> = family
                .patterns()
                .iter()
                .filter(|(p, _)| contains_term(text, p))
                .copied()
                .collect();
            if matched.is_empty() {
                return None;
            }
            // Rounded to hundredths so float noise never reorders equal sums.
            let sum: f64 = matched.iter().map(|(_, w)| w).sum();
            let strength = ((sum * 100.0).round() / 100.0).min(1.0);
            let mut urgency = base_urgency(*family, strength);
            if urgent {
                urgency = urgency.bump();
            }
            Some(BuyingSignal {
                family: *family,
                strength,
                urgency,
                matched: matched.iter().map(|(p, _)| (*p).to_string()).collect(),
            })
        })
        .collect();

    // Stable sort keeps family order on equal strength.
    signals.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    signals.truncate(3);
    signals
}

fn base_urgency(family: SignalFamily, strength: f64) -> SignalUrgency {
    match family {
        SignalFamily::ReadyToBuy => SignalUrgency::High,
        SignalFamily::HighIntent if strength >= 0.6 => SignalUrgency::High,
        SignalFamily::HighIntent => SignalUrgency::Medium,
        SignalFamily::PriceShopping => SignalUrgency::Medium,
        SignalFamily::Objection if strength >= 0.6 => SignalUrgency::Medium,
        SignalFamily::Objection => SignalUrgency::Low,
        SignalFamily::InformationSeeking => SignalUrgency::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize;

    #[test]
    fn strength_is_capped_at_one() {
        let s = detect(&normalize("ready to buy, i'll take it, sign today"));
        assert_eq!(s[0].family, SignalFamily::ReadyToBuy);
        assert_eq!(s[0].strength, 1.0);
        assert_eq!(s[0].urgency, SignalUrgency::High);
    }

    #[test]
    fn keeps_top_three_with_family_order_on_ties() {
        let text = normalize("test drive? best price? too much? how much?");
        let s = detect(&text);
        assert_eq!(s.len(), 3);
        assert!(s.windows(2).all(|w| w[0].strength >= w[1].strength));
        // information_seeking (0.4 + 0.2) ties price_shopping (0.6) and loses on order.
        assert_eq!(s[0].family, SignalFamily::PriceShopping);
        assert_eq!(s[1].family, SignalFamily::InformationSeeking);
        assert_eq!(s[2].family, SignalFamily::HighIntent);
    }

    #[test]
    fn urgent_keyword_raises_tier() {
        let calm = detect(&normalize("can i come by"));
        let rushed = detect(&normalize("can i come by today"));
        assert_eq!(calm[0].urgency, SignalUrgency::Medium);
        assert_eq!(rushed[0].urgency, SignalUrgency::High);
    }

    #[test]
    fn plain_text_has_no_signals() {
        assert!(detect(&normalize("ok thanks")).is_empty());
    }
}
