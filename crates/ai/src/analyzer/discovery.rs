//! Discovery question bank.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::contains_any;

const MAX_QUESTIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuestion {
    pub topic: String,
    pub question: String,
    pub priority: u8,
}

struct BankEntry {
    topic: &'static str,
    question: &'static str,
    priority: u8,
    /// Matches outbound text that already asked about the topic.
    asked: Regex,
    /// Transcript keywords that make the question redundant.
    answered_by: &'static [&'static str],
}

static BANK: Lazy<Vec<BankEntry>> = Lazy::new(|| {
    let entry = |topic: &'static str,
                 question: &'static str,
                 priority: u8,
                 asked: &str,
                 answered_by: &'static [&'static str]| BankEntry {
        topic,
        question,
        priority,
        asked: Regex::new(asked).expect("discovery pattern"),
        answered_by,
    };
    vec![
        entry(
            "timeline",
            "When are you hoping to be driving your new vehicle?",
            90,
            r"(?i)\b(when are you|timeline|timeframe|how soon)\b",
            &[
                "today", "tomorrow", "this week", "next week", "next month", "asap", "soon",
            ],
        ),
        entry(
            "budget",
            "Do you have a monthly payment range in mind?",
            85,
            r"(?i)(payment range|budget|monthly payment)",
            &["budget", "payment", "monthly", "afford", "$"],
        ),
        entry(
            "usage",
            "Will this be mostly for work, family, or personal driving?",
            80,
            r"(?i)(mostly for|use it for|using it for|for work, family)",
            &["work", "family", "kids", "commute", "business"],
        ),
        entry(
            "trade_in",
            "Do you have a vehicle you're thinking of trading in?",
            70,
            r"(?i)trad(e|ing)[- ]?in",
            &["trade", "trading", "trade-in"],
        ),
        entry(
            "must_haves",
            "Which features are must-haves for you?",
            60,
            r"(?i)(must[- ]haves?|features? (are|is) important)",
            &["tow", "towing", "awd", "4x4", "crew cab", "diesel", "hybrid", "features"],
        ),
        entry(
            "financing",
            "Are you planning to finance, lease, or pay cash?",
            50,
            r"(?i)(finance, lease|financ(e|ing) or|pay cash)",
            &["finance", "financing", "lease", "cash", "loan", "interest rate", "apr"],
        ),
        entry(
            "test_drive",
            "Would you like to set up a quick test drive?",
            40,
            r"(?i)test drive",
            &["test drive", "appointment"],
        ),
    ]
});

/// Up to two unasked, non-redundant questions by descending priority.
///
/// `outbound_text` is the raw outbound history, `customer_text` the
/// normalized inbound side of the transcript.
pub fn suggest(outbound_text: &str, customer_text: &str) -> Vec<DiscoveryQuestion> {
    let mut out: Vec<DiscoveryQuestion> = BANK
        .iter()
        .filter(|q| !q.asked.is_match(outbound_text))
        .filter(|q| !contains_any(customer_text, q.answered_by))
        .map(|q| DiscoveryQuestion {
            topic: q.topic.to_string(),
            question: q.question.to_string(),
            priority: q.priority,
        })
        .collect();

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out.truncate(MAX_QUESTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_yields_top_two() {
        let q = suggest("", "");
        let topics: Vec<&str> = q.iter().map(|q| q.topic.as_str()).collect();
        assert_eq!(topics, vec!["timeline", "budget"]);
    }

    #[test]
    fn already_asked_topics_are_skipped() {
        let q = suggest("Hi! When are you hoping to buy?", "");
        let topics: Vec<&str> = q.iter().map(|q| q.topic.as_str()).collect();
        assert_eq!(topics, vec!["budget", "usage"]);
    }

    #[test]
    fn answered_topics_are_redundant() {
        let q = suggest("", "need it asap, budget is $500 a month");
        let topics: Vec<&str> = q.iter().map(|q| q.topic.as_str()).collect();
        assert_eq!(topics, vec!["usage", "trade_in"]);
    }
}
