//! Per-lead metric snapshot the trigger rules are evaluated against.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use leadflow_core::{Lead, Message};

use super::rules::Metric;
use crate::analyzer::signals::URGENT_TERMS;
use crate::text::{count_terms, normalize, sentiment_score};

const PRICE_TERMS: &[&str] = &[
    "price", "cost", "payment", "discount", "deal", "otd", "out the door", "cheaper", "afford",
    "msrp", "quote",
];

const COMPETITOR_TERMS: &[&str] = &[
    "carmax",
    "carvana",
    "another dealer",
    "other dealer",
    "another dealership",
    "other dealership",
    "competitor",
    "quote from",
    "down the street",
    "better offer",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadContext {
    pub days_since_created: f64,
    /// Days since the last inbound message, or since creation if none.
    pub days_since_last_reply: f64,
    /// Share of outbound messages that got an inbound reply before the next
    /// outbound, in \[0, 1\].
    pub response_rate: f64,
    pub price_mentions: f64,
    pub urgency_mentions: f64,
    pub competitor_mentions: f64,
    /// Mean lexicon sentiment of inbound messages, in \[-1, 1\].
    pub sentiment: f64,
    /// Inbound volume this week against last week, in \[-1, 1\].
    pub engagement_trend: f64,
    pub inbound_count: f64,
    pub outbound_count: f64,
}

impl LeadContext {
    /// `messages` must be the lead's log, oldest first.
    pub fn build(lead: &Lead, messages: &[Message], now: DateTime<Utc>) -> Self {
        let inbound: Vec<&Message> = messages.iter().filter(|m| m.is_inbound()).collect();
        let outbound_count = messages.iter().filter(|m| m.is_outbound()).count();

        let days_since_created = days_between(lead.created_at, now);
        let days_since_last_reply = inbound
            .last()
            .map(|m| days_between(m.sent_at, now))
            .unwrap_or(days_since_created);

        let customer: String = inbound
            .iter()
            .map(|m| normalize(&m.body))
            .collect::<Vec<_>>()
            .join("\n");

        let sentiment = if inbound.is_empty() {
            0.0
        } else {
            inbound.iter().map(|m| sentiment_score(&m.body)).sum::<f64>() / inbound.len() as f64
        };

        Self {
            days_since_created,
            days_since_last_reply,
            response_rate: response_rate(messages),
            price_mentions: count_terms(&customer, PRICE_TERMS) as f64,
            urgency_mentions: count_terms(&customer, URGENT_TERMS) as f64,
            competitor_mentions: count_terms(&customer, COMPETITOR_TERMS) as f64,
            sentiment,
            engagement_trend: engagement_trend(&inbound, now),
            inbound_count: inbound.len() as f64,
            outbound_count: outbound_count as f64,
        }
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::DaysSinceCreated => self.days_since_created,
            Metric::DaysSinceLastReply => self.days_since_last_reply,
            Metric::ResponseRate => self.response_rate,
            Metric::PriceMentions => self.price_mentions,
            Metric::UrgencyMentions => self.urgency_mentions,
            Metric::CompetitorMentions => self.competitor_mentions,
            Metric::Sentiment => self.sentiment,
            Metric::EngagementTrend => self.engagement_trend,
            Metric::InboundCount => self.inbound_count,
            Metric::OutboundCount => self.outbound_count,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_seconds() as f64 / 86_400.0).max(0.0)
}

fn response_rate(messages: &[Message]) -> f64 {
    let mut outbound = 0usize;
    let mut answered = 0usize;
    let mut awaiting = false;

    for m in messages {
        if m.is_outbound() {
            outbound += 1;
            awaiting = true;
        } else if awaiting {
            answered += 1;
            awaiting = false;
        }
    }

    if outbound == 0 {
        0.0
    } else {
        answered as f64 / outbound as f64
    }
}

fn engagement_trend(inbound: &[&Message], now: DateTime<Utc>) -> f64 {
    let week = Duration::days(7);
    let this_week = inbound
        .iter()
        .filter(|m| m.sent_at > now - week && m.sent_at <= now)
        .count() as f64;
    let last_week = inbound
        .iter()
        .filter(|m| m.sent_at > now - week - week && m.sent_at <= now - week)
        .count() as f64;

    if this_week + last_week == 0.0 {
        0.0
    } else {
        (this_week - last_week) / (this_week + last_week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 14, 0, 0).unwrap()
    }

    #[test]
    fn response_rate_counts_answered_outbound() {
        let lead = Lead::new("Ana", t0());
        let log = vec![
            Message::outbound_human(lead.id, "hi", t0()),
            Message::inbound(lead.id, "hey", t0() + Duration::minutes(5)),
            Message::inbound(lead.id, "also", t0() + Duration::minutes(6)),
            Message::outbound_human(lead.id, "?", t0() + Duration::hours(1)),
        ];
        let ctx = LeadContext::build(&lead, &log, t0() + Duration::days(2));
        assert_eq!(ctx.response_rate, 0.5);
        assert_eq!(ctx.inbound_count, 2.0);
        assert_eq!(ctx.outbound_count, 2.0);
        assert!((ctx.days_since_created - 2.0).abs() < 1e-9);
    }

    #[test]
    fn no_reply_falls_back_to_creation_age() {
        let lead = Lead::new("Ana", t0());
        let ctx = LeadContext::build(&lead, &[], t0() + Duration::days(3));
        assert!((ctx.days_since_last_reply - 3.0).abs() < 1e-9);
        assert_eq!(ctx.response_rate, 0.0);
        assert_eq!(ctx.engagement_trend, 0.0);
    }

    #[test]
    fn trend_compares_this_week_to_last() {
        let lead = Lead::new("Ana", t0());
        let now = t0() + Duration::days(14);
        let log = vec![
            Message::inbound(lead.id, "a", t0() + Duration::days(1)),
            Message::inbound(lead.id, "b", t0() + Duration::days(2)),
            Message::inbound(lead.id, "c", t0() + Duration::days(3)),
            Message::inbound(lead.id, "d", t0() + Duration::days(10)),
        ];
        let ctx = LeadContext::build(&lead, &log, now);
        assert_eq!(ctx.engagement_trend, -0.5);
    }

    #[test]
    fn keyword_counts_only_read_customer_text() {
        let lead = Lead::new("Ana", t0());
        let log = vec![
            Message::outbound_human(lead.id, "best price, great deal", t0()),
            Message::inbound(lead.id, "carmax quoted a better price", t0()),
        ];
        let ctx = LeadContext::build(&lead, &log, t0());
        assert_eq!(ctx.price_mentions, 1.0);
        assert_eq!(ctx.competitor_mentions, 1.0);
    }
}
