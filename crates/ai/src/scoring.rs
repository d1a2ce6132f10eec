//! Predictive lead scoring.
//!
//! Heuristic, deterministic predictions from engagement factors. Nothing here
//! is a trained model; the weights are tuned for ordering leads, not for
//! calibrated probabilities.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use leadflow_core::{Lead, Message};

use crate::analyzer::vehicle;
use crate::triggers::LeadContext;

/// Engagement factors of one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementFactors {
    pub response_rate: f64,
    /// Mean minutes from an outbound message to the reply that followed it.
    pub avg_response_minutes: Option<f64>,
    /// Vehicle-interest confidence, in \[0, 1\].
    pub interest_specificity: f64,
    pub sentiment: f64,
    pub engagement_trend: f64,
    pub hours_since_last_reply: Option<f64>,
    pub message_count: usize,
    pub make: Option<String>,
}

impl EngagementFactors {
    /// `messages` must be the lead's log, oldest first.
    pub fn from_conversation(lead: &Lead, messages: &[Message], now: DateTime<Utc>) -> Self {
        let ctx = LeadContext::build(lead, messages, now);

        let mut raw = lead.vehicle.raw.clone().unwrap_or_default();
        for m in messages.iter().filter(|m| m.is_inbound()) {
            raw.push('\n');
            raw.push_str(&m.body);
        }
        let interest = vehicle::extract(&raw);

        let hours_since_last_reply = messages
            .iter()
            .rev()
            .find(|m| m.is_inbound())
            .map(|m| ((now - m.sent_at).num_minutes() as f64 / 60.0).max(0.0));

        Self {
            response_rate: ctx.response_rate,
            avg_response_minutes: average_latency_minutes(messages),
            interest_specificity: interest.confidence,
            sentiment: ctx.sentiment,
            engagement_trend: ctx.engagement_trend,
            hours_since_last_reply,
            message_count: messages.len(),
            make: interest.make.or_else(|| lead.vehicle.make.clone()),
        }
    }
}

fn average_latency_minutes(messages: &[Message]) -> Option<f64> {
    let latencies: Vec<f64> = messages
        .windows(2)
        .filter(|w| w[0].is_outbound() && w[1].is_inbound())
        .map(|w| ((w[1].sent_at - w[0].sent_at).num_seconds() as f64 / 60.0).max(0.0))
        .collect();
    if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    }
}

/// Engagement profile of a lead that converted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessProfile {
    pub response_rate: f64,
    pub avg_response_minutes: f64,
    pub interest_specificity: f64,
    pub sentiment: f64,
}

impl From<&EngagementFactors> for SuccessProfile {
    fn from(f: &EngagementFactors) -> Self {
        Self {
            response_rate: f.response_rate,
            avg_response_minutes: f.avg_response_minutes.unwrap_or(24.0 * 60.0),
            interest_specificity: f.interest_specificity,
            sentiment: f.sentiment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub conversion_probability: f64,
    pub churn_risk: f64,
    pub predicted_value: f64,
    pub optimal_contact_time: DateTime<Utc>,
    pub recommended_actions: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PredictiveScorer {
    local_offset: FixedOffset,
    window_start_hour: u32,
    window_end_hour: u32,
}

impl PredictiveScorer {
    /// Contact window 09:00 to 18:00 dealership time.
    pub fn new(local_offset: FixedOffset) -> Self {
        Self {
            local_offset,
            window_start_hour: 9,
            window_end_hour: 18,
        }
    }

    pub fn predict(
        &self,
        factors: &EngagementFactors,
        successful: &[SuccessProfile],
        now: DateTime<Utc>,
    ) -> Prediction {
        let similarity = similarity(factors, successful);

        Prediction {
            conversion_probability: conversion_probability(factors, similarity),
            churn_risk: churn_risk(factors),
            predicted_value: predicted_value(factors),
            optimal_contact_time: self.snap_to_window(now + contact_offset(factors)),
            recommended_actions: recommended_actions(factors),
            confidence_score: confidence(factors, !successful.is_empty()),
        }
    }

    /// Move `at` into the local contact window: before opening goes to
    /// opening the same day, at or after closing to opening the next day.
    pub fn snap_to_window(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local = at.with_timezone(&self.local_offset);
        let hour = local.hour();
        let date = if hour < self.window_start_hour {
            local.date_naive()
        } else if hour >= self.window_end_hour {
            match local.date_naive().succ_opt() {
                Some(d) => d,
                None => return at,
            }
        } else {
            return at;
        };

        date.and_hms_opt(self.window_start_hour, 0, 0)
            .and_then(|naive| self.local_offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(at)
    }
}

fn similarity(f: &EngagementFactors, successful: &[SuccessProfile]) -> Option<f64> {
    if successful.is_empty() {
        return None;
    }
    let own = SuccessProfile::from(f);
    let norm_latency = |m: f64| (m / (24.0 * 60.0)).min(1.0);

    let total: f64 = successful
        .iter()
        .map(|p| {
            let d = [
                (own.response_rate - p.response_rate).abs(),
                (norm_latency(own.avg_response_minutes) - norm_latency(p.avg_response_minutes)).abs(),
                (own.interest_specificity - p.interest_specificity).abs(),
                ((own.sentiment - p.sentiment) / 2.0).abs(),
            ];
            1.0 - d.iter().sum::<f64>() / d.len() as f64
        })
        .sum();
    Some((total / successful.len() as f64).clamp(0.0, 1.0))
}

fn conversion_probability(f: &EngagementFactors, similarity: Option<f64>) -> f64 {
    let mut p = 0.3;
    p += (f.response_rate - 0.5) * 0.4;
    p += match f.avg_response_minutes {
        Some(m) if m < 30.0 => 0.1,
        Some(m) if m < 120.0 => 0.05,
        Some(m) if m > 24.0 * 60.0 => -0.1,
        _ => 0.0,
    };
    p += f.interest_specificity * 0.15;
    p += f.sentiment * 0.1;
    p += f.engagement_trend * 0.1;
    p += match f.hours_since_last_reply {
        Some(h) if h < 24.0 => 0.05,
        Some(h) if h > 168.0 => -0.15,
        Some(h) if h > 72.0 => -0.05,
        _ => 0.0,
    };
    if let Some(s) = similarity {
        p += (s - 0.5) * 0.2;
    }
    p.clamp(0.0, 1.0)
}

fn churn_risk(f: &EngagementFactors) -> f64 {
    let mut r = 0.2;
    r += match f.hours_since_last_reply {
        Some(h) if h > 168.0 => 0.4,
        Some(h) if h > 72.0 => 0.25,
        Some(h) if h > 24.0 => 0.1,
        Some(_) => 0.0,
        None => 0.2,
    };
    if f.response_rate < 0.2 {
        r += 0.2;
    } else if f.response_rate < 0.5 {
        r += 0.1;
    }
    if f.sentiment < 0.0 {
        r += -f.sentiment * 0.2;
    }
    if f.engagement_trend < 0.0 {
        r += -f.engagement_trend * 0.1;
    }
    r.clamp(0.0, 1.0)
}

fn predicted_value(f: &EngagementFactors) -> f64 {
    let base = vehicle::base_price_for(f.make.as_deref());
    let specificity = 0.85 + 0.3 * f.interest_specificity;
    let engagement = 0.9 + 0.2 * f.response_rate;
    let sentiment = 1.0 + 0.05 * f.sentiment;
    (base * specificity * engagement * sentiment).round()
}

/// Shorter gaps get answered sooner; long silences wait a day.
fn contact_offset(f: &EngagementFactors) -> Duration {
    match f.hours_since_last_reply {
        Some(h) if h < 1.0 => Duration::minutes(15),
        Some(h) if h < 24.0 => Duration::hours(2),
        Some(h) if h < 72.0 => Duration::hours(4),
        Some(_) => Duration::hours(24),
        None => Duration::hours(1),
    }
}

fn confidence(f: &EngagementFactors, has_history: bool) -> f64 {
    let volume = (f.message_count as f64 / 10.0).min(1.0) * 0.5;
    let latency = if f.avg_response_minutes.is_some() { 0.2 } else { 0.0 };
    let specificity = f.interest_specificity * 0.15;
    let history = if has_history { 0.15 } else { 0.0 };
    (volume + latency + specificity + history).clamp(0.0, 1.0)
}

fn recommended_actions(f: &EngagementFactors) -> Vec<String> {
    let mut actions = Vec::new();
    if f.response_rate >= 0.6 && f.sentiment >= 0.0 {
        actions.push("Prioritize for a personal call today".to_string());
    }
    if f.hours_since_last_reply.is_none_or(|h| h > 72.0) {
        actions.push("Send a re-engagement offer".to_string());
    }
    if f.interest_specificity < 0.4 {
        actions.push("Clarify the exact vehicle of interest".to_string());
    }
    if f.sentiment < -0.2 {
        actions.push("Address concerns before pitching".to_string());
    }
    if actions.is_empty() {
        actions.push("Continue the current cadence".to_string());
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn factors() -> EngagementFactors {
        EngagementFactors {
            response_rate: 0.8,
            avg_response_minutes: Some(20.0),
            interest_specificity: 1.0,
            sentiment: 0.5,
            engagement_trend: 0.5,
            hours_since_last_reply: Some(3.0),
            message_count: 12,
            make: Some("Ford".to_string()),
        }
    }

    #[test]
    fn engaged_lead_scores_high() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let p = PredictiveScorer::new(offset()).predict(&factors(), &[], now);
        assert!(p.conversion_probability > 0.6);
        assert!(p.churn_risk <= 0.2);
        assert!(p.confidence_score >= 0.5);
        // 45_000 × 1.15 × 1.06 × 1.025
        assert_eq!(p.predicted_value, 56_226.0);
        assert_eq!(p.optimal_contact_time, now + Duration::hours(2));
    }

    #[test]
    fn contact_time_snaps_into_window() {
        let scorer = PredictiveScorer::new(offset());
        // 02:00 UTC = 21:00 local the day before -> next local 09:00 = 14:00 UTC
        let late = Utc.with_ymd_and_hms(2026, 6, 2, 2, 0, 0).unwrap();
        assert_eq!(
            scorer.snap_to_window(late),
            Utc.with_ymd_and_hms(2026, 6, 2, 14, 0, 0).unwrap()
        );
        // 12:00 UTC = 07:00 local -> 09:00 local same day
        let early = Utc.with_ymd_and_hms(2026, 6, 2, 12, 0, 0).unwrap();
        assert_eq!(
            scorer.snap_to_window(early),
            Utc.with_ymd_and_hms(2026, 6, 2, 14, 0, 0).unwrap()
        );
        let inside = Utc.with_ymd_and_hms(2026, 6, 2, 16, 30, 0).unwrap();
        assert_eq!(scorer.snap_to_window(inside), inside);
    }

    #[test]
    fn silent_lead_has_high_churn_and_low_confidence() {
        let f = EngagementFactors {
            response_rate: 0.0,
            avg_response_minutes: None,
            interest_specificity: 0.0,
            sentiment: 0.0,
            engagement_trend: 0.0,
            hours_since_last_reply: None,
            message_count: 2,
            make: None,
        };
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let p = PredictiveScorer::new(offset()).predict(&f, &[], now);
        assert!((p.churn_risk - 0.6).abs() < 1e-9);
        assert!(p.confidence_score < 0.5);
        assert!(p.recommended_actions.contains(&"Send a re-engagement offer".to_string()));
    }

    #[test]
    fn similar_history_raises_conversion() {
        let f = factors();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let scorer = PredictiveScorer::new(offset());
        let alone = scorer.predict(&f, &[], now).conversion_probability;
        let twin = SuccessProfile::from(&f);
        let with_history = scorer.predict(&EngagementFactors { response_rate: 0.5, ..f.clone() }, &[twin], now);
        let without_history = scorer.predict(&EngagementFactors { response_rate: 0.5, ..f }, &[], now);
        assert!(with_history.conversion_probability > without_history.conversion_probability);
        assert!(alone <= 1.0);
    }

    #[test]
    fn factors_come_from_the_conversation() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let lead = Lead::new("Jo", t0).with_vehicle_interest("2025 Toyota Tacoma");
        let log = vec![
            Message::outbound_human(lead.id, "hi", t0),
            Message::inbound(lead.id, "great, thanks", t0 + Duration::minutes(30)),
        ];
        let f = EngagementFactors::from_conversation(&lead, &log, t0 + Duration::hours(2));
        assert_eq!(f.avg_response_minutes, Some(30.0));
        assert_eq!(f.response_rate, 1.0);
        assert_eq!(f.make.as_deref(), Some("Toyota"));
        assert!((f.interest_specificity - 1.0).abs() < 1e-9);
        assert_eq!(f.hours_since_last_reply, Some(1.5));
    }

    proptest! {
        #[test]
        fn outputs_are_clamped(
            rr in 0.0f64..=1.0,
            lat in proptest::option::of(0.0f64..10_000.0),
            spec in 0.0f64..=1.0,
            sent in -1.0f64..=1.0,
            trend in -1.0f64..=1.0,
            hours in proptest::option::of(0.0f64..1_000.0),
            count in 0usize..50,
        ) {
            let f = EngagementFactors {
                response_rate: rr,
                avg_response_minutes: lat,
                interest_specificity: spec,
                sentiment: sent,
                engagement_trend: trend,
                hours_since_last_reply: hours,
                message_count: count,
                make: None,
            };
            let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
            let p = PredictiveScorer::new(FixedOffset::east_opt(0).unwrap()).predict(&f, &[SuccessProfile::from(&f)], now);
            prop_assert!((0.0..=1.0).contains(&p.conversion_probability));
            prop_assert!((0.0..=1.0).contains(&p.churn_risk));
            prop_assert!((0.0..=1.0).contains(&p.confidence_score));
            prop_assert!(p.predicted_value > 0.0);
            let hour = p.optimal_contact_time.hour();
            prop_assert!((9..18).contains(&hour));
        }
    }
}
