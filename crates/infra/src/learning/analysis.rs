//! Batch analyses over message analytics rows.
//!
//! Each analysis returns `None` until it has enough data. Recommendations
//! carry no volatile numbers so repeated runs over growing data produce the
//! same text and de-duplicate in the store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use leadflow_core::{Impact, InsightType, LeadId, OptimizationInsight};

use crate::store::MessageAnalytics;

pub const MIN_TIMING_SAMPLES: usize = 10;
pub const MIN_TEMPLATES: usize = 3;
pub const CONTENT_LIFT: f64 = 1.2;
pub const MIN_FREQUENCY_SAMPLES: usize = 20;
pub const FREQUENCY_GAP: f64 = 0.15;
/// Sends per active local day at which a lead counts as high-frequency.
pub const HIGH_FREQUENCY_PER_DAY: f64 = 2.0;

fn impact_for(improvement: f64) -> Impact {
    if improvement >= 0.3 {
        Impact::High
    } else if improvement >= 0.1 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The three local hours with the lowest average reply latency.
pub fn optimal_hours(rows: &[MessageAnalytics], now: DateTime<Utc>) -> Option<OptimizationInsight> {
    let samples: Vec<(u32, f64)> = rows
        .iter()
        .filter_map(|r| r.response_latency_minutes.map(|l| (r.local_hour, l)))
        .collect();
    if samples.len() < MIN_TIMING_SAMPLES {
        return None;
    }

    let mut by_hour: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for (hour, latency) in &samples {
        let slot = by_hour.entry(*hour).or_insert((0.0, 0));
        slot.0 += latency;
        slot.1 += 1;
    }
    let mut averages: Vec<(u32, f64)> = by_hour
        .into_iter()
        .map(|(hour, (sum, n))| (hour, sum / n as f64))
        .collect();
    averages.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    averages.truncate(3);

    let overall = samples.iter().map(|(_, l)| l).sum::<f64>() / samples.len() as f64;
    let best = averages.iter().map(|(_, l)| l).sum::<f64>() / averages.len() as f64;
    let improvement = if overall > 0.0 {
        round2(((overall - best) / overall).max(0.0))
    } else {
        0.0
    };

    let mut hours: Vec<u32> = averages.iter().map(|(h, _)| *h).collect();
    hours.sort_unstable();
    let list = hours
        .iter()
        .map(|h| format!("{h:02}:00"))
        .collect::<Vec<_>>()
        .join(", ");

    Some(
        OptimizationInsight::new(
            InsightType::Timing,
            format!("Schedule sends at {list} local time; replies arrive fastest in these hours"),
            now,
        )
        .with_confidence(samples.len() as f64 / 50.0)
        .with_impact(impact_for(improvement))
        .with_expected_improvement(improvement),
    )
}

/// The template whose response rate beats its peers' average by 20%.
pub fn content_performance(
    rows: &[MessageAnalytics],
    now: DateTime<Utc>,
) -> Option<OptimizationInsight> {
    let mut by_template: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let slot = by_template.entry(row.template.as_str()).or_insert((0, 0));
        slot.0 += 1;
        if row.responded {
            slot.1 += 1;
        }
    }
    if by_template.len() < MIN_TEMPLATES {
        return None;
    }

    let rates: Vec<(&str, f64)> = by_template
        .iter()
        .map(|(t, (sent, answered))| (*t, *answered as f64 / *sent as f64))
        .collect();
    let (top_template, top_rate) = rates
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(a.0)))?;
    let peers: Vec<f64> = rates
        .iter()
        .filter(|(t, _)| *t != top_template)
        .map(|(_, r)| *r)
        .collect();
    let peer_avg = peers.iter().sum::<f64>() / peers.len() as f64;

    if top_rate <= 0.0 || top_rate <= CONTENT_LIFT * peer_avg {
        return None;
    }
    let improvement = if peer_avg > 0.0 {
        round2((top_rate - peer_avg) / peer_avg)
    } else {
        1.0
    };

    Some(
        OptimizationInsight::new(
            InsightType::Content,
            format!(
                "Favor the '{top_template}' template; it outperforms the other templates on response rate"
            ),
            now,
        )
        .with_confidence(rows.len() as f64 / 30.0)
        .with_impact(impact_for(improvement))
        .with_expected_improvement(improvement),
    )
}

/// Compare response rates of high- and low-frequency leads.
pub fn frequency(
    rows: &[MessageAnalytics],
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Option<OptimizationInsight> {
    if rows.len() < MIN_FREQUENCY_SAMPLES {
        return None;
    }

    let mut per_lead: HashMap<LeadId, (usize, usize, BTreeSet<NaiveDate>)> = HashMap::new();
    for row in rows {
        let slot = per_lead.entry(row.lead_id).or_default();
        slot.0 += 1;
        if row.responded {
            slot.1 += 1;
        }
        slot.2.insert(row.sent_at.with_timezone(&offset).date_naive());
    }

    let (mut high, mut low) = ((0usize, 0usize), (0usize, 0usize));
    for (sent, answered, days) in per_lead.values() {
        let per_day = *sent as f64 / days.len().max(1) as f64;
        let cohort = if per_day >= HIGH_FREQUENCY_PER_DAY {
            &mut high
        } else {
            &mut low
        };
        cohort.0 += sent;
        cohort.1 += answered;
    }
    if high.0 == 0 || low.0 == 0 {
        return None;
    }

    let high_rate = high.1 as f64 / high.0 as f64;
    let low_rate = low.1 as f64 / low.0 as f64;
    let gap = high_rate - low_rate;
    if gap.abs() <= FREQUENCY_GAP {
        return None;
    }

    let recommendation = if gap < 0.0 {
        "Reduce message frequency; leads contacted less often respond more"
    } else {
        "Increase message frequency; leads contacted more often respond more"
    };
    let improvement = round2(gap.abs());

    Some(
        OptimizationInsight::new(InsightType::Frequency, recommendation, now)
            .with_confidence(rows.len() as f64 / 100.0)
            .with_impact(impact_for(improvement))
            .with_expected_improvement(improvement),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone, Timelike};
    use leadflow_core::MessageId;

    fn eastern() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
    }

    fn row(lead_id: LeadId, at: DateTime<Utc>, template: &str, latency: Option<f64>) -> MessageAnalytics {
        let local = at.with_timezone(&eastern());
        MessageAnalytics {
            message_id: MessageId::new(),
            lead_id,
            flow: "aggressive_sequence".into(),
            template: template.into(),
            local_hour: local.hour(),
            weekday: local.weekday(),
            body_chars: 120,
            sent_at: at,
            responded: latency.is_some(),
            response_latency_minutes: latency,
        }
    }

    #[test]
    fn timing_needs_ten_samples() {
        let lead = LeadId::new();
        let rows: Vec<_> = (0..9)
            .map(|i| row(lead, t0() + Duration::hours(i), "t", Some(10.0)))
            .collect();
        assert!(optimal_hours(&rows, t0()).is_none());
    }

    #[test]
    fn timing_picks_three_fastest_hours() {
        let lead = LeadId::new();
        // Local hours 9..=14, latency grows with the hour.
        let rows: Vec<_> = (0..12)
            .map(|i| {
                let hour = (i % 6) as i64;
                row(
                    lead,
                    t0() + Duration::hours(hour),
                    "t",
                    Some(5.0 + 10.0 * hour as f64),
                )
            })
            .collect();
        let insight = optimal_hours(&rows, t0()).unwrap();
        assert_eq!(insight.insight_type, InsightType::Timing);
        assert!(insight.recommendation.contains("09:00, 10:00, 11:00"));
        assert!(insight.expected_improvement > 0.0);
    }

    #[test]
    fn content_requires_a_clear_winner() {
        let lead = LeadId::new();
        let mut rows = Vec::new();
        for (template, answered) in [("a", 3), ("b", 1), ("c", 1)] {
            for i in 0..4 {
                let latency = (i < answered).then_some(15.0);
                rows.push(row(lead, t0(), template, latency));
            }
        }
        let insight = content_performance(&rows, t0()).unwrap();
        assert!(insight.recommendation.contains("'a'"));
        assert_eq!(insight.expected_improvement, 2.0);

        // Two templates are not enough.
        let two: Vec<_> = rows.iter().filter(|r| r.template != "c").cloned().collect();
        assert!(content_performance(&two, t0()).is_none());
    }

    #[test]
    fn content_ignores_small_lifts() {
        let lead = LeadId::new();
        let mut rows = Vec::new();
        for template in ["a", "b", "c"] {
            for i in 0..4 {
                rows.push(row(lead, t0(), template, (i < 2).then_some(15.0)));
            }
        }
        assert!(content_performance(&rows, t0()).is_none());
    }

    #[test]
    fn frequency_recommends_fewer_sends_when_heavy_cohort_lags() {
        let mut rows = Vec::new();
        // Heavy: three leads, 3 sends on one day each, nobody answers.
        for _ in 0..3 {
            let lead = LeadId::new();
            for h in 0..3 {
                rows.push(row(lead, t0() + Duration::hours(h), "t", None));
            }
        }
        // Light: twelve leads, one send each, half answer.
        for i in 0..12 {
            let lead = LeadId::new();
            rows.push(row(lead, t0(), "t", (i % 2 == 0).then_some(30.0)));
        }
        assert!(rows.len() >= MIN_FREQUENCY_SAMPLES);

        let insight = frequency(&rows, eastern(), t0()).unwrap();
        assert_eq!(insight.insight_type, InsightType::Frequency);
        assert!(insight.recommendation.starts_with("Reduce"));
        assert_eq!(insight.expected_improvement, 0.5);
        assert_eq!(insight.impact, Impact::High);
    }

    #[test]
    fn frequency_needs_twenty_samples() {
        let lead = LeadId::new();
        let rows: Vec<_> = (0..19).map(|_| row(lead, t0(), "t", None)).collect();
        assert!(frequency(&rows, eastern(), t0()).is_none());
    }
}
