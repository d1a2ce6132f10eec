//! Learning feedback loop.
//!
//! Learning events are queued and applied in batches: each batch persists
//! its analytics rows, then re-runs the analyses over the full history and
//! stores any new insight. Insights are advisory and never change engine
//! behavior on their own.

pub mod analysis;
pub mod worker;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use leadflow_core::OptimizationInsight;
use leadflow_events::{LearningEvent, LearningPayload};

use crate::store::{
    AnalyticsStore, CommunicationPattern, LearningOutcome, MessageAnalytics, OutcomeKind,
    StoreError,
};

pub use worker::{LearningWorker, LearningWorkerHandle};

/// How many applied event ids are remembered for duplicate suppression.
const SEEN_CAPACITY: usize = 4096;

/// Result of one applied batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub events_applied: usize,
    pub duplicates_ignored: usize,
    pub insights_created: Vec<OptimizationInsight>,
}

#[derive(Debug, Default)]
struct LoopState {
    queue: Vec<LearningEvent>,
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
}

impl LoopState {
    fn first_sighting(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.seen_order.push_back(id);
        if self.seen_order.len() > SEEN_CAPACITY {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

/// Batches learning events into analytics rows and insights.
pub struct LearningLoop<A> {
    store: Arc<A>,
    batch_size: usize,
    offset: FixedOffset,
    state: Mutex<LoopState>,
}

impl<A> LearningLoop<A>
where
    A: AnalyticsStore,
{
    pub fn new(store: Arc<A>, batch_size: usize, offset: FixedOffset) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            offset,
            state: Mutex::new(LoopState::default()),
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Queue an event; applies the batch once it reaches the batch size.
    pub fn ingest(&self, event: LearningEvent) -> Result<Option<BatchReport>, StoreError> {
        let now = event.timestamp;
        let full = {
            let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            state.queue.push(event);
            state.queue.len() >= self.batch_size
        };
        if full { self.flush(now).map(Some) } else { Ok(None) }
    }

    /// Apply every queued event now, regardless of batch size.
    pub fn flush(&self, now: DateTime<Utc>) -> Result<BatchReport, StoreError> {
        let (batch, duplicates) = {
            let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            let queued = std::mem::take(&mut state.queue);
            let total = queued.len();
            let fresh: Vec<_> = queued
                .into_iter()
                .filter(|e| state.first_sighting(e.id))
                .collect();
            let duplicates = total - fresh.len();
            (fresh, duplicates)
        };

        let mut report = BatchReport {
            duplicates_ignored: duplicates,
            ..BatchReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        for event in &batch {
            self.apply(event)?;
            report.events_applied += 1;
        }
        report.insights_created = self.analyze(now)?;

        info!(
            events = report.events_applied,
            duplicates = report.duplicates_ignored,
            insights = report.insights_created.len(),
            "learning batch applied"
        );
        Ok(report)
    }

    /// Run the analyses over all stored rows and persist new insights.
    pub fn analyze(&self, now: DateTime<Utc>) -> Result<Vec<OptimizationInsight>, StoreError> {
        let rows = self.store.message_analytics()?;
        let candidates = [
            analysis::optimal_hours(&rows, now),
            analysis::content_performance(&rows, now),
            analysis::frequency(&rows, self.offset, now),
        ];

        let mut created = Vec::new();
        for insight in candidates.into_iter().flatten() {
            if self.store.insert_insight(insight.clone())? {
                info!(
                    insight_type = ?insight.insight_type,
                    impact = ?insight.impact,
                    recommendation = %insight.recommendation,
                    "optimization insight recorded"
                );
                created.push(insight);
            }
        }
        Ok(created)
    }

    fn apply(&self, event: &LearningEvent) -> Result<(), StoreError> {
        match &event.payload {
            LearningPayload::MessageSent {
                message_id,
                flow,
                template,
                body_chars,
            } => {
                let local = event.timestamp.with_timezone(&self.offset);
                self.store.record_message_analytics(MessageAnalytics {
                    message_id: *message_id,
                    lead_id: event.lead_id,
                    flow: flow.clone(),
                    template: template.clone(),
                    local_hour: local.hour(),
                    weekday: local.weekday(),
                    body_chars: *body_chars,
                    sent_at: event.timestamp,
                    responded: false,
                    response_latency_minutes: None,
                })
            }
            LearningPayload::ResponseReceived {
                message_id,
                answered_message_id,
                latency_minutes,
                sentiment,
            } => {
                let answered = match answered_message_id {
                    Some(id) => self.store.mark_response(*id, *latency_minutes)?,
                    None => None,
                };
                self.store.append_pattern(CommunicationPattern {
                    lead_id: event.lead_id,
                    message_id: *message_id,
                    answered_message_id: *answered_message_id,
                    latency_minutes: *latency_minutes,
                    sentiment: *sentiment,
                    answered_local_hour: answered.map(|row| row.local_hour),
                    recorded_at: event.timestamp,
                })
            }
            LearningPayload::Conversion { value } => self.store.record_outcome(LearningOutcome {
                lead_id: event.lead_id,
                kind: OutcomeKind::Conversion,
                value: *value,
                appointment_at: None,
                recorded_at: event.timestamp,
            }),
            LearningPayload::AppointmentBooked { appointment_at } => {
                self.store.record_outcome(LearningOutcome {
                    lead_id: event.lead_id,
                    kind: OutcomeKind::AppointmentBooked,
                    value: None,
                    appointment_at: *appointment_at,
                    recorded_at: event.timestamp,
                })
            }
            LearningPayload::TriggerFired { trigger_type, .. } => {
                debug!(lead_id = %event.lead_id, trigger_type = ?trigger_type, "trigger event noted");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use leadflow_core::{InsightType, LeadId, MessageId};

    use crate::store::InMemoryStore;

    fn t0() -> DateTime<Utc> {
        // 09:00 at UTC-5.
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
    }

    fn eastern() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn sent(lead: LeadId, id: MessageId, template: &str, at: DateTime<Utc>) -> LearningEvent {
        LearningEvent::new(
            lead,
            LearningPayload::MessageSent {
                message_id: id,
                flow: "aggressive_sequence".into(),
                template: template.into(),
                body_chars: 80,
            },
            at,
        )
    }

    fn reply(lead: LeadId, answered: MessageId, latency: f64, at: DateTime<Utc>) -> LearningEvent {
        LearningEvent::new(
            lead,
            LearningPayload::ResponseReceived {
                message_id: MessageId::new(),
                answered_message_id: Some(answered),
                latency_minutes: Some(latency),
                sentiment: 0.5,
            },
            at,
        )
    }

    #[test]
    fn events_wait_for_a_full_batch() {
        let store = Arc::new(InMemoryStore::new());
        let learning = LearningLoop::new(store.clone(), 3, eastern());
        let lead = LeadId::new();

        assert!(learning.ingest(sent(lead, MessageId::new(), "a", t0())).unwrap().is_none());
        assert!(learning.ingest(sent(lead, MessageId::new(), "a", t0())).unwrap().is_none());
        assert!(store.message_analytics().unwrap().is_empty());

        let report = learning
            .ingest(sent(lead, MessageId::new(), "a", t0()))
            .unwrap()
            .expect("third event flushes");
        assert_eq!(report.events_applied, 3);
        assert_eq!(store.message_analytics().unwrap().len(), 3);
        assert_eq!(learning.pending(), 0);
    }

    #[test]
    fn sent_rows_carry_local_hour_and_replies_mark_them() {
        let store = Arc::new(InMemoryStore::new());
        let learning = LearningLoop::new(store.clone(), 1, eastern());
        let lead = LeadId::new();
        let msg = MessageId::new();

        learning.ingest(sent(lead, msg, "a", t0())).unwrap();
        learning
            .ingest(reply(lead, msg, 12.0, t0() + Duration::minutes(12)))
            .unwrap();

        let rows = store.message_analytics().unwrap();
        assert_eq!(rows[0].local_hour, 9);
        assert!(rows[0].responded);
        assert_eq!(rows[0].response_latency_minutes, Some(12.0));

        let patterns = store.patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].answered_local_hour, Some(9));
    }

    #[test]
    fn outcomes_are_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let learning = LearningLoop::new(store.clone(), 3, eastern());
        let lead = LeadId::new();
        learning
            .ingest(LearningEvent::new(
                lead,
                LearningPayload::Conversion { value: Some(38_500.0) },
                t0(),
            ))
            .unwrap();
        learning
            .ingest(LearningEvent::new(
                lead,
                LearningPayload::AppointmentBooked { appointment_at: Some(t0()) },
                t0(),
            ))
            .unwrap();
        learning.flush(t0()).unwrap();

        let outcomes = store.outcomes().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind, OutcomeKind::Conversion);
        assert_eq!(outcomes[1].kind, OutcomeKind::AppointmentBooked);
    }

    #[test]
    fn redelivered_events_are_applied_once() {
        let store = Arc::new(InMemoryStore::new());
        let learning = LearningLoop::new(store.clone(), 10, eastern());
        let event = LearningEvent::new(
            LeadId::new(),
            LearningPayload::Conversion { value: None },
            t0(),
        );
        learning.ingest(event.clone()).unwrap();
        learning.ingest(event).unwrap();
        let report = learning.flush(t0()).unwrap();
        assert_eq!(report.events_applied, 1);
        assert_eq!(report.duplicates_ignored, 1);
        assert_eq!(store.outcomes().unwrap().len(), 1);
    }

    #[test]
    fn repeated_analysis_does_not_duplicate_insights() {
        let store = Arc::new(InMemoryStore::new());
        let learning = LearningLoop::new(store.clone(), 100, eastern());
        let lead = LeadId::new();
        for i in 0..12 {
            let at = t0() + Duration::hours(i % 4);
            let msg = MessageId::new();
            learning.ingest(sent(lead, msg, "a", at)).unwrap();
            learning
                .ingest(reply(lead, msg, 5.0 + i as f64, at + Duration::minutes(5)))
                .unwrap();
        }
        let first = learning.flush(t0() + Duration::days(1)).unwrap();
        assert!(first
            .insights_created
            .iter()
            .any(|i| i.insight_type == InsightType::Timing));

        let again = learning.analyze(t0() + Duration::days(2)).unwrap();
        assert!(again.is_empty());
        assert_eq!(
            store
                .insights()
                .unwrap()
                .iter()
                .filter(|i| i.insight_type == InsightType::Timing)
                .count(),
            1
        );
    }
}
