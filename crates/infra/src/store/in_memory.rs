//! In-memory datastore for tests/dev.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use leadflow_core::{
    BehavioralTrigger, Claim, ClaimToken, DueCondition, InsightId, Lead, LeadId, Message,
    MessageId, OptimizationInsight, ScheduleEntryId, ScheduledEntry, TriggerId,
};

use super::analytics::{CommunicationPattern, LearningOutcome, MessageAnalytics};
use super::r#trait::{AnalyticsStore, LeadStore, StoreError};

#[derive(Debug, Default)]
struct State {
    leads: HashMap<LeadId, Lead>,
    lead_order: Vec<LeadId>,
    messages: HashMap<MessageId, Message>,
    conversations: HashMap<LeadId, Vec<MessageId>>,
    entries: HashMap<ScheduleEntryId, ScheduledEntry>,
    schedules: HashMap<LeadId, Vec<ScheduleEntryId>>,
    triggers: Vec<BehavioralTrigger>,
}

impl State {
    fn conversation(&self, lead_id: LeadId) -> impl Iterator<Item = &Message> {
        self.conversations
            .get(&lead_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.messages.get(id))
    }

    fn latest_message(&self, lead_id: LeadId) -> Option<&Message> {
        self.conversation(lead_id).max_by_key(|m| m.sent_at)
    }

    /// Whether `condition` still holds for `lead` at `now`.
    fn condition_holds(&self, lead: &Lead, condition: DueCondition, now: DateTime<Utc>) -> bool {
        match condition {
            DueCondition::InitialContact => {
                lead.autonomous_sends_allowed()
                    && !self.conversation(lead.id).any(Message::reached_customer)
            }
            DueCondition::FollowUp => lead.follow_up_due(now),
            DueCondition::Advancement { inbound_id } => {
                lead.autonomous_sends_allowed()
                    && self
                        .latest_message(lead.id)
                        .is_some_and(|m| m.id == inbound_id && m.is_inbound())
            }
            DueCondition::ScheduledEntry { entry_id } => {
                lead.autonomous_sends_allowed()
                    && !lead.sequence_paused
                    && self
                        .entries
                        .get(&entry_id)
                        .is_some_and(|e| e.lead_id == lead.id && e.is_due(now))
            }
            DueCondition::Takeover => lead.takeover_due(now),
        }
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut Message, StoreError> {
        self.messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
    }

    fn entry_mut(&mut self, id: ScheduleEntryId) -> Result<&mut ScheduledEntry, StoreError> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule entry {id}")))
    }
}

#[derive(Debug, Default)]
struct Analytics {
    messages: Vec<MessageAnalytics>,
    patterns: Vec<CommunicationPattern>,
    outcomes: Vec<LearningOutcome>,
    insights: Vec<OptimizationInsight>,
}

/// In-memory store.
///
/// All lead-side state sits behind one lock, so `try_claim` is a plain
/// compare-and-set under the write guard.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    analytics: RwLock<Analytics>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    fn read_analytics(&self) -> Result<RwLockReadGuard<'_, Analytics>, StoreError> {
        self.analytics.read().map_err(|_| StoreError::Poisoned)
    }

    fn write_analytics(&self) -> Result<RwLockWriteGuard<'_, Analytics>, StoreError> {
        self.analytics.write().map_err(|_| StoreError::Poisoned)
    }
}

impl LeadStore for InMemoryStore {
    fn insert_lead(&self, lead: Lead) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.leads.contains_key(&lead.id) {
            state.lead_order.push(lead.id);
        }
        state.leads.insert(lead.id, lead);
        Ok(())
    }

    fn get_lead(&self, id: LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.read()?.leads.get(&id).cloned())
    }

    fn list_leads(&self) -> Result<Vec<Lead>, StoreError> {
        let state = self.read()?;
        Ok(state
            .lead_order
            .iter()
            .filter_map(|id| state.leads.get(id).cloned())
            .collect())
    }

    fn modify_lead(
        &self,
        id: LeadId,
        change: &mut dyn FnMut(&mut Lead),
    ) -> Result<Lead, StoreError> {
        let mut state = self.write()?;
        let lead = state
            .leads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("lead {id}")))?;
        change(lead);
        Ok(lead.clone())
    }

    fn try_claim(
        &self,
        lead_id: LeadId,
        condition: DueCondition,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Claim>, StoreError> {
        let mut state = self.write()?;
        let Some(lead) = state.leads.get(&lead_id) else {
            return Err(StoreError::NotFound(format!("lead {lead_id}")));
        };
        if lead.has_live_claim(now) || !state.condition_holds(lead, condition, now) {
            return Ok(None);
        }

        let claim = Claim::new(condition, now, lease);
        if let Some(lead) = state.leads.get_mut(&lead_id) {
            lead.claim = Some(claim);
        }
        Ok(Some(claim))
    }

    fn release_claim(&self, lead_id: LeadId, token: ClaimToken) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(lead) = state.leads.get_mut(&lead_id) {
            if lead.claim.is_some_and(|c| c.token == token) {
                lead.claim = None;
            }
        }
        Ok(())
    }

    fn append_message(&self, message: Message) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.messages.contains_key(&message.id) {
            return Err(StoreError::InvalidTransition(format!(
                "message {} already exists",
                message.id
            )));
        }
        state
            .conversations
            .entry(message.lead_id)
            .or_default()
            .push(message.id);
        state.messages.insert(message.id, message);
        Ok(())
    }

    fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.read()?.messages.get(&id).cloned())
    }

    fn messages_for(&self, lead_id: LeadId) -> Result<Vec<Message>, StoreError> {
        let state = self.read()?;
        let mut log: Vec<Message> = state.conversation(lead_id).cloned().collect();
        log.sort_by_key(|m| m.sent_at);
        Ok(log)
    }

    fn mark_message_sent(&self, id: MessageId, provider_id: &str) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        state
            .message_mut(id)?
            .mark_sent(provider_id)
            .map_err(|e| StoreError::InvalidTransition(e.to_string()))
    }

    fn mark_message_failed(&self, id: MessageId, error: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state
            .message_mut(id)?
            .mark_failed(error)
            .map_err(|e| StoreError::InvalidTransition(e.to_string()))
    }

    fn insert_schedule(&self, entries: Vec<ScheduledEntry>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for entry in entries {
            state.schedules.entry(entry.lead_id).or_default().push(entry.id);
            state.entries.insert(entry.id, entry);
        }
        Ok(())
    }

    fn schedule_for(&self, lead_id: LeadId) -> Result<Vec<ScheduledEntry>, StoreError> {
        let state = self.read()?;
        let mut entries: Vec<ScheduledEntry> = state
            .schedules
            .get(&lead_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect();
        entries.sort_by_key(|e| e.scheduled_at);
        Ok(entries)
    }

    fn due_entries(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledEntry>, StoreError> {
        let state = self.read()?;
        let mut earliest: HashMap<LeadId, &ScheduledEntry> = HashMap::new();
        for entry in state.entries.values().filter(|e| e.is_due(now)) {
            let paused = state
                .leads
                .get(&entry.lead_id)
                .is_none_or(|l| l.sequence_paused);
            if paused {
                continue;
            }
            earliest
                .entry(entry.lead_id)
                .and_modify(|cur| {
                    if entry.scheduled_at < cur.scheduled_at {
                        *cur = entry;
                    }
                })
                .or_insert(entry);
        }
        let mut due: Vec<ScheduledEntry> = earliest.into_values().cloned().collect();
        due.sort_by_key(|e| (e.scheduled_at, e.lead_id));
        Ok(due)
    }

    fn mark_entry_sent(&self, id: ScheduleEntryId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let lead_id = state.entry_mut(id)?.lead_id;
        if state.leads.get(&lead_id).is_some_and(|l| l.sequence_paused) {
            return Err(StoreError::InvalidTransition(format!(
                "lead {lead_id} is paused; entry {id} cannot be sent"
            )));
        }
        let entry = state.entry_mut(id)?;
        if let Some(reason) = &entry.skipped {
            return Err(StoreError::InvalidTransition(format!(
                "entry {id} was skipped ({reason})"
            )));
        }
        entry.sent = true;
        Ok(())
    }

    fn skip_entry(&self, id: ScheduleEntryId, reason: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let entry = state.entry_mut(id)?;
        if entry.sent {
            return Err(StoreError::InvalidTransition(format!(
                "entry {id} already sent"
            )));
        }
        entry.skipped.get_or_insert_with(|| reason.to_string());
        Ok(())
    }

    fn skip_open_entries(&self, lead_id: LeadId, reason: &str) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let ids = state.schedules.get(&lead_id).cloned().unwrap_or_default();
        let mut voided = 0;
        for id in ids {
            if let Some(entry) = state.entries.get_mut(&id) {
                if entry.is_open() {
                    entry.skipped = Some(reason.to_string());
                    voided += 1;
                }
            }
        }
        Ok(voided)
    }

    fn insert_trigger(&self, trigger: BehavioralTrigger) -> Result<(), StoreError> {
        self.write()?.triggers.push(trigger);
        Ok(())
    }

    fn triggers_for(&self, lead_id: LeadId) -> Result<Vec<BehavioralTrigger>, StoreError> {
        Ok(self
            .read()?
            .triggers
            .iter()
            .filter(|t| t.lead_id == lead_id)
            .cloned()
            .collect())
    }

    fn mark_trigger_processed(
        &self,
        id: TriggerId,
        now: DateTime<Utc>,
    ) -> Result<BehavioralTrigger, StoreError> {
        let mut state = self.write()?;
        let trigger = state
            .triggers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("trigger {id}")))?;
        trigger.processed_at.get_or_insert(now);
        Ok(trigger.clone())
    }
}

impl AnalyticsStore for InMemoryStore {
    fn record_message_analytics(&self, row: MessageAnalytics) -> Result<(), StoreError> {
        let mut analytics = self.write_analytics()?;
        // Replayed events must not double-count a send.
        if analytics.messages.iter().any(|r| r.message_id == row.message_id) {
            return Ok(());
        }
        analytics.messages.push(row);
        Ok(())
    }

    fn mark_response(
        &self,
        message_id: MessageId,
        latency_minutes: Option<f64>,
    ) -> Result<Option<MessageAnalytics>, StoreError> {
        let mut analytics = self.write_analytics()?;
        let Some(row) = analytics
            .messages
            .iter_mut()
            .find(|r| r.message_id == message_id)
        else {
            return Ok(None);
        };
        if !row.responded {
            row.responded = true;
            row.response_latency_minutes = latency_minutes;
        }
        Ok(Some(row.clone()))
    }

    fn message_analytics(&self) -> Result<Vec<MessageAnalytics>, StoreError> {
        Ok(self.read_analytics()?.messages.clone())
    }

    fn append_pattern(&self, pattern: CommunicationPattern) -> Result<(), StoreError> {
        let mut analytics = self.write_analytics()?;
        if analytics.patterns.iter().any(|p| p.message_id == pattern.message_id) {
            return Ok(());
        }
        analytics.patterns.push(pattern);
        Ok(())
    }

    fn patterns(&self) -> Result<Vec<CommunicationPattern>, StoreError> {
        Ok(self.read_analytics()?.patterns.clone())
    }

    fn record_outcome(&self, outcome: LearningOutcome) -> Result<(), StoreError> {
        self.write_analytics()?.outcomes.push(outcome);
        Ok(())
    }

    fn outcomes(&self) -> Result<Vec<LearningOutcome>, StoreError> {
        Ok(self.read_analytics()?.outcomes.clone())
    }

    fn insert_insight(&self, insight: OptimizationInsight) -> Result<bool, StoreError> {
        let mut analytics = self.write_analytics()?;
        let duplicate = analytics.insights.iter().any(|i| {
            i.insight_type == insight.insight_type && i.recommendation == insight.recommendation
        });
        if duplicate {
            return Ok(false);
        }
        analytics.insights.push(insight);
        Ok(true)
    }

    fn insights(&self) -> Result<Vec<OptimizationInsight>, StoreError> {
        Ok(self.read_analytics()?.insights.clone())
    }

    fn get_insight(&self, id: InsightId) -> Result<Option<OptimizationInsight>, StoreError> {
        Ok(self
            .read_analytics()?
            .insights
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use leadflow_core::{InsightType, StrategyTag};
    use std::sync::Arc;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn lease() -> Duration {
        Duration::minutes(10)
    }

    fn store_with_lead() -> (InMemoryStore, Lead) {
        let store = InMemoryStore::new();
        let lead = Lead::new("Ana", t0()).with_phone("+15550101").opted_in();
        store.insert_lead(lead.clone()).unwrap();
        (store, lead)
    }

    #[test]
    fn second_claim_loses_while_first_is_live() {
        let (store, lead) = store_with_lead();
        let first = store
            .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
            .unwrap();
        assert!(first.is_some());
        let second = store
            .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
            .unwrap();
        assert!(second.is_none());

        // Lapsed leases can be re-taken.
        let later = t0() + Duration::minutes(11);
        assert!(store
            .try_claim(lead.id, DueCondition::InitialContact, later, lease())
            .unwrap()
            .is_some());
    }

    #[test]
    fn claim_rechecks_the_condition() {
        let (store, lead) = store_with_lead();
        store
            .append_message(Message::outbound_human(lead.id, "Hi Ana", t0()))
            .unwrap();
        let claim = store
            .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
            .unwrap();
        assert!(claim.is_none());
    }

    #[test]
    fn failed_first_send_leaves_initial_contact_claimable() {
        let (store, lead) = store_with_lead();
        let attempt = Message::outbound_ai(lead.id, "Hi Ana", t0(), "initial_contact");
        let attempt_id = attempt.id;
        store.append_message(attempt).unwrap();
        store.mark_message_failed(attempt_id, "gateway down").unwrap();

        let claim = store
            .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
            .unwrap();
        assert!(claim.is_some());
    }

    #[test]
    fn advancement_claim_requires_the_same_latest_inbound() {
        let (store, lead) = store_with_lead();
        let inbound = Message::inbound(lead.id, "what's the rate?", t0());
        let inbound_id = inbound.id;
        store.append_message(inbound).unwrap();
        store
            .append_message(Message::outbound_human(
                lead.id,
                "Checking now",
                t0() + Duration::minutes(5),
            ))
            .unwrap();
        let claim = store
            .try_claim(
                lead.id,
                DueCondition::Advancement { inbound_id },
                t0() + Duration::hours(3),
                lease(),
            )
            .unwrap();
        assert!(claim.is_none());
    }

    #[test]
    fn releasing_with_a_stale_token_keeps_the_current_claim() {
        let (store, lead) = store_with_lead();
        let claim = store
            .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
            .unwrap()
            .unwrap();
        store.release_claim(lead.id, ClaimToken::new()).unwrap();
        assert_eq!(store.get_lead(lead.id).unwrap().unwrap().claim, Some(claim));
        store.release_claim(lead.id, claim.token).unwrap();
        assert_eq!(store.get_lead(lead.id).unwrap().unwrap().claim, None);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let (store, lead) = store_with_lead();
        let store = Arc::new(store);
        let winners: usize = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .try_claim(lead.id, DueCondition::InitialContact, t0(), lease())
                        .unwrap()
                        .is_some()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn due_entries_are_earliest_per_unpaused_lead() {
        let (store, lead) = store_with_lead();
        let other = Lead::new("Bo", t0()).opted_in();
        store.insert_lead(other.clone()).unwrap();
        let a1 = ScheduledEntry::new(lead.id, 1, 0, t0(), StrategyTag::FeaturesBenefits);
        let a2 = ScheduledEntry::new(
            lead.id,
            1,
            1,
            t0() + Duration::hours(4),
            StrategyTag::UrgencyScarcity,
        );
        let b1 = ScheduledEntry::new(other.id, 1, 0, t0(), StrategyTag::FeaturesBenefits);
        store
            .insert_schedule(vec![a2.clone(), a1.clone(), b1.clone()])
            .unwrap();

        let due = store.due_entries(t0() + Duration::hours(5)).unwrap();
        assert_eq!(due.len(), 2);
        assert!(due.iter().any(|e| e.id == a1.id));

        store
            .modify_lead(other.id, &mut |l| l.pause_sequence("replied"))
            .unwrap();
        let due = store.due_entries(t0() + Duration::hours(5)).unwrap();
        assert_eq!(due.len(), 1);
        assert!(matches!(
            store.mark_entry_sent(b1.id),
            Err(StoreError::InvalidTransition(_))
        ));
    }

    #[test]
    fn skipped_entries_cannot_be_sent() {
        let (store, lead) = store_with_lead();
        let entry = ScheduledEntry::new(lead.id, 1, 0, t0(), StrategyTag::FeaturesBenefits);
        let id = entry.id;
        store.insert_schedule(vec![entry]).unwrap();
        assert_eq!(store.skip_open_entries(lead.id, "paused").unwrap(), 1);
        assert!(store.mark_entry_sent(id).is_err());
        assert_eq!(store.skip_open_entries(lead.id, "paused").unwrap(), 0);
    }

    #[test]
    fn sent_message_status_is_final() {
        let (store, lead) = store_with_lead();
        let msg = Message::outbound_ai(lead.id, "Hi", t0(), "initial_contact");
        let id = msg.id;
        store.append_message(msg).unwrap();
        assert!(store.mark_message_sent(id, "SM1").unwrap());
        assert!(!store.mark_message_sent(id, "SM1").unwrap());
        assert!(matches!(
            store.mark_message_failed(id, "late"),
            Err(StoreError::InvalidTransition(_))
        ));
    }

    #[test]
    fn identical_insights_are_not_duplicated() {
        let store = InMemoryStore::new();
        let insight = OptimizationInsight::new(InsightType::Timing, "Send at 10:00", t0());
        assert!(store.insert_insight(insight.clone()).unwrap());
        let again = OptimizationInsight::new(InsightType::Timing, "Send at 10:00", t0());
        assert!(!store.insert_insight(again).unwrap());
        assert_eq!(store.insights().unwrap().len(), 1);
        assert!(store.get_insight(insight.id).unwrap().is_some());
    }
}
