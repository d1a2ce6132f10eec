use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use leadflow_core::{
    BehavioralTrigger, Claim, ClaimToken, DueCondition, EngineError, InsightId, Lead, LeadId,
    Message, MessageId, OptimizationInsight, ScheduleEntryId, ScheduledEntry, TriggerId,
};

use super::analytics::{CommunicationPattern, LearningOutcome, MessageAnalytics};

/// Datastore error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// The requested change would break a record invariant (e.g. resending a
    /// skipped entry, changing a sent message).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => EngineError::not_found(what),
            StoreError::InvalidTransition(msg) => EngineError::invariant(msg),
            other => EngineError::store(other.to_string()),
        }
    }
}

/// Lead, conversation, schedule and trigger persistence.
///
/// ## Atomicity
///
/// [`try_claim`](LeadStore::try_claim) is the only cross-record operation that
/// must be atomic: it re-checks the due condition and the absence of a live
/// claim and takes the claim in one conditional update. Durable
/// implementations express it as a single `UPDATE ... WHERE <condition>`.
///
/// All other operations are single-record reads or writes.
pub trait LeadStore: Send + Sync {
    fn insert_lead(&self, lead: Lead) -> Result<(), StoreError>;

    fn get_lead(&self, id: LeadId) -> Result<Option<Lead>, StoreError>;

    /// Every lead, oldest first.
    fn list_leads(&self) -> Result<Vec<Lead>, StoreError>;

    /// Apply `change` to the stored lead and return the result.
    fn modify_lead(
        &self,
        id: LeadId,
        change: &mut dyn FnMut(&mut Lead),
    ) -> Result<Lead, StoreError>;

    /// Take a claim on `lead_id` for `condition`.
    ///
    /// Returns `Ok(None)` when the condition no longer holds or another
    /// worker holds a live claim.
    fn try_claim(
        &self,
        lead_id: LeadId,
        condition: DueCondition,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Claim>, StoreError>;

    /// Release a claim. A stale token (claim lapsed and re-taken) is ignored.
    fn release_claim(&self, lead_id: LeadId, token: ClaimToken) -> Result<(), StoreError>;

    // --- conversation log -------------------------------------------------

    fn append_message(&self, message: Message) -> Result<(), StoreError>;

    fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// The conversation of a lead in chronological order.
    fn messages_for(&self, lead_id: LeadId) -> Result<Vec<Message>, StoreError>;

    /// Returns `false` when the message was already sent with the same
    /// provider id.
    fn mark_message_sent(&self, id: MessageId, provider_id: &str) -> Result<bool, StoreError>;

    fn mark_message_failed(&self, id: MessageId, error: &str) -> Result<(), StoreError>;

    // --- aggressive sequence ----------------------------------------------

    fn insert_schedule(&self, entries: Vec<ScheduledEntry>) -> Result<(), StoreError>;

    fn schedule_for(&self, lead_id: LeadId) -> Result<Vec<ScheduledEntry>, StoreError>;

    /// Open entries with `scheduled_at <= now` whose lead is not paused,
    /// at most one (the earliest) per lead.
    fn due_entries(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledEntry>, StoreError>;

    /// Flip an open entry to sent. Fails when the entry is skipped or its
    /// lead is paused.
    fn mark_entry_sent(&self, id: ScheduleEntryId) -> Result<(), StoreError>;

    fn skip_entry(&self, id: ScheduleEntryId, reason: &str) -> Result<(), StoreError>;

    /// Skip every open entry of a lead; returns how many were voided.
    fn skip_open_entries(&self, lead_id: LeadId, reason: &str) -> Result<usize, StoreError>;

    // --- behavioral triggers ----------------------------------------------

    fn insert_trigger(&self, trigger: BehavioralTrigger) -> Result<(), StoreError>;

    fn triggers_for(&self, lead_id: LeadId) -> Result<Vec<BehavioralTrigger>, StoreError>;

    fn mark_trigger_processed(
        &self,
        id: TriggerId,
        now: DateTime<Utc>,
    ) -> Result<BehavioralTrigger, StoreError>;
}

/// Learning analytics persistence.
pub trait AnalyticsStore: Send + Sync {
    fn record_message_analytics(&self, row: MessageAnalytics) -> Result<(), StoreError>;

    /// Mark the row of `message_id` as answered. Returns the updated row, or
    /// `None` when no row exists (e.g. a human-written message).
    fn mark_response(
        &self,
        message_id: MessageId,
        latency_minutes: Option<f64>,
    ) -> Result<Option<MessageAnalytics>, StoreError>;

    fn message_analytics(&self) -> Result<Vec<MessageAnalytics>, StoreError>;

    fn append_pattern(&self, pattern: CommunicationPattern) -> Result<(), StoreError>;

    fn patterns(&self) -> Result<Vec<CommunicationPattern>, StoreError>;

    fn record_outcome(&self, outcome: LearningOutcome) -> Result<(), StoreError>;

    fn outcomes(&self) -> Result<Vec<LearningOutcome>, StoreError>;

    /// Persist an insight unless one with the same type and recommendation
    /// already exists. Returns whether it was stored.
    fn insert_insight(&self, insight: OptimizationInsight) -> Result<bool, StoreError>;

    fn insights(&self) -> Result<Vec<OptimizationInsight>, StoreError>;

    fn get_insight(&self, id: InsightId) -> Result<Option<OptimizationInsight>, StoreError>;
}
