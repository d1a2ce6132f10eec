//! Lead record and its AI-engagement state.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::id::{ClaimToken, LeadId, MessageId, ScheduleEntryId};

/// AI engagement stage of a lead.
///
/// `uncontacted → initial_sent → (engaged | aggressive_unresponsive) → sequence_paused | takeover_executed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStage {
    Uncontacted,
    InitialSent,
    Engaged,
    AggressiveUnresponsive,
    SequencePaused,
    TakeoverExecuted,
}

impl AiStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiStage::Uncontacted => "uncontacted",
            AiStage::InitialSent => "initial_sent",
            AiStage::Engaged => "engaged",
            AiStage::AggressiveUnresponsive => "aggressive_unresponsive",
            AiStage::SequencePaused => "sequence_paused",
            AiStage::TakeoverExecuted => "takeover_executed",
        }
    }
}

/// Vehicle interest as captured by the CRM plus the parsed parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleOfInterest {
    /// Free text as entered ("2024 Silverado 1500 crew cab").
    pub raw: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
}

impl VehicleOfInterest {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Default::default()
        }
    }

    /// Short human label, e.g. "2024 Chevrolet Silverado".
    pub fn label(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.year.map(|y| y.to_string()),
            self.make.clone(),
            self.model.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            self.raw.clone().filter(|r| !r.trim().is_empty())
        } else {
            Some(parts.join(" "))
        }
    }
}

/// The due condition a claim was taken for.
///
/// Stores re-check the condition inside the same atomic update that takes the
/// claim, so a lead is never dispatched twice for the same condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DueCondition {
    /// Opted in and no outbound message exists yet.
    InitialContact,
    /// `next_send_at` has elapsed.
    FollowUp,
    /// The given inbound message is still the latest, unanswered message.
    Advancement { inbound_id: MessageId },
    /// The given aggressive-sequence entry is due and unsent.
    ScheduledEntry { entry_id: ScheduleEntryId },
    /// A human failed to answer before `response_deadline`.
    Takeover,
}

impl DueCondition {
    pub fn label(&self) -> &'static str {
        match self {
            DueCondition::InitialContact => "initial_contact",
            DueCondition::FollowUp => "follow_up",
            DueCondition::Advancement { .. } => "advancement",
            DueCondition::ScheduledEntry { .. } => "scheduled_entry",
            DueCondition::Takeover => "takeover",
        }
    }
}

/// An in-flight claim on a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub token: ClaimToken,
    pub condition: DueCondition,
    pub claimed_at: DateTime<Utc>,
    /// Claims lapse after their lease so a crashed worker cannot wedge a lead.
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(condition: DueCondition, now: DateTime<Utc>, lease: Duration) -> Self {
        Self {
            token: ClaimToken::new(),
            condition,
            claimed_at: now,
            expires_at: now + lease,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A prospective customer with AI-engagement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub first_name: String,
    pub phone: Option<String>,
    pub vehicle: VehicleOfInterest,

    pub ai_opt_in: bool,
    pub ai_stage: AiStage,

    pub sequence_paused: bool,
    pub pause_reason: Option<String>,

    pub next_send_at: Option<DateTime<Utc>>,

    /// AI sends on `counter_day` (dealership local date).
    pub messages_sent_today: u32,
    pub counter_day: Option<NaiveDate>,
    pub messages_sent_total: u32,
    pub last_sent_at: Option<DateTime<Utc>>,

    pub pending_human_response: bool,
    pub response_deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub claim: Option<Claim>,
}

impl Lead {
    pub fn new(first_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LeadId::new(),
            first_name: first_name.into(),
            phone: None,
            vehicle: VehicleOfInterest::default(),
            ai_opt_in: false,
            ai_stage: AiStage::Uncontacted,
            sequence_paused: false,
            pause_reason: None,
            next_send_at: None,
            messages_sent_today: 0,
            counter_day: None,
            messages_sent_total: 0,
            last_sent_at: None,
            pending_human_response: false,
            response_deadline: None,
            created_at,
            claim: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_vehicle_interest(mut self, raw: impl Into<String>) -> Self {
        self.vehicle = VehicleOfInterest::from_raw(raw);
        self
    }

    pub fn opted_in(mut self) -> Self {
        self.ai_opt_in = true;
        self
    }

    /// The destination number, or a `Validation` error when missing.
    pub fn require_phone(&self) -> EngineResult<&str> {
        match self.phone.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Ok(p),
            _ => Err(EngineError::validation(format!(
                "lead {} has no phone number",
                self.id
            ))),
        }
    }

    pub fn has_live_claim(&self, now: DateTime<Utc>) -> bool {
        self.claim.is_some_and(|c| c.is_live(now))
    }

    /// Autonomous sends are suppressed while a human owes the lead an answer.
    pub fn autonomous_sends_allowed(&self) -> bool {
        self.ai_opt_in && !self.pending_human_response
    }

    pub fn follow_up_due(&self, now: DateTime<Utc>) -> bool {
        self.autonomous_sends_allowed() && self.next_send_at.is_some_and(|at| at <= now)
    }

    pub fn takeover_due(&self, now: DateTime<Utc>) -> bool {
        self.pending_human_response && self.response_deadline.is_some_and(|d| now >= d)
    }

    /// Bookkeeping after a successful AI send.
    ///
    /// `messages_sent_today` resets when the dealership-local date changes.
    pub fn record_ai_send(&mut self, now: DateTime<Utc>, local_offset: FixedOffset) {
        let today = now.with_timezone(&local_offset).date_naive();
        if self.counter_day != Some(today) {
            self.counter_day = Some(today);
            self.messages_sent_today = 0;
        }
        self.messages_sent_today += 1;
        self.messages_sent_total += 1;
        self.last_sent_at = Some(now);
    }

    pub fn pause_sequence(&mut self, reason: impl Into<String>) {
        self.sequence_paused = true;
        self.pause_reason = Some(reason.into());
        self.ai_stage = AiStage::SequencePaused;
    }

    pub fn resume_sequence(&mut self) {
        self.sequence_paused = false;
        self.pause_reason = None;
        if self.ai_stage == AiStage::SequencePaused {
            self.ai_stage = AiStage::AggressiveUnresponsive;
        }
    }

    pub fn request_human_response(&mut self, deadline: DateTime<Utc>) {
        self.pending_human_response = true;
        self.response_deadline = Some(deadline);
    }

    /// Clear the pending-human state and ask for an immediate AI follow-up.
    pub fn execute_takeover(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.takeover_due(now) {
            return Err(EngineError::noop(format!(
                "lead {} has no lapsed human response deadline",
                self.id
            )));
        }
        self.pending_human_response = false;
        self.response_deadline = None;
        self.ai_stage = AiStage::TakeoverExecuted;
        self.next_send_at = Some(now);
        Ok(())
    }
}
