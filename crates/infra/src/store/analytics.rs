//! Analytics rows written by the learning feedback loop.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use leadflow_core::{LeadId, MessageId};

/// One row per outbound AI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalytics {
    pub message_id: MessageId,
    pub lead_id: LeadId,
    pub flow: String,
    pub template: String,
    /// Dealership-local hour of the send (0..=23).
    pub local_hour: u32,
    pub weekday: Weekday,
    pub body_chars: usize,
    pub sent_at: DateTime<Utc>,
    pub responded: bool,
    pub response_latency_minutes: Option<f64>,
}

/// One row per inbound reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationPattern {
    pub lead_id: LeadId,
    pub message_id: MessageId,
    pub answered_message_id: Option<MessageId>,
    pub latency_minutes: Option<f64>,
    pub sentiment: f64,
    /// Dealership-local hour of the message that was answered, if known.
    pub answered_local_hour: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Conversion,
    AppointmentBooked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningOutcome {
    pub lead_id: LeadId,
    pub kind: OutcomeKind,
    pub value: Option<f64>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}
