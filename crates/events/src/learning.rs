//! Learning events: the raw material of the feedback loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_core::{LeadId, MessageId, TriggerId, TriggerType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningEventKind {
    MessageSent,
    ResponseReceived,
    Conversion,
    AppointmentBooked,
    TriggerFired,
}

/// Typed payload per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningPayload {
    MessageSent {
        message_id: MessageId,
        /// Flow that produced the send ("initial_contact", "advancement", ...).
        flow: String,
        /// Template or strategy tag used for the body.
        template: String,
        body_chars: usize,
    },
    ResponseReceived {
        message_id: MessageId,
        /// Most recent outbound message the reply answers, if any.
        answered_message_id: Option<MessageId>,
        latency_minutes: Option<f64>,
        /// Lexicon sentiment of the reply in \[-1, 1\].
        sentiment: f64,
    },
    Conversion {
        value: Option<f64>,
    },
    AppointmentBooked {
        appointment_at: Option<DateTime<Utc>>,
    },
    TriggerFired {
        trigger_id: TriggerId,
        trigger_type: TriggerType,
        confidence: f64,
    },
}

/// A transient learning event (queued, then persisted as analytics rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub id: Uuid,
    pub lead_id: LeadId,
    pub payload: LearningPayload,
    pub timestamp: DateTime<Utc>,
}

impl LearningEvent {
    pub fn new(lead_id: LeadId, payload: LearningPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            lead_id,
            payload,
            timestamp,
        }
    }

    pub fn kind(&self) -> LearningEventKind {
        match self.payload {
            LearningPayload::MessageSent { .. } => LearningEventKind::MessageSent,
            LearningPayload::ResponseReceived { .. } => LearningEventKind::ResponseReceived,
            LearningPayload::Conversion { .. } => LearningEventKind::Conversion,
            LearningPayload::AppointmentBooked { .. } => LearningEventKind::AppointmentBooked,
            LearningPayload::TriggerFired { .. } => LearningEventKind::TriggerFired,
        }
    }

    /// Stable event name, e.g. for log fields.
    pub fn event_type(&self) -> &'static str {
        match self.kind() {
            LearningEventKind::MessageSent => "learning.message_sent",
            LearningEventKind::ResponseReceived => "learning.response_received",
            LearningEventKind::Conversion => "learning.conversion",
            LearningEventKind::AppointmentBooked => "learning.appointment_booked",
            LearningEventKind::TriggerFired => "learning.trigger_fired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_payload() {
        let event = LearningEvent::new(
            LeadId::new(),
            LearningPayload::Conversion { value: Some(41_000.0) },
            Utc::now(),
        );
        assert_eq!(event.kind(), LearningEventKind::Conversion);
        assert_eq!(event.event_type(), "learning.conversion");
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = LearningPayload::AppointmentBooked { appointment_at: None };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "appointment_booked");
    }
}
