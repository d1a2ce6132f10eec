//! Conversation messages (append-only log).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::id::{LeadId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// A single inbound or outbound message.
///
/// Once `Sent`, a message is immutable: `mark_sent` becomes an idempotent no-op
/// and `mark_failed` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub lead_id: LeadId,
    pub direction: Direction,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub ai_generated: bool,
    pub delivery_status: DeliveryStatus,
    pub error: Option<String>,
    /// Gateway message id once accepted.
    pub provider_id: Option<String>,
    /// Idempotency key handed to the gateway and the delivery worker.
    pub correlation_id: Option<Uuid>,
    /// Template / strategy tag that produced the body (analytics).
    pub template: Option<String>,
}

impl Message {
    /// A reply received from the customer.
    pub fn inbound(lead_id: LeadId, body: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            lead_id,
            direction: Direction::In,
            body: body.into(),
            sent_at: at,
            ai_generated: false,
            delivery_status: DeliveryStatus::Sent,
            error: None,
            provider_id: None,
            correlation_id: None,
            template: None,
        }
    }

    /// An AI-generated outbound message awaiting dispatch.
    pub fn outbound_ai(
        lead_id: LeadId,
        body: impl Into<String>,
        at: DateTime<Utc>,
        template: impl Into<String>,
    ) -> Self {
        let id = MessageId::new();
        Self {
            id,
            lead_id,
            direction: Direction::Out,
            body: body.into(),
            sent_at: at,
            ai_generated: true,
            delivery_status: DeliveryStatus::Pending,
            error: None,
            provider_id: None,
            correlation_id: Some(*id.as_uuid()),
            template: Some(template.into()),
        }
    }

    /// An outbound message written by a salesperson (already delivered).
    pub fn outbound_human(lead_id: LeadId, body: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            lead_id,
            direction: Direction::Out,
            body: body.into(),
            sent_at: at,
            ai_generated: false,
            delivery_status: DeliveryStatus::Sent,
            error: None,
            provider_id: None,
            correlation_id: None,
            template: None,
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::In
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Out
    }

    /// An outbound message that was, or may still be, delivered. Failed sends
    /// do not count as having contacted the customer.
    pub fn reached_customer(&self) -> bool {
        self.is_outbound() && self.delivery_status != DeliveryStatus::Failed
    }

    /// Counts toward the AI frequency cap (pending or sent AI outbound).
    pub fn counts_toward_frequency(&self) -> bool {
        self.is_outbound() && self.ai_generated && self.delivery_status != DeliveryStatus::Failed
    }

    /// Mark as sent. Returns `Ok(false)` when the message was already sent
    /// with the same provider id (duplicate acknowledgement).
    pub fn mark_sent(&mut self, provider_id: impl Into<String>) -> EngineResult<bool> {
        let provider_id = provider_id.into();
        match self.delivery_status {
            DeliveryStatus::Pending => {
                self.delivery_status = DeliveryStatus::Sent;
                self.provider_id = Some(provider_id);
                self.error = None;
                Ok(true)
            }
            DeliveryStatus::Sent if self.provider_id.as_deref() == Some(provider_id.as_str()) => {
                Ok(false)
            }
            DeliveryStatus::Sent => Err(EngineError::invariant(format!(
                "message {} already sent with a different provider id",
                self.id
            ))),
            DeliveryStatus::Failed => Err(EngineError::invariant(format!(
                "message {} already failed",
                self.id
            ))),
        }
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> EngineResult<()> {
        if self.delivery_status == DeliveryStatus::Sent {
            return Err(EngineError::invariant(format!(
                "message {} is sent and immutable",
                self.id
            )));
        }
        self.delivery_status = DeliveryStatus::Failed;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_outbound_starts_pending_with_correlation_id() {
        let msg = Message::outbound_ai(LeadId::new(), "Hi!", Utc::now(), "initial_contact");
        assert_eq!(msg.delivery_status, DeliveryStatus::Pending);
        assert_eq!(msg.correlation_id, Some(*msg.id.as_uuid()));
        assert!(msg.counts_toward_frequency());
    }

    #[test]
    fn mark_sent_is_idempotent_for_same_provider_id() {
        let mut msg = Message::outbound_ai(LeadId::new(), "Hi!", Utc::now(), "t");
        assert!(msg.mark_sent("SM1").unwrap());
        assert!(!msg.mark_sent("SM1").unwrap());
        assert!(msg.mark_sent("SM2").is_err());
    }

    #[test]
    fn sent_messages_cannot_fail() {
        let mut msg = Message::outbound_ai(LeadId::new(), "Hi!", Utc::now(), "t");
        msg.mark_sent("SM1").unwrap();
        assert!(matches!(
            msg.mark_failed("late error"),
            Err(EngineError::InvariantViolation(_))
        ));
        assert_eq!(msg.delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn failed_ai_messages_do_not_count_toward_frequency() {
        let mut msg = Message::outbound_ai(LeadId::new(), "Hi!", Utc::now(), "t");
        msg.mark_failed("gateway timeout").unwrap();
        assert!(!msg.counts_toward_frequency());
        assert_eq!(msg.error.as_deref(), Some("gateway timeout"));
    }

    #[test]
    fn failed_sends_have_not_reached_the_customer() {
        let lead = LeadId::new();
        let mut msg = Message::outbound_ai(lead, "Hi!", Utc::now(), "t");
        assert!(msg.reached_customer());
        msg.mark_failed("gateway timeout").unwrap();
        assert!(!msg.reached_customer());
        assert!(Message::outbound_human(lead, "Call me", Utc::now()).reached_customer());
        assert!(!Message::inbound(lead, "ok", Utc::now()).reached_customer());
    }
}
