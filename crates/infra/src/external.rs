//! External collaborators: text generation and the messaging gateway.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use leadflow_core::LeadId;

use crate::compliance::normalize_number;

/// Content request handed to a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub lead_id: LeadId,
    pub first_name: String,
    pub vehicle: Option<String>,
    /// Flow asking for content ("initial_contact", "advancement", ...).
    pub flow: String,
    /// Strategy or template tag.
    pub template: String,
    /// Guidance for the generator (tone, topic, hints).
    pub instructions: String,
    /// Template draft; used verbatim when generation fails.
    pub draft: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generator rejected request: {0}")]
    Rejected(String),
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMessage, GenerationError>;
}

/// Generator that returns the template draft unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TextGenerator for TemplateGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMessage, GenerationError> {
        Ok(GeneratedMessage {
            text: request.draft.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway rejected message: {0}")]
    Rejected(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Outbound SMS transport.
///
/// `correlation_id` is an idempotency key: a gateway that sees the same key
/// twice must not deliver twice.
pub trait MessagingGateway: Send + Sync {
    fn send(&self, to: &str, body: &str, correlation_id: Uuid)
        -> Result<GatewayReceipt, GatewayError>;
}

/// A message accepted by [`InMemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub to: String,
    pub body: String,
    pub correlation_id: Uuid,
    pub provider_id: String,
}

#[derive(Debug, Default)]
struct Outbox {
    sent: Vec<SentSms>,
    by_correlation: HashMap<Uuid, String>,
    failing: HashSet<String>,
    fail_all: bool,
}

/// Recording gateway for tests/dev. Numbers can be marked as failing.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    outbox: Mutex<Outbox>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_number(&self, number: &str) {
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.failing.insert(normalize_number(number));
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.fail_all = unavailable;
        }
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.outbox.lock().map(|o| o.sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, number: &str) -> Vec<SentSms> {
        let number = normalize_number(number);
        self.sent()
            .into_iter()
            .filter(|s| normalize_number(&s.to) == number)
            .collect()
    }
}

impl MessagingGateway for InMemoryGateway {
    fn send(
        &self,
        to: &str,
        body: &str,
        correlation_id: Uuid,
    ) -> Result<GatewayReceipt, GatewayError> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| GatewayError::Unavailable("outbox lock poisoned".into()))?;

        if outbox.fail_all {
            return Err(GatewayError::Unavailable("gateway offline".into()));
        }
        if outbox.failing.contains(&normalize_number(to)) {
            return Err(GatewayError::Rejected(format!("undeliverable number {to}")));
        }
        if let Some(provider_id) = outbox.by_correlation.get(&correlation_id) {
            return Ok(GatewayReceipt {
                provider_id: provider_id.clone(),
            });
        }

        let provider_id = format!("SM{:06}", outbox.sent.len() + 1);
        outbox.by_correlation.insert(correlation_id, provider_id.clone());
        outbox.sent.push(SentSms {
            to: to.to_string(),
            body: body.to_string(),
            correlation_id,
            provider_id: provider_id.clone(),
        });
        Ok(GatewayReceipt { provider_id })
    }
}
