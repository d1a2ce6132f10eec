//! Claim, gate, persist, send.
//!
//! One dispatch per claimed lead:
//! claim -> plan -> frequency guard -> compliance gate -> persist pending
//! message -> gateway -> enqueue delivery finalisation -> lead bookkeeping.
//! The claim is released whatever the outcome.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use leadflow_core::{EngineError, EngineResult, Lead, LeadId, Message, MessageId};

use crate::compliance::ComplianceGate;
use crate::config::EngineConfig;
use crate::external::{GenerationRequest, MessagingGateway, TextGenerator};
use crate::jobs::{Job, JobKind, JobStore};
use crate::store::LeadStore;

use super::{Due, Flow, FlowAction, FlowContext, FlowKind, NextSend, Outbound, chrono_duration};

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent {
        lead_id: LeadId,
        message_id: MessageId,
        flow: FlowKind,
        template: String,
        body_chars: usize,
    },
    TookOver {
        lead_id: LeadId,
    },
    Paused {
        lead_id: LeadId,
        skipped_entries: usize,
    },
}

pub struct Dispatcher<S: LeadStore, J: JobStore> {
    store: Arc<S>,
    jobs: Arc<J>,
    gate: ComplianceGate,
    generator: Arc<dyn TextGenerator>,
    gateway: Arc<dyn MessagingGateway>,
    config: EngineConfig,
}

impl<S: LeadStore, J: JobStore> Dispatcher<S, J> {
    pub fn new(
        store: Arc<S>,
        jobs: Arc<J>,
        gate: ComplianceGate,
        generator: Arc<dyn TextGenerator>,
        gateway: Arc<dyn MessagingGateway>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            gate,
            generator,
            gateway,
            config,
        }
    }

    pub fn gate(&self) -> &ComplianceGate {
        &self.gate
    }

    /// Claim `due.lead_id` and run `flow` for it.
    ///
    /// Losing the claim race is a `SchedulingNoOp`.
    pub fn dispatch(
        &self,
        flow: &dyn Flow,
        ctx: &FlowContext<'_>,
        due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchOutcome> {
        let lease = chrono_duration(self.config.claim_lease);
        let Some(claim) = self.store.try_claim(due.lead_id, due.condition, now, lease)? else {
            return Err(EngineError::noop(format!(
                "lead {} already claimed or no longer due for {}",
                due.lead_id,
                due.condition.label()
            )));
        };

        let result = self.attempt(flow, ctx, due, now);

        if let Err(e) = self.store.release_claim(due.lead_id, claim.token) {
            warn!(lead_id = %due.lead_id, error = %e, "failed to release claim");
        }
        result
    }

    fn attempt(
        &self,
        flow: &dyn Flow,
        ctx: &FlowContext<'_>,
        due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchOutcome> {
        let lead = self
            .store
            .get_lead(due.lead_id)?
            .ok_or_else(|| EngineError::not_found(format!("lead {}", due.lead_id)))?;
        let transcript = self.store.messages_for(lead.id)?;

        match flow.plan(ctx, &lead, &transcript, due, now)? {
            FlowAction::ExecuteTakeover => {
                let mut outcome = Ok(());
                self.store
                    .modify_lead(lead.id, &mut |l| outcome = l.execute_takeover(now))?;
                outcome?;
                Ok(DispatchOutcome::TookOver { lead_id: lead.id })
            }
            FlowAction::PauseSequence { reason } => {
                self.store
                    .modify_lead(lead.id, &mut |l| l.pause_sequence(reason.clone()))?;
                let skipped_entries = self.store.skip_open_entries(lead.id, &reason)?;
                Ok(DispatchOutcome::Paused {
                    lead_id: lead.id,
                    skipped_entries,
                })
            }
            FlowAction::Send(outbound) => self.send(flow.kind(), &lead, &transcript, outbound, now),
        }
    }

    fn send(
        &self,
        kind: FlowKind,
        lead: &Lead,
        transcript: &[Message],
        outbound: Outbound,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchOutcome> {
        let phone = lead.require_phone()?;

        let window_start = now - Duration::hours(24);
        let recent = transcript
            .iter()
            .filter(|m| m.counts_toward_frequency() && m.sent_at > window_start)
            .count();
        if recent as u64 >= u64::from(self.config.max_ai_messages_per_24h) {
            if let Some(entry) = outbound.entry {
                self.store.skip_entry(entry, "frequency_cap")?;
            }
            return Err(EngineError::noop(format!(
                "lead {} reached {} AI messages in 24h",
                lead.id, recent
            )));
        }

        self.gate.check(lead, phone, now)?;

        let body = self.generate(kind, lead, &outbound)?;
        let template = outbound.template.clone();
        let message = Message::outbound_ai(lead.id, body.clone(), now, template.clone());
        let message_id = message.id;
        let correlation_id = message.correlation_id.unwrap_or(*message_id.as_uuid());
        self.store.append_message(message)?;

        let receipt = match self.gateway.send(phone, &body, correlation_id) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.store.mark_message_failed(message_id, &e.to_string())?;
                let suppressed = self.gate.delivery_failed(phone, now)?;
                return Err(EngineError::delivery(format!(
                    "{e}{}",
                    if suppressed { "; number auto-suppressed" } else { "" }
                )));
            }
        };

        self.jobs
            .enqueue(Job::new(
                JobKind::finalize_delivery(message_id, receipt.provider_id),
                correlation_id,
                now,
            ))
            .map_err(|e| EngineError::store(e.to_string()))?;
        self.gate.delivered(phone, now)?;

        let offset = self.config.local_offset();
        self.store.modify_lead(lead.id, &mut |l| {
            l.record_ai_send(now, offset);
            if let Some(stage) = outbound.stage {
                l.ai_stage = stage;
            }
            match outbound.next_send {
                NextSend::Keep => {}
                NextSend::Clear => l.next_send_at = None,
                NextSend::At(at) => l.next_send_at = Some(at),
            }
        })?;
        if let Some(entry) = outbound.entry {
            self.store.mark_entry_sent(entry)?;
        }

        Ok(DispatchOutcome::Sent {
            lead_id: lead.id,
            message_id,
            flow: kind,
            template,
            body_chars: body.chars().count(),
        })
    }

    /// Generated text, or the template draft when generation fails and
    /// fallback is enabled.
    fn generate(&self, kind: FlowKind, lead: &Lead, outbound: &Outbound) -> EngineResult<String> {
        let request = GenerationRequest {
            lead_id: lead.id,
            first_name: lead.first_name.clone(),
            vehicle: lead.vehicle.label(),
            flow: kind.as_str().to_string(),
            template: outbound.template.clone(),
            instructions: outbound.instructions.clone(),
            draft: outbound.draft.clone(),
        };

        let failure = match self.generator.generate(&request) {
            Ok(generated) if !generated.text.trim().is_empty() => return Ok(generated.text),
            Ok(_) => "generator returned empty text".to_string(),
            Err(e) => e.to_string(),
        };

        if self.config.template_fallback && !outbound.draft.trim().is_empty() {
            debug!(lead_id = %lead.id, flow = %kind, error = %failure, "using template fallback");
            Ok(outbound.draft.clone())
        } else {
            Err(EngineError::generation(failure))
        }
    }
}
