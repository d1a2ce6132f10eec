//! Sweep entrypoint and operator operations.
//!
//! [`LeadEngine`] composes the datastore, the job queue, the event bus and the
//! external collaborators. An external scheduler calls
//! [`process`](LeadEngine::process) periodically; every call is one bounded
//! sweep:
//!
//! ```text
//! process(now)
//!   ↓
//! 1. Evaluate behavioral triggers for every lead (persist + publish)
//!   ↓
//! 2. Load success profiles of converted leads (prediction similarity)
//!   ↓
//! 3. For each flow in FlowKind order: due leads → claim → plan → gate → send
//!   ↓
//! 4. Publish a learning event per send
//!   ↓
//! 5. Finalize deliveries (single consumer of the job queue)
//!   ↓
//! 6. Report to the SweepMonitor
//! ```
//!
//! Failures are scoped to a lead: they are logged, counted in the
//! [`SweepReport`] and the sweep moves on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use leadflow_ai::{
    ConversationAnalysis, ConversationAnalyzer, EngagementFactors, Prediction, PredictiveScorer,
    StrategyRegistry, SuccessProfile, TriggerEngine, text,
};
use leadflow_core::{
    AiStage, BehavioralTrigger, EngineError, EngineResult, Lead, LeadId, Message, MessageId,
    TriggerId,
};
use leadflow_events::{EventBus, LearningEvent, LearningPayload};
use leadflow_observability::{SweepMonitor, SweepSample};

use crate::compliance::{ComplianceGate, ComplianceService};
use crate::config::EngineConfig;
use crate::external::{MessagingGateway, TextGenerator};
use crate::jobs::{DeliveryRun, DeliveryWorker, JobStore};
use crate::scheduler::{
    DispatchOutcome, Dispatcher, FlowContext, FlowKind, FlowRegistry, aggressive_plan,
    chrono_duration,
};
use crate::store::{AnalyticsStore, LeadStore, OutcomeKind};

/// Converted leads sampled for prediction similarity.
const SUCCESS_SAMPLE: usize = 50;

/// A recorded business outcome for a lead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeadOutcome {
    Conversion { value: Option<f64> },
    AppointmentBooked { appointment_at: Option<DateTime<Utc>> },
}

/// A per-lead failure inside a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadFailure {
    pub lead_id: Option<LeadId>,
    pub flow: Option<FlowKind>,
    pub error: String,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub now: Option<DateTime<Utc>>,
    pub triggers_fired: usize,
    /// Sends per flow.
    pub sent: BTreeMap<FlowKind, usize>,
    pub sent_messages: Vec<MessageId>,
    pub takeovers: usize,
    pub paused: usize,
    pub noops: usize,
    pub compliance_blocked: usize,
    pub failures: Vec<LeadFailure>,
    pub deliveries: DeliveryRun,
    #[serde(skip)]
    pub elapsed: std::time::Duration,
}

impl SweepReport {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Some(now),
            ..Self::default()
        }
    }

    pub fn total_sent(&self) -> usize {
        self.sent.values().sum()
    }

    pub fn sent_by(&self, kind: FlowKind) -> usize {
        self.sent.get(&kind).copied().unwrap_or(0)
    }

    fn fail(&mut self, lead_id: Option<LeadId>, flow: Option<FlowKind>, err: &EngineError) {
        self.failures.push(LeadFailure {
            lead_id,
            flow,
            error: err.to_string(),
        });
    }

    fn sample(&self) -> SweepSample {
        SweepSample {
            started_at: self.now,
            elapsed: self.elapsed,
            triggers_fired: self.triggers_fired,
            sent: self.total_sent(),
            takeovers: self.takeovers,
            paused: self.paused,
            noops: self.noops,
            compliance_blocked: self.compliance_blocked,
            failures: self.failures.len(),
            deliveries_finalized: self.deliveries.finalized,
        }
    }
}

/// The lead engagement engine.
pub struct LeadEngine<S, J, B>
where
    S: LeadStore + AnalyticsStore + 'static,
    J: JobStore + 'static,
    B: EventBus<LearningEvent>,
{
    store: Arc<S>,
    bus: B,
    config: EngineConfig,
    analyzer: ConversationAnalyzer,
    scorer: PredictiveScorer,
    triggers: TriggerEngine,
    strategies: StrategyRegistry,
    flows: FlowRegistry,
    dispatcher: Dispatcher<S, J>,
    delivery: DeliveryWorker<J, S>,
    monitor: Option<Arc<SweepMonitor>>,
}

impl<S, J, B> LeadEngine<S, J, B>
where
    S: LeadStore + AnalyticsStore + 'static,
    J: JobStore + 'static,
    B: EventBus<LearningEvent>,
{
    pub fn new(
        store: Arc<S>,
        jobs: Arc<J>,
        bus: B,
        compliance: Arc<dyn ComplianceService>,
        generator: Arc<dyn TextGenerator>,
        gateway: Arc<dyn MessagingGateway>,
        config: EngineConfig,
    ) -> Self {
        let offset = config.local_offset();
        let gate = ComplianceGate::new(
            compliance,
            chrono_duration(config.rate_limit_window),
            config.rate_limit_max_sends,
            config.auto_suppress_after_failures,
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&jobs),
            gate,
            generator,
            gateway,
            config.clone(),
        );
        let delivery = DeliveryWorker::new(jobs, Arc::clone(&store));
        let triggers =
            TriggerEngine::standard().with_cooldown(config.trigger_cooldown.map(chrono_duration));

        Self {
            store,
            bus,
            analyzer: ConversationAnalyzer::new(),
            scorer: PredictiveScorer::new(offset),
            triggers,
            strategies: StrategyRegistry::standard(),
            flows: FlowRegistry::standard(),
            dispatcher,
            delivery,
            monitor: None,
            config,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<SweepMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_flows(mut self, flows: FlowRegistry) -> Self {
        self.flows = flows;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerEngine) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The delivery worker, e.g. to run it on its own thread instead of at
    /// the end of each sweep.
    pub fn delivery(&self) -> &DeliveryWorker<J, S> {
        &self.delivery
    }

    // --- sweep -------------------------------------------------------------

    /// Run one sweep at `now`.
    pub fn process(&self, now: DateTime<Utc>) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::new(now);

        self.fire_triggers(now, &mut report);

        let successful = self.success_profiles().unwrap_or_else(|e| {
            warn!(error = %e, "success profiles unavailable; predicting without them");
            Vec::new()
        });
        let ctx = FlowContext {
            store: self.store.as_ref(),
            config: &self.config,
            local_offset: self.config.local_offset(),
            analyzer: &self.analyzer,
            scorer: &self.scorer,
            strategies: &self.strategies,
            successful: &successful,
        };

        let mut pace = false;
        for flow in self.flows.iter() {
            let kind = flow.kind();
            let due = match flow.due(&ctx, now) {
                Ok(due) => due,
                Err(e) => {
                    error!(flow = %kind, error = %e, "due-work query failed");
                    report.fail(None, Some(kind), &e);
                    continue;
                }
            };

            for item in due {
                if pace && !self.config.send_pacing.is_zero() {
                    std::thread::sleep(self.config.send_pacing);
                }
                pace = false;

                match self.dispatcher.dispatch(flow, &ctx, &item, now) {
                    Ok(outcome) => pace = self.on_dispatched(outcome, now, &mut report),
                    Err(e) => self.on_failed(item.lead_id, kind, e, &mut report),
                }
            }
        }

        match self.delivery.run_pending(now) {
            Ok(run) => report.deliveries = run,
            Err(e) => {
                error!(error = %e, "delivery finalisation failed");
                report.fail(None, None, &EngineError::store(e.to_string()));
            }
        }

        report.elapsed = started.elapsed();
        if let Some(monitor) = &self.monitor {
            monitor.record(&report.sample());
        }
        report
    }

    fn fire_triggers(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let leads = match self.store.list_leads() {
            Ok(leads) => leads,
            Err(e) => {
                error!(error = %e, "trigger evaluation skipped: cannot list leads");
                report.fail(None, None, &EngineError::from(e));
                return;
            }
        };

        for lead in leads {
            match self.evaluate_triggers(&lead, now) {
                Ok(fired) => report.triggers_fired += fired,
                Err(e) => {
                    warn!(lead_id = %lead.id, error = %e, "trigger evaluation failed");
                    report.fail(Some(lead.id), None, &e);
                }
            }
        }
    }

    fn evaluate_triggers(&self, lead: &Lead, now: DateTime<Utc>) -> EngineResult<usize> {
        let transcript = self.store.messages_for(lead.id)?;
        let history = self.store.triggers_for(lead.id)?;
        let fired = self.triggers.evaluate(lead, &transcript, &history, now);
        let count = fired.len();

        for trigger in fired {
            debug!(
                lead_id = %lead.id,
                trigger_type = trigger.trigger_type.as_str(),
                confidence = trigger.confidence,
                "behavioral trigger fired"
            );
            let payload = LearningPayload::TriggerFired {
                trigger_id: trigger.id,
                trigger_type: trigger.trigger_type,
                confidence: trigger.confidence,
            };
            self.store.insert_trigger(trigger)?;
            self.publish(LearningEvent::new(lead.id, payload, now));
        }
        Ok(count)
    }

    fn success_profiles(&self) -> EngineResult<Vec<SuccessProfile>> {
        let mut profiles = Vec::new();
        let outcomes = self.store.outcomes()?;
        for outcome in outcomes
            .iter()
            .rev()
            .filter(|o| o.kind == OutcomeKind::Conversion)
            .take(SUCCESS_SAMPLE)
        {
            let Some(lead) = self.store.get_lead(outcome.lead_id)? else {
                continue;
            };
            let transcript = self.store.messages_for(lead.id)?;
            let factors = EngagementFactors::from_conversation(&lead, &transcript, outcome.recorded_at);
            profiles.push(SuccessProfile::from(&factors));
        }
        Ok(profiles)
    }

    /// Returns whether the next dispatch must be paced.
    fn on_dispatched(
        &self,
        outcome: DispatchOutcome,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> bool {
        match outcome {
            DispatchOutcome::Sent {
                lead_id,
                message_id,
                flow,
                template,
                body_chars,
            } => {
                info!(lead_id = %lead_id, flow = %flow, template = %template, "message dispatched");
                *report.sent.entry(flow).or_default() += 1;
                report.sent_messages.push(message_id);
                self.publish(LearningEvent::new(
                    lead_id,
                    LearningPayload::MessageSent {
                        message_id,
                        flow: flow.as_str().to_string(),
                        template,
                        body_chars,
                    },
                    now,
                ));
                true
            }
            DispatchOutcome::TookOver { lead_id } => {
                info!(lead_id = %lead_id, "AI takeover executed");
                report.takeovers += 1;
                false
            }
            DispatchOutcome::Paused {
                lead_id,
                skipped_entries,
            } => {
                info!(lead_id = %lead_id, skipped_entries, "aggressive sequence paused by inbound");
                report.paused += 1;
                false
            }
        }
    }

    fn on_failed(&self, lead_id: LeadId, flow: FlowKind, err: EngineError, report: &mut SweepReport) {
        match &err {
            EngineError::SchedulingNoOp(reason) => {
                debug!(lead_id = %lead_id, flow = %flow, reason = %reason, "nothing to do");
                report.noops += 1;
            }
            // The gate already logged it under the compliance target.
            EngineError::ComplianceBlocked { .. } => {
                report.compliance_blocked += 1;
            }
            EngineError::Validation(_) | EngineError::NotFound(_) => {
                warn!(lead_id = %lead_id, flow = %flow, error = %err, "lead skipped");
                report.fail(Some(lead_id), Some(flow), &err);
            }
            _ => {
                error!(lead_id = %lead_id, flow = %flow, error = %err, "dispatch failed");
                report.fail(Some(lead_id), Some(flow), &err);
            }
        }
    }

    fn publish(&self, event: LearningEvent) {
        let event_type = event.event_type();
        let lead_id = event.lead_id;
        if let Err(err) = self.bus.publish(event) {
            warn!(lead_id = %lead_id, event_type, error = ?err, "learning event not published");
        }
    }

    // --- lead intake and conversation ----------------------------------------

    /// Insert or replace a lead.
    pub fn upsert_lead(&self, lead: Lead) -> EngineResult<LeadId> {
        let id = lead.id;
        self.store.insert_lead(lead)?;
        Ok(id)
    }

    fn lead(&self, id: LeadId) -> EngineResult<Lead> {
        self.store
            .get_lead(id)?
            .ok_or_else(|| EngineError::not_found(format!("lead {id}")))
    }

    /// Append a customer reply and publish `response_received`.
    ///
    /// The reply answers the latest outbound message sent before it; latency
    /// is measured from that message.
    pub fn record_inbound(
        &self,
        lead_id: LeadId,
        body: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<MessageId> {
        if body.trim().is_empty() {
            return Err(EngineError::validation("inbound message body is empty"));
        }
        let lead = self.lead(lead_id)?;
        let transcript = self.store.messages_for(lead.id)?;
        let answered = transcript
            .iter()
            .filter(|m| m.reached_customer() && m.sent_at <= at)
            .max_by_key(|m| m.sent_at);

        let message = Message::inbound(lead.id, body, at);
        let message_id = message.id;
        self.store.append_message(message)?;

        let payload = LearningPayload::ResponseReceived {
            message_id,
            answered_message_id: answered.map(|m| m.id),
            latency_minutes: answered.map(|m| (at - m.sent_at).num_seconds() as f64 / 60.0),
            sentiment: text::sentiment_score(body),
        };
        debug!(lead_id = %lead.id, answered = answered.is_some(), "inbound recorded");
        self.publish(LearningEvent::new(lead.id, payload, at));
        Ok(message_id)
    }

    pub fn record_outcome(
        &self,
        lead_id: LeadId,
        outcome: LeadOutcome,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let lead = self.lead(lead_id)?;
        let payload = match outcome {
            LeadOutcome::Conversion { value } => LearningPayload::Conversion { value },
            LeadOutcome::AppointmentBooked { appointment_at } => {
                LearningPayload::AppointmentBooked { appointment_at }
            }
        };
        info!(lead_id = %lead.id, outcome = ?outcome, "outcome recorded");
        self.publish(LearningEvent::new(lead.id, payload, at));
        Ok(())
    }

    // --- aggressive sequence ---------------------------------------------------

    /// Materialize the 14-day plan for an unresponsive lead.
    ///
    /// A lead that still has open entries, or whose sequence is paused, is a
    /// `SchedulingNoOp`. Returns the number of entries created.
    pub fn enter_aggressive_sequence(
        &self,
        lead_id: LeadId,
        now: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let lead = self.lead(lead_id)?;
        if lead.sequence_paused {
            return Err(EngineError::noop(format!(
                "lead {lead_id} sequence is paused; resume it instead"
            )));
        }
        self.start_sequence(&lead, now)
    }

    fn start_sequence(&self, lead: &Lead, now: DateTime<Utc>) -> EngineResult<usize> {
        if self.store.schedule_for(lead.id)?.iter().any(|e| e.is_open()) {
            return Err(EngineError::noop(format!(
                "lead {} already has an open sequence",
                lead.id
            )));
        }

        let plan = aggressive_plan(lead.id, now, self.config.local_offset());
        let count = plan.len();
        if count == 0 {
            return Err(EngineError::invariant("aggressive plan produced no entries"));
        }
        self.store.insert_schedule(plan)?;
        self.store.modify_lead(lead.id, &mut |l| {
            l.ai_stage = AiStage::AggressiveUnresponsive;
            l.next_send_at = None;
        })?;

        info!(lead_id = %lead.id, entries = count, "aggressive sequence entered");
        Ok(count)
    }

    /// Stop the aggressive sequence; returns how many open entries were voided.
    pub fn pause_sequence(&self, lead_id: LeadId, reason: &str) -> EngineResult<usize> {
        self.lead(lead_id)?;
        self.store
            .modify_lead(lead_id, &mut |l| l.pause_sequence(reason))?;
        let skipped = self.store.skip_open_entries(lead_id, reason)?;
        info!(lead_id = %lead_id, reason, skipped, "sequence paused");
        Ok(skipped)
    }

    /// Operator resume: clears the pause and starts a fresh plan from `now`.
    ///
    /// Entries voided by the pause stay void.
    pub fn resume_sequence(&self, lead_id: LeadId, now: DateTime<Utc>) -> EngineResult<usize> {
        let lead = self.lead(lead_id)?;
        if !lead.sequence_paused {
            return Err(EngineError::noop(format!("lead {lead_id} is not paused")));
        }
        let lead = self.store.modify_lead(lead_id, &mut |l| l.resume_sequence())?;
        self.start_sequence(&lead, now)
    }

    // --- human handoff and triggers -------------------------------------------

    /// Suppress autonomous sends until a human answers or `deadline` passes.
    pub fn request_human_response(
        &self,
        lead_id: LeadId,
        deadline: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.lead(lead_id)?;
        self.store
            .modify_lead(lead_id, &mut |l| l.request_human_response(deadline))?;
        info!(lead_id = %lead_id, deadline = %deadline, "human response requested");
        Ok(())
    }

    pub fn mark_trigger_processed(
        &self,
        trigger_id: TriggerId,
        now: DateTime<Utc>,
    ) -> EngineResult<BehavioralTrigger> {
        Ok(self.store.mark_trigger_processed(trigger_id, now)?)
    }

    pub fn triggers_for(&self, lead_id: LeadId) -> EngineResult<Vec<BehavioralTrigger>> {
        Ok(self.store.triggers_for(lead_id)?)
    }

    // --- read-only analytics ----------------------------------------------------

    /// Analyze the lead's conversation against its latest inbound message.
    pub fn analyze(&self, lead_id: LeadId) -> EngineResult<ConversationAnalysis> {
        let lead = self.lead(lead_id)?;
        let transcript = self.store.messages_for(lead.id)?;
        let latest_inbound = transcript
            .iter()
            .filter(|m| m.is_inbound())
            .max_by_key(|m| m.sent_at)
            .map(|m| m.body.as_str())
            .unwrap_or("");
        Ok(self.analyzer.analyze(&transcript, latest_inbound))
    }

    pub fn predict(&self, lead_id: LeadId, now: DateTime<Utc>) -> EngineResult<Prediction> {
        let lead = self.lead(lead_id)?;
        let transcript = self.store.messages_for(lead.id)?;
        let factors = EngagementFactors::from_conversation(&lead, &transcript, now);
        let successful = self.success_profiles()?;
        Ok(self.scorer.predict(&factors, &successful, now))
    }
}
