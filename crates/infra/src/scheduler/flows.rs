//! The five built-in flows.

use chrono::{DateTime, Utc};

use leadflow_ai::{EngagementFactors, StrategyContext, advancement, templates};
use leadflow_core::{AiStage, DueCondition, EngineError, EngineResult, Lead, Message};

use super::{Due, Flow, FlowAction, FlowContext, FlowKind, NextSend, Outbound, chrono_duration, jitter};

const FOLLOW_UP_SALT: u64 = 0x0f0f;
const ADVANCEMENT_SALT: u64 = 0xadad;

fn vehicle_label(lead: &Lead) -> Option<String> {
    lead.vehicle.label()
}

fn latest(transcript: &[Message]) -> Option<&Message> {
    transcript.iter().max_by_key(|m| m.sent_at)
}

fn default_follow_up(ctx: &FlowContext<'_>, lead: &Lead, salt: u64, now: DateTime<Utc>) -> DateTime<Utc> {
    now + jitter(
        lead.id,
        salt,
        chrono_duration(ctx.config.initial_follow_up_min),
        chrono_duration(ctx.config.initial_follow_up_max),
    )
}

/// Leads satisfying `pred`, each paired with `condition`.
fn due_leads(
    ctx: &FlowContext<'_>,
    condition: DueCondition,
    mut pred: impl FnMut(&Lead) -> EngineResult<bool>,
) -> EngineResult<Vec<Due>> {
    let mut due = Vec::new();
    for lead in ctx.store.list_leads()? {
        if pred(&lead)? {
            due.push(Due {
                lead_id: lead.id,
                condition,
            });
        }
    }
    Ok(due)
}

/// A human missed the response deadline: hand the lead back to the AI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TakeoverFlow;

impl Flow for TakeoverFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Takeover
    }

    fn due(&self, ctx: &FlowContext<'_>, now: DateTime<Utc>) -> EngineResult<Vec<Due>> {
        due_leads(ctx, DueCondition::Takeover, |lead| Ok(lead.takeover_due(now)))
    }

    fn plan(
        &self,
        _ctx: &FlowContext<'_>,
        _lead: &Lead,
        _transcript: &[Message],
        _due: &Due,
        _now: DateTime<Utc>,
    ) -> EngineResult<FlowAction> {
        Ok(FlowAction::ExecuteTakeover)
    }
}

/// First message to an opted-in lead nobody has written to yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialContactFlow;

impl Flow for InitialContactFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::InitialContact
    }

    fn due(&self, ctx: &FlowContext<'_>, _now: DateTime<Utc>) -> EngineResult<Vec<Due>> {
        due_leads(ctx, DueCondition::InitialContact, |lead| {
            if !lead.autonomous_sends_allowed() || lead.ai_stage != AiStage::Uncontacted {
                return Ok(false);
            }
            let log = ctx.store.messages_for(lead.id)?;
            Ok(!log.iter().any(Message::reached_customer))
        })
    }

    fn plan(
        &self,
        ctx: &FlowContext<'_>,
        lead: &Lead,
        _transcript: &[Message],
        _due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<FlowAction> {
        let vehicle = vehicle_label(lead);
        Ok(FlowAction::Send(Outbound {
            template: templates::INITIAL_CONTACT.to_string(),
            instructions: "Introduce yourself and confirm the vehicle they asked about. One question, no pressure.".to_string(),
            draft: templates::initial_contact(&lead.first_name, vehicle.as_deref()),
            stage: Some(AiStage::InitialSent),
            next_send: NextSend::At(default_follow_up(ctx, lead, FOLLOW_UP_SALT, now)),
            entry: None,
        }))
    }
}

/// One follow-up once `next_send_at` elapses. A waiting reply is left to
/// advancement, except after a takeover.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowUpFlow;

impl Flow for FollowUpFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::FollowUp
    }

    fn due(&self, ctx: &FlowContext<'_>, now: DateTime<Utc>) -> EngineResult<Vec<Due>> {
        due_leads(ctx, DueCondition::FollowUp, |lead| {
            if !lead.follow_up_due(now) {
                return Ok(false);
            }
            // A takeover answers a waiting reply at once.
            if lead.ai_stage == AiStage::TakeoverExecuted {
                return Ok(true);
            }
            // Otherwise an unanswered reply belongs to the advancement flow.
            let log = ctx.store.messages_for(lead.id)?;
            Ok(!latest(&log).is_some_and(Message::is_inbound))
        })
    }

    fn plan(
        &self,
        _ctx: &FlowContext<'_>,
        lead: &Lead,
        _transcript: &[Message],
        _due: &Due,
        _now: DateTime<Utc>,
    ) -> EngineResult<FlowAction> {
        let vehicle = vehicle_label(lead);
        let (template, draft) = if lead.ai_stage == AiStage::TakeoverExecuted {
            (
                templates::TAKEOVER,
                templates::takeover(&lead.first_name, vehicle.as_deref()),
            )
        } else {
            (
                templates::FOLLOW_UP,
                templates::follow_up(&lead.first_name, vehicle.as_deref()),
            )
        };
        Ok(FlowAction::Send(Outbound {
            template: template.to_string(),
            instructions: "Short, friendly check-in. Offer one concrete next step.".to_string(),
            draft,
            stage: None,
            next_send: NextSend::Clear,
            entry: None,
        }))
    }
}

/// Answer a customer message that has waited past the advancement threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvancementFlow;

impl Flow for AdvancementFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Advancement
    }

    fn due(&self, ctx: &FlowContext<'_>, now: DateTime<Utc>) -> EngineResult<Vec<Due>> {
        let threshold = chrono_duration(ctx.config.advancement_threshold);
        let mut due = Vec::new();
        for lead in ctx.store.list_leads()? {
            if !lead.autonomous_sends_allowed() {
                continue;
            }
            let log = ctx.store.messages_for(lead.id)?;
            if let Some(inbound) = latest(&log).filter(|m| m.is_inbound()) {
                if now - inbound.sent_at >= threshold {
                    due.push(Due {
                        lead_id: lead.id,
                        condition: DueCondition::Advancement {
                            inbound_id: inbound.id,
                        },
                    });
                }
            }
        }
        Ok(due)
    }

    fn plan(
        &self,
        ctx: &FlowContext<'_>,
        lead: &Lead,
        transcript: &[Message],
        due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<FlowAction> {
        let DueCondition::Advancement { inbound_id } = due.condition else {
            return Err(EngineError::invariant(format!(
                "advancement flow claimed lead {} under {}",
                lead.id,
                due.condition.label()
            )));
        };
        let inbound = transcript
            .iter()
            .find(|m| m.id == inbound_id)
            .ok_or_else(|| EngineError::not_found(format!("message {inbound_id}")))?;

        let analysis = ctx.analyzer.analyze(transcript, &inbound.body);
        let vehicle = vehicle_label(lead).or_else(|| analysis.vehicle_interest.label());
        let plan = advancement::plan(
            &lead.first_name,
            vehicle.as_deref(),
            &inbound.body,
            now - inbound.sent_at,
            analysis.temperature,
        );

        let factors = EngagementFactors::from_conversation(lead, transcript, now);
        let prediction = ctx.scorer.predict(&factors, ctx.successful, now);
        let follow_up = if prediction.confidence_score >= ctx.config.prediction_confidence_gate {
            prediction.optimal_contact_time
        } else {
            default_follow_up(ctx, lead, ADVANCEMENT_SALT, now)
        };

        let mut instructions = format!(
            "Conversation stage: {}. Topic: {}. Urgency: {:?}.",
            analysis.stage.as_str(),
            plan.topic.as_str(),
            plan.urgency
        );
        if let Some(question) = analysis.discovery_questions.first() {
            instructions.push_str(&format!(" Ask: {}", question.question));
        }

        Ok(FlowAction::Send(Outbound {
            template: plan.template,
            instructions,
            draft: plan.message,
            stage: Some(AiStage::Engaged),
            next_send: NextSend::At(follow_up),
            entry: None,
        }))
    }
}

/// Pre-materialized fourteen-day sequence for unresponsive leads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggressiveSequenceFlow;

impl Flow for AggressiveSequenceFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::AggressiveSequence
    }

    fn due(&self, ctx: &FlowContext<'_>, now: DateTime<Utc>) -> EngineResult<Vec<Due>> {
        Ok(ctx
            .store
            .due_entries(now)?
            .into_iter()
            .map(|entry| Due {
                lead_id: entry.lead_id,
                condition: DueCondition::ScheduledEntry { entry_id: entry.id },
            })
            .collect())
    }

    fn plan(
        &self,
        ctx: &FlowContext<'_>,
        lead: &Lead,
        transcript: &[Message],
        due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<FlowAction> {
        let DueCondition::ScheduledEntry { entry_id } = due.condition else {
            return Err(EngineError::invariant(format!(
                "sequence flow claimed lead {} under {}",
                lead.id,
                due.condition.label()
            )));
        };

        let window = chrono_duration(ctx.config.inbound_pause_window);
        let replied = transcript
            .iter()
            .any(|m| m.is_inbound() && now - m.sent_at <= window && m.sent_at <= now);
        if replied {
            return Ok(FlowAction::PauseSequence {
                reason: format!("customer replied within {}h", window.num_hours()),
            });
        }

        let entry = ctx
            .store
            .schedule_for(lead.id)?
            .into_iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| EngineError::not_found(format!("schedule entry {entry_id}")))?;
        let strategy = ctx.strategies.get(entry.strategy).ok_or_else(|| {
            EngineError::generation(format!(
                "no strategy registered for {}",
                entry.strategy.as_str()
            ))
        })?;

        let vehicle = vehicle_label(lead);
        let draft = strategy.compose(&StrategyContext {
            first_name: &lead.first_name,
            vehicle: vehicle.as_deref(),
            day: entry.day,
            message_index: entry.message_index,
        });

        Ok(FlowAction::Send(Outbound {
            template: entry.strategy.as_str().to_string(),
            instructions: strategy.prompt_hint().to_string(),
            draft,
            stage: None,
            next_send: NextSend::Keep,
            entry: Some(entry.id),
        }))
    }
}
