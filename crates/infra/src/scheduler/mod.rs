//! Message scheduler: due-work detection, flow composition and dispatch.
//!
//! Each sending strategy is a [`Flow`]. The [`FlowRegistry`] runs them in
//! [`FlowKind`] order, so a takeover executed early in a sweep is picked up
//! by the follow-up flow in the same sweep.

pub mod dispatcher;
pub mod flows;
pub mod plan;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use leadflow_ai::{ConversationAnalyzer, PredictiveScorer, StrategyRegistry, SuccessProfile};
use leadflow_core::{AiStage, DueCondition, EngineResult, Lead, LeadId, Message, ScheduleEntryId};

use crate::config::EngineConfig;
use crate::store::LeadStore;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use flows::{AdvancementFlow, AggressiveSequenceFlow, FollowUpFlow, InitialContactFlow, TakeoverFlow};
pub use plan::aggressive_plan;

/// Closed set of flows, in sweep order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Takeover,
    InitialContact,
    FollowUp,
    Advancement,
    AggressiveSequence,
}

impl FlowKind {
    pub const ALL: [FlowKind; 5] = [
        FlowKind::Takeover,
        FlowKind::InitialContact,
        FlowKind::FollowUp,
        FlowKind::Advancement,
        FlowKind::AggressiveSequence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Takeover => "takeover",
            FlowKind::InitialContact => "initial_contact",
            FlowKind::FollowUp => "follow_up",
            FlowKind::Advancement => "advancement",
            FlowKind::AggressiveSequence => "aggressive_sequence",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lead that a flow considers due, with the condition to claim it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Due {
    pub lead_id: LeadId,
    pub condition: DueCondition,
}

/// What to do with `next_send_at` after a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSend {
    Keep,
    Clear,
    At(DateTime<Utc>),
}

/// A message a flow wants sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub template: String,
    /// Guidance for the text generator.
    pub instructions: String,
    /// Template text, used when generation fails.
    pub draft: String,
    pub stage: Option<AiStage>,
    pub next_send: NextSend,
    /// The aggressive-sequence entry this send fulfils.
    pub entry: Option<ScheduleEntryId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowAction {
    Send(Outbound),
    /// Clear the pending-human state and schedule an immediate follow-up.
    ExecuteTakeover,
    /// Stop the aggressive sequence and void its open entries.
    PauseSequence { reason: String },
}

/// Shared read-only inputs of a sweep.
pub struct FlowContext<'a> {
    pub store: &'a dyn LeadStore,
    pub config: &'a EngineConfig,
    pub local_offset: FixedOffset,
    pub analyzer: &'a ConversationAnalyzer,
    pub scorer: &'a PredictiveScorer,
    pub strategies: &'a StrategyRegistry,
    /// Profiles of converted leads, for prediction similarity.
    pub successful: &'a [SuccessProfile],
}

pub trait Flow: Send + Sync {
    fn kind(&self) -> FlowKind;

    /// Leads due for this flow at `now`.
    fn due(&self, ctx: &FlowContext<'_>, now: DateTime<Utc>) -> EngineResult<Vec<Due>>;

    /// Decide what to do for a claimed lead.
    fn plan(
        &self,
        ctx: &FlowContext<'_>,
        lead: &Lead,
        transcript: &[Message],
        due: &Due,
        now: DateTime<Utc>,
    ) -> EngineResult<FlowAction>;
}

/// Flows keyed by kind.
pub struct FlowRegistry {
    flows: BTreeMap<FlowKind, Box<dyn Flow>>,
}

impl FlowRegistry {
    pub fn empty() -> Self {
        Self {
            flows: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(TakeoverFlow));
        registry.register(Box::new(InitialContactFlow));
        registry.register(Box::new(FollowUpFlow));
        registry.register(Box::new(AdvancementFlow));
        registry.register(Box::new(AggressiveSequenceFlow));
        registry
    }

    /// Replaces any flow already registered for the same kind.
    pub fn register(&mut self, flow: Box<dyn Flow>) {
        self.flows.insert(flow.kind(), flow);
    }

    pub fn get(&self, kind: FlowKind) -> Option<&dyn Flow> {
        self.flows.get(&kind).map(|f| f.as_ref())
    }

    /// Registered flows in sweep order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Flow> {
        self.flows.values().map(|f| f.as_ref())
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.flows.keys()).finish()
    }
}

/// Deterministic offset in `[min, max]` derived from the lead id and `salt`.
///
/// Spreads sends across leads without a random source, so sweeps replay
/// identically in tests.
pub fn jitter(lead_id: LeadId, salt: u64, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if max < min { (max, min) } else { (min, max) };
    let span = (hi - lo).num_seconds();
    if span <= 0 {
        return lo;
    }
    let seed = lead_id.as_uuid().as_u128();
    let mixed = splitmix64((seed as u64) ^ ((seed >> 64) as u64) ^ salt);
    lo + Duration::seconds((mixed % (span as u64 + 1)) as i64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Convert a std duration from config into a chrono one, saturating.
pub(crate) fn chrono_duration(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::weeks(52 * 100))
}
