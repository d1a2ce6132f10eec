//! `leadflow-ai`
//!
//! **Responsibility:** deterministic lead analytics.
//!
//! Everything in this crate is a pure function of its input:
//! - It never touches the datastore or the messaging gateway.
//! - It never mutates leads or messages.
//! - It returns *analyses, triggers and predictions*; the infra layer decides
//!   what to persist and what to send.

pub mod advancement;
pub mod analyzer;
pub mod result;
pub mod scoring;
pub mod strategy;
pub mod templates;
pub mod text;
pub mod triggers;

pub use advancement::{
    AdvancementHints, AdvancementPlan, AdvancementTopic, AdvancementUrgency, FinanceVariant,
};
pub use analyzer::{
    BuyingSignal, ConversationAnalysis, ConversationAnalyzer, ConversationStage, DiscoveryQuestion,
    FeatureKind, FeatureMention, Importance, SignalFamily, SignalUrgency, UseCase, VehicleInterest,
};
pub use result::AiError;
pub use scoring::{EngagementFactors, Prediction, PredictiveScorer, SuccessProfile};
pub use strategy::{MessageStrategy, StrategyContext, StrategyRegistry};
pub use triggers::{Condition, LeadContext, Metric, Rule, TriggerEngine};
