//! `leadflow-core`: lead engagement domain records.
//!
//! This crate contains **pure domain** records and rules (no IO, no storage,
//! no clocks). Callers pass `now` explicitly so every transition is
//! reproducible in tests.

pub mod error;
pub mod id;
pub mod insight;
pub mod lead;
pub mod message;
pub mod schedule;
pub mod trigger;

pub use error::{ComplianceReason, EngineError, EngineResult};
pub use id::{ClaimToken, InsightId, LeadId, MessageId, ScheduleEntryId, TriggerId};
pub use insight::{Impact, InsightType, OptimizationInsight};
pub use lead::{AiStage, Claim, DueCondition, Lead, VehicleOfInterest};
pub use message::{DeliveryStatus, Direction, Message};
pub use schedule::{ScheduledEntry, StrategyTag};
pub use trigger::{BehavioralTrigger, TriggerType, UrgencyLevel};
