//! Datastore abstraction and the in-memory implementation.
//!
//! The engine only talks to the [`LeadStore`] and [`AnalyticsStore`] traits;
//! [`InMemoryStore`] implements both for tests and single-process use.

pub mod analytics;
pub mod in_memory;
pub mod r#trait;

pub use analytics::{CommunicationPattern, LearningOutcome, MessageAnalytics, OutcomeKind};
pub use in_memory::InMemoryStore;
pub use r#trait::{AnalyticsStore, LeadStore, StoreError};
