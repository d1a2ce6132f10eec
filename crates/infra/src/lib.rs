//! Infrastructure layer: datastore, compliance, external collaborators, the
//! sweep engine and the learning feedback loop.

pub mod compliance;
pub mod config;
pub mod engine;
pub mod external;
pub mod jobs;
pub mod learning;
pub mod runner;
pub mod scheduler;
pub mod store;


pub use config::EngineConfig;
pub use engine::{LeadEngine, LeadFailure, LeadOutcome, SweepReport};
pub use learning::{BatchReport, LearningLoop, LearningWorker, LearningWorkerHandle};
pub use runner::{Sweep, SweepRunner, SweepRunnerHandle};
