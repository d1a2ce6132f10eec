//! Delivery-completion queue with retry, backoff and dead-letter handling.
//!
//! After the gateway accepts a message the dispatcher enqueues a
//! `FinalizeDelivery` job keyed by the message's correlation id. The single
//! [`DeliveryWorker`] applies it and acknowledges, so each delivery takes
//! effect exactly once however often it is reported.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{DeliveryRun, DeliveryWorker, DeliveryWorkerConfig, DeliveryWorkerHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy};
