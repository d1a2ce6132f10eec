//! `leadflow-events`: learning events and their distribution.
//!
//! Every dispatch, inbound reply, recorded outcome and fired trigger becomes a
//! [`LearningEvent`]. The engine publishes them on an [`EventBus`]; the
//! learning feedback loop consumes them asynchronously.

pub mod bus;
pub mod in_memory_bus;
pub mod learning;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use learning::{LearningEvent, LearningEventKind, LearningPayload};
