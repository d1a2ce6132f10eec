use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use leadflow_events::{EventBus, LearningEvent, Subscription};

use super::LearningLoop;
use crate::store::AnalyticsStore;

/// Handle to stop and join the learning worker.
#[derive(Debug)]
pub struct LearningWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl LearningWorkerHandle {
    /// Request shutdown and wait; events still queued are flushed first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Feeds bus events into a [`LearningLoop`] on a background thread.
#[derive(Debug)]
pub struct LearningWorker;

impl LearningWorker {
    pub fn spawn<A, B>(bus: &B, learning: Arc<LearningLoop<A>>) -> LearningWorkerHandle
    where
        A: AnalyticsStore + 'static,
        B: EventBus<LearningEvent>,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name("learning-worker".to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, &learning))
            .expect("failed to spawn learning worker thread");

        LearningWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop<A>(
    sub: Subscription<LearningEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    learning: &LearningLoop<A>,
) where
    A: AnalyticsStore,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => {
                let event_type = event.event_type();
                if let Err(err) = learning.ingest(event) {
                    warn!(event_type, error = %err, "learning event not applied");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for event in sub.drain() {
        if let Err(err) = learning.ingest(event) {
            warn!(error = %err, "learning event not applied");
        }
    }
    if let Err(err) = learning.flush(Utc::now()) {
        warn!(error = %err, "final learning flush failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use leadflow_core::LeadId;
    use leadflow_events::{InMemoryEventBus, LearningPayload};

    use crate::store::InMemoryStore;

    #[test]
    fn shutdown_flushes_a_partial_batch() {
        let bus: InMemoryEventBus<LearningEvent> = InMemoryEventBus::new();
        let store = Arc::new(InMemoryStore::new());
        let learning = Arc::new(LearningLoop::new(
            store.clone(),
            3,
            FixedOffset::east_opt(0).unwrap(),
        ));
        let handle = LearningWorker::spawn(&bus, learning);

        bus.publish(LearningEvent::new(
            LeadId::new(),
            LearningPayload::Conversion { value: Some(1.0) },
            Utc::now(),
        ))
        .unwrap();
        handle.shutdown();

        assert_eq!(store.outcomes().unwrap().len(), 1);
    }
}
