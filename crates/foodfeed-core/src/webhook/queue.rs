//! Hand-off between webhook receipt and processing.
//!
//! The HTTP handler only enqueues; the worker owns dispatch. Each event runs in
//! its own task, with a semaphore bounding how many run at once.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{domain::WebhookEvent, Error, Result};

use super::dispatcher::WebhookDispatcher;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Clone, Debug)]
pub struct WebhookQueue {
    tx: mpsc::Sender<WebhookEvent>,
}

impl WebhookQueue {
    /// Non-blocking: a full or closed queue is reported instead of waited on.
    pub fn enqueue(&self, event: WebhookEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Queue("webhook queue is full".to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                Error::Queue("webhook queue is closed".to_string())
            }
        })
    }
}

pub struct WebhookReceiver {
    rx: mpsc::Receiver<WebhookEvent>,
}

pub fn channel(capacity: usize) -> (WebhookQueue, WebhookReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WebhookQueue { tx }, WebhookReceiver { rx })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub dispatched: usize,
    pub failed: usize,
}

pub struct WebhookWorker {
    dispatcher: WebhookDispatcher,
    receiver: WebhookReceiver,
    max_in_flight: usize,
}

impl WebhookWorker {
    pub fn new(dispatcher: WebhookDispatcher, receiver: WebhookReceiver) -> Self {
        Self {
            dispatcher,
            receiver,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    /// Consume events until cancelled or every sender is gone.
    ///
    /// On cancellation, events already accepted into the queue are still
    /// dispatched, and in-flight tasks are awaited before returning.
    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        let Self {
            dispatcher,
            receiver,
            max_in_flight,
        } = self;
        let mut rx = receiver.rx;
        let permits = Arc::new(Semaphore::new(max_in_flight));
        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut stats = WorkerStats::default();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            spawn_dispatch(&mut tasks, &permits, &dispatcher, event).await;
            stats.dispatched += 1;
            while let Some(done) = tasks.try_join_next() {
                tally(&mut stats, done);
            }
        }

        rx.close();
        while let Some(event) = rx.recv().await {
            spawn_dispatch(&mut tasks, &permits, &dispatcher, event).await;
            stats.dispatched += 1;
        }

        while let Some(done) = tasks.join_next().await {
            tally(&mut stats, done);
        }

        tracing::info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            "webhook worker stopped"
        );
        stats
    }
}

async fn spawn_dispatch(
    tasks: &mut JoinSet<bool>,
    permits: &Arc<Semaphore>,
    dispatcher: &WebhookDispatcher,
    event: WebhookEvent,
) {
    let permit = permits.clone().acquire_owned().await.ok();
    let dispatcher = dispatcher.clone();
    tasks.spawn(async move {
        let _permit = permit;
        match dispatcher.dispatch(&event).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    webhook_type = %event.webhook_type,
                    webhook_code = %event.webhook_code,
                    item_id = %event.item_id,
                    error = %e,
                    "webhook processing failed"
                );
                false
            }
        }
    });
}

fn tally(stats: &mut WorkerStats, done: std::result::Result<bool, tokio::task::JoinError>) {
    match done {
        Ok(true) => {}
        Ok(false) => stats.failed += 1,
        Err(e) => {
            tracing::error!(error = %e, "webhook task panicked");
            stats.failed += 1;
        }
    }
}
