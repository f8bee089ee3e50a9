//! Provider webhook intake: routing plus the queue that decouples ack from work.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::{DispatchOutcome, WebhookDispatcher, WebhookRoute};
pub use queue::{channel, WebhookQueue, WebhookReceiver, WebhookWorker, WorkerStats};
