//! Outcome stream shared by all in-flight dispatches.
//!
//! A bounded multi-producer channel. Producers wait for capacity when the
//! consumer falls behind, so outcomes are never dropped or overwritten.

use tokio::sync::mpsc;
use tracing::error;

use crate::message::RequestDescriptor;

/// Producer half, cloned into every dispatch task.
#[derive(Debug, Clone)]
pub struct OutcomeSink {
    tx: mpsc::Sender<RequestDescriptor>,
}

/// Consumer half, drained by the acknowledgement loop.
#[derive(Debug)]
pub struct OutcomeStream {
    rx: mpsc::Receiver<RequestDescriptor>,
}

/// Create a sink/stream pair buffering up to `capacity` outcomes.
pub fn outcome_channel(capacity: usize) -> (OutcomeSink, OutcomeStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutcomeSink { tx }, OutcomeStream { rx })
}

impl OutcomeSink {
    /// Hand over a completed descriptor, waiting while the buffer is full.
    pub async fn report(&self, descriptor: RequestDescriptor) {
        if let Err(mpsc::error::SendError(descriptor)) = self.tx.send(descriptor).await {
            // The broker redelivers the unacknowledged message once the
            // channel closes.
            error!(
                message_id = %descriptor.message_id,
                delivery_tag = descriptor.delivery_tag,
                "outcome_stream_closed"
            );
        }
    }
}

impl OutcomeStream {
    /// Next completed descriptor; `None` once every sink is dropped and the
    /// buffer is empty.
    pub async fn recv(&mut self) -> Option<RequestDescriptor> {
        self.rx.recv().await
    }
}
