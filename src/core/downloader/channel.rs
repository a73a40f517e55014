// ─── Progress Channel ───
// Two-phase handshake: `subscribe()` creates the receiving side first, and
// only the returned sender can start a transfer. No event can be emitted
// before someone is able to receive it.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::ProgressEvent;

/// Well above the longest throttled sequence (Started + 20 Progress +
/// Finished + Installing + Error), so `try_emit` never hits a full buffer
/// while the subscription is being polled.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Receiving half. Dropping it releases the subscription; later sends are
/// discarded.
#[derive(Debug)]
pub struct ProgressSubscription {
    id: Uuid,
    rx: mpsc::Receiver<ProgressEvent>,
}

/// Sending half handed to the worker that performs the transfer.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    subscription: Uuid,
    tx: mpsc::Sender<ProgressEvent>,
}

pub fn subscribe() -> (ProgressSubscription, ProgressSender) {
    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let id = Uuid::new_v4();
    debug!("Progress subscription {} opened", id);
    (
        ProgressSubscription { id, rx },
        ProgressSender {
            subscription: id,
            tx,
        },
    )
}

impl ProgressSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.rx.close();
        debug!("Progress subscription {} released", self.id);
    }
}

impl ProgressSender {
    /// Deliver an event, waiting for buffer space. Returns false when the
    /// subscription was released.
    pub async fn emit(&self, event: ProgressEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Non-blocking variant for synchronous callbacks.
    pub fn try_emit(&self, event: ProgressEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "Progress subscription {} is full, dropping {:?}",
                    self.subscription, event
                );
                false
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_sent_before_polling_are_not_lost() {
        let (mut subscription, sender) = subscribe();
        assert!(sender.emit(ProgressEvent::Started { content_length: Some(10) }).await);
        assert!(sender.try_emit(ProgressEvent::Finished));
        drop(sender);

        assert_eq!(
            subscription.recv().await,
            Some(ProgressEvent::Started { content_length: Some(10) })
        );
        assert_eq!(subscription.recv().await, Some(ProgressEvent::Finished));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn released_subscription_rejects_events() {
        let (subscription, sender) = subscribe();
        drop(subscription);

        assert!(sender.is_released());
        assert!(!sender.emit(ProgressEvent::Finished).await);
        assert!(!sender.try_emit(ProgressEvent::Installing));
    }
}
