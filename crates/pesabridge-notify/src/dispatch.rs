//! In-process delivery queue and dispatcher.
//!
//! First delivery attempts are handed off through a bounded mpsc channel
//! rather than attempted inline, so the callback acknowledgement never waits
//! on a client endpoint. The channel is best-effort: a dropped enqueue is
//! logged and the retry sweep picks the notification up from storage, which
//! remains the source of truth.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use pesabridge_db::models::Notification;

use crate::delivery::DeliveryEngine;

/// Default queue capacity before enqueues start being dropped to the sweep.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default cap on concurrently in-flight deliveries.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Lease taken on a notification before a queued delivery attempt.
const DISPATCH_LEASE_SECS: i64 = 60;

/// Create the delivery handoff channel.
pub fn delivery_channel(capacity: usize) -> (DeliveryQueue, mpsc::Receiver<Uuid>) {
    let (tx, rx) = mpsc::channel(capacity);
    (DeliveryQueue { tx }, rx)
}

/// Producer half of the delivery channel.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<Uuid>,
}

impl DeliveryQueue {
    /// Hand a notification to the dispatcher, fire-and-forget.
    ///
    /// Never blocks the caller. When the queue is full or the dispatcher is
    /// gone, the notification stays `pending` in storage and the retry sweep
    /// delivers it later.
    pub fn enqueue(&self, notification_id: Uuid) {
        if let Err(e) = self.tx.try_send(notification_id) {
            tracing::warn!(
                target: "notification_delivery",
                notification_id = %notification_id,
                error = %e,
                "Delivery queue full; deferring to retry sweep"
            );
        }
    }
}

/// Consumer loop pulling notification ids off the channel and running
/// deliveries with bounded concurrency.
pub struct DeliveryDispatcher {
    rx: mpsc::Receiver<Uuid>,
    pool: PgPool,
    engine: Arc<DeliveryEngine>,
    semaphore: Arc<Semaphore>,
}

impl DeliveryDispatcher {
    pub fn new(
        rx: mpsc::Receiver<Uuid>,
        pool: PgPool,
        engine: Arc<DeliveryEngine>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            rx,
            pool,
            engine,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Consume the channel until every producer handle is dropped.
    pub async fn run(mut self) {
        tracing::info!(
            target: "notification_delivery",
            max_concurrent = self.semaphore.available_permits(),
            "Delivery dispatcher started"
        );

        while let Some(notification_id) = self.rx.recv().await {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Closed semaphore means shutdown.
                Err(_) => break,
            };

            // Lease before spawning; losing it means the sweep or another
            // dispatcher already holds this notification.
            match Notification::claim(&self.pool, notification_id, DISPATCH_LEASE_SECS).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        target: "notification_delivery",
                        notification_id = %notification_id,
                        "Notification already claimed; skipping dispatch"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "notification_delivery",
                        notification_id = %notification_id,
                        error = %e,
                        "Failed to claim notification for dispatch"
                    );
                    continue;
                }
            }

            let engine = self.engine.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = engine.deliver(notification_id).await {
                    tracing::warn!(
                        target: "notification_delivery",
                        notification_id = %notification_id,
                        error = %e,
                        "Dispatched delivery errored"
                    );
                }
            });
        }

        tracing::info!(target: "notification_delivery", "Delivery dispatcher stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_delivers_to_receiver() {
        let (queue, mut rx) = delivery_channel(4);
        let id = Uuid::new_v4();

        queue.enqueue(id);

        assert_eq!(rx.recv().await, Some(id));
    }

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let (queue, mut rx) = delivery_channel(4);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[tokio::test]
    async fn test_enqueue_on_full_queue_does_not_block_or_panic() {
        let (queue, mut rx) = delivery_channel(1);
        let kept = Uuid::new_v4();

        queue.enqueue(kept);
        // Dropped silently; the retry sweep owns recovery.
        queue.enqueue(Uuid::new_v4());

        assert_eq!(rx.recv().await, Some(kept));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped_does_not_panic() {
        let (queue, rx) = delivery_channel(4);
        drop(rx);

        queue.enqueue(Uuid::new_v4());
    }
}
