//! Inbound callback adapter for payment network results.
//!
//! Receives the network's asynchronous result callbacks, resolves them to an
//! operation via the correlation identifiers, finalizes the operation, and
//! queues the client notification. The network is always acknowledged with
//! acceptance: it has fulfilled its obligation by delivering the result, and
//! our internal failures are ours to log and recover, not its cue to retry.

use sqlx::PgPool;

use chrono::Utc;
use pesabridge_db::models::{
    ClientSubscription, CreateNotification, Notification, NotificationKind, Operation,
    OperationStatus,
};

use crate::dispatch::DeliveryQueue;
use crate::error::NotifyError;
use crate::models::{CallbackAck, NetworkCallback, NotificationPayload};

/// Network result code for a successful operation.
pub const RESULT_SUCCESS: i32 = 0;

/// Network result code: the customer rejected the payment request. The
/// network emits this alongside 1032 depending on where in the prompt flow
/// the cancellation happened.
pub const RESULT_REQUEST_CANCELLED: i32 = 1031;

/// Network result code: the customer cancelled the payment prompt.
pub const RESULT_CANCELLED_BY_USER: i32 = 1032;

/// Network result code: the payment prompt timed out on the handset.
pub const RESULT_PROMPT_TIMEOUT: i32 = 1037;

/// Map a network result code to the operation's terminal status.
///
/// Code 0 is success; the two user-cancellation codes map to `cancelled`; a
/// handset prompt timeout maps to `timed_out` so clients can distinguish an
/// unreachable customer from a rejected one. Every other code is `failed`.
#[must_use]
pub fn terminal_status_from_result(result_code: i32) -> OperationStatus {
    match result_code {
        RESULT_SUCCESS => OperationStatus::Completed,
        RESULT_REQUEST_CANCELLED | RESULT_CANCELLED_BY_USER => OperationStatus::Cancelled,
        RESULT_PROMPT_TIMEOUT => OperationStatus::TimedOut,
        _ => OperationStatus::Failed,
    }
}

/// Adapter turning raw network callbacks into finalized operations and
/// queued notifications.
#[derive(Clone)]
pub struct CallbackAdapter {
    pool: PgPool,
    queue: DeliveryQueue,
}

impl CallbackAdapter {
    pub fn new(pool: PgPool, queue: DeliveryQueue) -> Self {
        Self { pool, queue }
    }

    /// Handle a network callback. Always acknowledges acceptance.
    pub async fn handle(&self, callback: NetworkCallback) -> CallbackAck {
        if let Err(e) = self.process(&callback).await {
            tracing::error!(
                target: "notification_delivery",
                correlation_id = callback.correlation_id().unwrap_or("<none>"),
                result_code = callback.result_code,
                error = %e,
                "Failed to process network callback"
            );
        }

        CallbackAck::accepted()
    }

    async fn process(&self, callback: &NetworkCallback) -> Result<(), NotifyError> {
        let Some(correlation_id) = callback.correlation_id() else {
            tracing::warn!(
                target: "notification_delivery",
                result_code = callback.result_code,
                "Callback carries no correlation identifier; dropping"
            );
            return Ok(());
        };

        let Some(operation) = Operation::resolve_by_correlation(&self.pool, correlation_id).await?
        else {
            // Unmatched callbacks happen: late arrivals for purged test data,
            // or traffic for another environment. Audit-log and move on.
            tracing::warn!(
                target: "notification_delivery",
                correlation_id,
                result_code = callback.result_code,
                "Callback matches no known operation; dropping"
            );
            return Ok(());
        };

        let status = terminal_status_from_result(callback.result_code);
        let receipt_number = callback.items.get_str("receipt_number");
        // Completion time comes from the network when echoed; completed
        // operations without one are stamped at receipt.
        let completed_at = callback
            .items
            .get_timestamp("completed_at")
            .or_else(|| (status == OperationStatus::Completed).then(Utc::now));
        let description = (!callback.result_description.is_empty())
            .then_some(callback.result_description.as_str());
        let snapshot = serde_json::to_value(callback)
            .map_err(|e| NotifyError::Internal(format!("Failed to serialize callback: {e}")))?;

        let Some(operation) = Operation::mark_terminal(
            &self.pool,
            operation.id,
            status,
            Some(callback.result_code),
            description,
            receipt_number,
            completed_at,
            Some(&snapshot),
        )
        .await?
        else {
            // Conditional UPDATE matched nothing: the operation already left
            // pending. Duplicate callback; the first result stands.
            tracing::info!(
                target: "notification_delivery",
                operation_id = %operation.id,
                correlation_id,
                result_code = callback.result_code,
                "Duplicate callback for finalized operation; dropping"
            );
            return Ok(());
        };

        tracing::info!(
            target: "notification_delivery",
            operation_id = %operation.id,
            client_id = %operation.client_id,
            kind = operation.kind.as_str(),
            status = operation.status.as_str(),
            result_code = callback.result_code,
            "Operation finalized from network callback"
        );

        let kind = NotificationKind::for_operation(operation.kind);
        let Some(subscription) =
            ClientSubscription::find_for(&self.pool, operation.client_id, kind).await?
        else {
            tracing::debug!(
                target: "notification_delivery",
                operation_id = %operation.id,
                client_id = %operation.client_id,
                "No active subscription; operation finalized without notification"
            );
            return Ok(());
        };

        let payload = NotificationPayload {
            kind,
            operation_id: Some(operation.operation_id()),
            status: operation.status,
            amount: operation.amount,
            msisdn: operation.msisdn.clone(),
            result_code: operation.result_code,
            result_description: operation.result_description.clone(),
            receipt_number: operation.receipt_number.clone(),
            completed_at: operation.completed_at,
            metadata: operation.metadata.clone(),
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| NotifyError::Internal(format!("Failed to serialize payload: {e}")))?;

        let notification = Notification::create(
            &self.pool,
            CreateNotification {
                client_id: operation.client_id,
                operation_id: Some(operation.id),
                kind,
                payload,
                destination_url: subscription.destination_url,
            },
        )
        .await?;

        self.queue.enqueue(notification.id);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
