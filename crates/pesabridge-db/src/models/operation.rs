//! Payment operation entity model.
//!
//! One row per request issued to the payment network on behalf of a client.
//! Rows are never deleted; they form the audit trail for every push-payment,
//! collection, and disbursement the broker has handled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Type};
use uuid::Uuid;

use pesabridge_core::{ClientId, OperationId};

use crate::error::DbError;

/// The kind of payment-network request an operation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(type_name = "operation_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Customer-facing payment prompt pushed to a handset.
    PushPayment,
    /// Merchant-initiated collection from a customer account.
    MerchantCollection,
    /// Outbound payout to a customer account.
    Disbursement,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushPayment => "push_payment",
            Self::MerchantCollection => "merchant_collection",
            Self::Disbursement => "disbursement",
        }
    }
}

/// Lifecycle status of an operation.
///
/// An operation leaves `pending` exactly once and never returns to it;
/// the transition is enforced with a conditional UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Type, Serialize, Deserialize)]
#[sqlx(type_name = "operation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl OperationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// True once the operation has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        *self != Self::Pending
    }
}

/// A payment operation issued to the network.
#[derive(Debug, Clone, FromRow)]
pub struct Operation {
    /// Internal unique identifier.
    pub id: Uuid,

    /// Client that submitted the request.
    pub client_id: Uuid,

    /// Operation kind.
    pub kind: OperationKind,

    /// Monetary amount of the operation.
    pub amount: Decimal,

    /// Counter-party phone identifier (MSISDN).
    pub msisdn: String,

    /// Current lifecycle status.
    pub status: OperationStatus,

    /// Network-issued request correlation identifier (set after submission).
    pub network_ref: Option<String>,

    /// Network-issued session correlation identifier (set after submission).
    ///
    /// Some operation kinds are acknowledged with two identifiers; callbacks
    /// may echo either one, so both columns are indexed.
    pub session_ref: Option<String>,

    /// Network result code from the terminal callback.
    pub result_code: Option<i32>,

    /// Network result description from the terminal callback.
    pub result_description: Option<String>,

    /// Network receipt number, present on completed operations.
    pub receipt_number: Option<String>,

    /// Completion time reported by the network.
    pub completed_at: Option<DateTime<Utc>>,

    /// Raw request body sent to the network.
    pub request_snapshot: Option<serde_json::Value>,

    /// Raw callback/response body received from the network.
    pub response_snapshot: Option<serde_json::Value>,

    /// Opaque client-supplied key-value metadata.
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create an operation record.
#[derive(Debug, Clone)]
pub struct CreateOperation {
    pub client_id: Uuid,
    pub kind: OperationKind,
    pub amount: Decimal,
    pub msisdn: String,
    pub request_snapshot: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
}

impl Operation {
    /// Get the operation ID as a typed [`OperationId`].
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        OperationId::from_uuid(self.id)
    }

    /// Get the owning client ID as a typed [`ClientId`].
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        ClientId::from_uuid(self.client_id)
    }

    /// Create a new operation in `pending` status.
    ///
    /// Called by the submission path before the request goes to the network,
    /// so a later correlation bind always has a target.
    pub async fn create(pool: &PgPool, input: CreateOperation) -> Result<Self, DbError> {
        let op = sqlx::query_as::<_, Operation>(
            r"
            INSERT INTO operations (client_id, kind, amount, msisdn, request_snapshot, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(input.client_id)
        .bind(input.kind)
        .bind(input.amount)
        .bind(&input.msisdn)
        .bind(&input.request_snapshot)
        .bind(&input.metadata)
        .fetch_one(pool)
        .await?;

        Ok(op)
    }

    /// Find an operation by its internal id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let op = sqlx::query_as::<_, Operation>("SELECT * FROM operations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(op)
    }

    /// Resolve an operation from a network-issued correlation identifier.
    ///
    /// Exact match over both correlation columns; the network echoes back
    /// whichever identifier it assigned, without saying which kind it is.
    pub async fn resolve_by_correlation(
        pool: &PgPool,
        correlation_id: &str,
    ) -> Result<Option<Self>, DbError> {
        let op = sqlx::query_as::<_, Operation>(
            "SELECT * FROM operations WHERE network_ref = $1 OR session_ref = $1 LIMIT 1",
        )
        .bind(correlation_id)
        .fetch_optional(pool)
        .await?;

        Ok(op)
    }

    /// Bind network correlation identifiers to an operation.
    ///
    /// Called exactly once, right after the network acknowledges a
    /// submission. A second bind fails with [`DbError::AlreadyBound`] and
    /// leaves the existing identifiers untouched.
    pub async fn bind_correlation(
        pool: &PgPool,
        operation_id: Uuid,
        network_ref: &str,
        session_ref: Option<&str>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"
            UPDATE operations
            SET network_ref = $2, session_ref = $3, updated_at = now()
            WHERE id = $1 AND network_ref IS NULL AND session_ref IS NULL
            ",
        )
        .bind(operation_id)
        .bind(network_ref)
        .bind(session_ref)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // The conditional UPDATE matched nothing: either the operation does
        // not exist, or it already carries a correlation id.
        match Self::find_by_id(pool, operation_id).await? {
            Some(_) => Err(DbError::AlreadyBound { operation_id }),
            None => Err(DbError::NotFound(format!("Operation {operation_id}"))),
        }
    }

    /// Move a pending operation to a terminal status.
    ///
    /// Returns `None` if the operation was not in `pending` (duplicate
    /// callback, or unknown id) — the row is left exactly as it was.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_terminal(
        pool: &PgPool,
        id: Uuid,
        status: OperationStatus,
        result_code: Option<i32>,
        result_description: Option<&str>,
        receipt_number: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
        response_snapshot: Option<&serde_json::Value>,
    ) -> Result<Option<Self>, DbError> {
        let op = sqlx::query_as::<_, Operation>(
            r"
            UPDATE operations
            SET status = $2,
                result_code = $3,
                result_description = $4,
                receipt_number = $5,
                completed_at = $6,
                response_snapshot = $7,
                updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(status)
        .bind(result_code)
        .bind(result_description)
        .bind(receipt_number)
        .bind(completed_at)
        .bind(response_snapshot)
        .fetch_optional(pool)
        .await?;

        Ok(op)
    }

    /// Find pending operations created before `cutoff`, oldest first.
    ///
    /// Used by the expiry sweep: a pending operation the network never
    /// called back about is eventually timed out.
    pub async fn find_stale_pending(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let ops = sqlx::query_as::<_, Operation>(
            r"
            SELECT * FROM operations
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            ",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(OperationStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_status_as_str_matches_serde() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Cancelled,
            OperationStatus::TimedOut,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_kind_as_str_matches_serde() {
        for kind in [
            OperationKind::PushPayment,
            OperationKind::MerchantCollection,
            OperationKind::Disbursement,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OperationStatus::default(), OperationStatus::Pending);
    }
}
