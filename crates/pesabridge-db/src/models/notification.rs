//! Outbound notification entity model.
//!
//! One row per delivery obligation owed to a client endpoint. The payload is
//! a snapshot of the operation outcome, frozen at creation; everything else
//! (status, attempt counter, last response) is mutated only by the delivery
//! engine. Rows are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Type};
use uuid::Uuid;

use pesabridge_core::{ClientId, NotificationId};

use crate::error::DbError;
use crate::models::operation::OperationKind;

/// What kind of outcome a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PushPaymentResult,
    MerchantCollectionResult,
    DisbursementResult,
    /// Out-of-band event: a pending operation expired without a callback.
    OperationExpired,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushPaymentResult => "push_payment_result",
            Self::MerchantCollectionResult => "merchant_collection_result",
            Self::DisbursementResult => "disbursement_result",
            Self::OperationExpired => "operation_expired",
        }
    }

    /// The notification kind that mirrors an operation kind.
    #[must_use]
    pub fn for_operation(kind: OperationKind) -> Self {
        match kind {
            OperationKind::PushPayment => Self::PushPaymentResult,
            OperationKind::MerchantCollection => Self::MerchantCollectionResult,
            OperationKind::Disbursement => Self::DisbursementResult,
        }
    }
}

/// Delivery status of a notification.
///
/// `Sent` and `FailedPermanent` are terminal: once reached, the attempt
/// counter never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Type, Serialize, Deserialize)]
#[sqlx(type_name = "notification_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Awaiting the first attempt, or with an attempt in flight.
    #[default]
    Pending,
    /// Delivered: the endpoint answered 2xx.
    Sent,
    /// Last attempt failed; eligible for retry.
    Failed,
    /// Retry ceiling reached or unrecoverable condition; never retried.
    FailedPermanent,
}

impl NotificationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::FailedPermanent => "failed_permanent",
        }
    }

    /// True once no further delivery attempts may occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::FailedPermanent)
    }

    /// Parse a status from its wire string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "failed_permanent" => Some(Self::FailedPermanent),
            _ => None,
        }
    }
}

/// An outbound delivery obligation.
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    /// Internal unique identifier.
    pub id: Uuid,

    /// Owning client.
    pub client_id: Uuid,

    /// The operation this notification reports on, if any.
    pub operation_id: Option<Uuid>,

    /// Notification kind.
    pub kind: NotificationKind,

    /// Delivery status.
    pub status: NotificationStatus,

    /// Outcome snapshot; serialized verbatim as the delivery body.
    pub payload: serde_json::Value,

    /// Client-registered endpoint URL, snapshotted at creation.
    pub destination_url: String,

    /// Number of delivery attempts made so far.
    pub attempts: i32,

    /// When the last attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// HTTP status code of the last transport response, if one arrived.
    pub response_code: Option<i16>,

    /// Body of the last transport response, truncated.
    pub response_body: Option<String>,

    /// Last transport error message.
    pub last_error: Option<String>,

    /// Advisory delivery lease; only the claim holder may attempt delivery.
    pub claimed_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a notification record.
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub client_id: Uuid,
    pub operation_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub destination_url: String,
}

impl Notification {
    /// Get the notification ID as a typed [`NotificationId`].
    #[must_use]
    pub fn notification_id(&self) -> NotificationId {
        NotificationId::from_uuid(self.id)
    }

    /// Get the owning client ID as a typed [`ClientId`].
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        ClientId::from_uuid(self.client_id)
    }

    /// Create a new notification in `pending` status with zero attempts.
    pub async fn create(pool: &PgPool, input: CreateNotification) -> Result<Self, DbError> {
        let n = sqlx::query_as::<_, Notification>(
            r"
            INSERT INTO notifications (client_id, operation_id, kind, payload, destination_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(input.client_id)
        .bind(input.operation_id)
        .bind(input.kind)
        .bind(&input.payload)
        .bind(&input.destination_url)
        .fetch_one(pool)
        .await?;

        Ok(n)
    }

    /// Find a notification by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let n = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(n)
    }

    /// List notifications for a client, newest first.
    pub async fn list_by_client(
        pool: &PgPool,
        client_id: Uuid,
        status: Option<NotificationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Notification>(
            r"
            SELECT * FROM notifications
            WHERE client_id = $1 AND ($2::notification_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(client_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Count notifications for a client, with an optional status filter.
    pub async fn count_by_client(
        pool: &PgPool,
        client_id: Uuid,
        status: Option<NotificationStatus>,
    ) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM notifications
            WHERE client_id = $1 AND ($2::notification_status IS NULL OR status = $2)
            ",
        )
        .bind(client_id)
        .bind(status)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Try to take the advisory delivery lease on a notification.
    ///
    /// Conditional UPDATE that only one concurrent caller can win; returns
    /// `false` when the lease is held elsewhere or the notification is
    /// already terminal. Losing the claim is not an error.
    pub async fn claim(pool: &PgPool, id: Uuid, lease_secs: i64) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET claimed_until = $2, updated_at = $3
            WHERE id = $1
              AND status IN ('pending', 'failed')
              AND (claimed_until IS NULL OR claimed_until < $3)
            ",
        )
        .bind(id)
        .bind(now + chrono::Duration::seconds(lease_secs))
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the start of a delivery attempt.
    ///
    /// Increments the attempt counter, stamps `last_attempt_at`, and sets
    /// status back to `pending` as the in-flight marker — persisted before
    /// the network call, so a crash mid-delivery leaves the record visibly
    /// attempted. Returns `None` when the notification is already terminal.
    pub async fn begin_attempt(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        let n = sqlx::query_as::<_, Notification>(
            r"
            UPDATE notifications
            SET attempts = attempts + 1,
                status = 'pending',
                last_attempt_at = now(),
                updated_at = now()
            WHERE id = $1 AND status NOT IN ('sent', 'failed_permanent')
            RETURNING *
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(n)
    }

    /// Record a successful delivery. Terminal; releases the lease.
    pub async fn mark_sent(
        pool: &PgPool,
        id: Uuid,
        response_code: i16,
        response_body: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"
            UPDATE notifications
            SET status = 'sent',
                response_code = $2,
                response_body = $3,
                last_error = NULL,
                claimed_until = NULL,
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(response_body)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a failed delivery attempt and release the lease.
    ///
    /// `permanent` selects `failed_permanent` (ceiling reached or
    /// unrecoverable) over the retryable `failed`.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        response_code: Option<i16>,
        response_body: Option<&str>,
        permanent: bool,
    ) -> Result<(), DbError> {
        let status = if permanent {
            NotificationStatus::FailedPermanent
        } else {
            NotificationStatus::Failed
        };

        sqlx::query(
            r"
            UPDATE notifications
            SET status = $2,
                last_error = $3,
                response_code = $4,
                response_body = $5,
                claimed_until = NULL,
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(response_code)
        .bind(response_body)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Find notifications that may be retry-eligible, oldest last-attempt
    /// first.
    ///
    /// Two populations: failed rows below the attempt ceiling whose last
    /// attempt predates the cutoff, and pending rows that never saw an
    /// attempt. The second catches notifications whose in-process dispatch
    /// handoff was lost (full queue, stopped dispatcher, restart); past the
    /// cutoff age, storage is the only record of the obligation. The caller
    /// applies its backoff policy on top, so per-attempt schedules can be
    /// substituted without a schema change. `failed_permanent` is never
    /// selected.
    pub async fn find_retry_candidates(
        pool: &PgPool,
        max_attempts: i32,
        attempted_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Notification>(
            r"
            SELECT * FROM notifications
            WHERE (status = 'failed' AND attempts < $1 AND last_attempt_at <= $2)
               OR (status = 'pending' AND last_attempt_at IS NULL AND created_at <= $2)
            ORDER BY last_attempt_at ASC NULLS FIRST
            LIMIT $3
            ",
        )
        .bind(max_attempts)
        .bind(attempted_before)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
