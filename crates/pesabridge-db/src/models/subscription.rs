//! Client subscription entity model.
//!
//! Per-client mapping from notification kind to a registered endpoint plus a
//! signing secret (AES-256-GCM encrypted at rest). Subscription management
//! belongs to the account service; this core reads but never writes them.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::notification::NotificationKind;

/// A client's registration for one notification kind.
#[derive(Debug, Clone, FromRow)]
pub struct ClientSubscription {
    /// Internal unique identifier.
    pub id: Uuid,

    /// Owning client.
    pub client_id: Uuid,

    /// The notification kind this registration covers.
    pub kind: NotificationKind,

    /// Destination endpoint URL.
    pub destination_url: String,

    /// Signing secret, AES-256-GCM encrypted, base64-encoded.
    ///
    /// A subscription without a secret cannot receive verifiable webhooks;
    /// the delivery engine treats that as a permanent failure.
    pub secret_encrypted: Option<String>,

    /// Inactive subscriptions are ignored by the callback adapter.
    pub active: bool,

    pub created_at: DateTime<Utc>,
}

impl ClientSubscription {
    /// Find the active subscription for a client and notification kind.
    pub async fn find_for(
        pool: &PgPool,
        client_id: Uuid,
        kind: NotificationKind,
    ) -> Result<Option<Self>, DbError> {
        let sub = sqlx::query_as::<_, ClientSubscription>(
            r"
            SELECT * FROM client_subscriptions
            WHERE client_id = $1 AND kind = $2 AND active
            LIMIT 1
            ",
        )
        .bind(client_id)
        .bind(kind)
        .fetch_optional(pool)
        .await?;

        Ok(sub)
    }
}
