//! Delivery engine: one signed HTTP transmission per call.
//!
//! `deliver` makes exactly one delivery attempt for a notification and
//! decides its next status. Every status transition is persisted before the
//! call returns, so a concurrent status query observes either the
//! pre-attempt or the fully updated post-attempt state. The engine does not
//! lock; per-notification serialization is the caller's job (see
//! [`crate::dispatch`] and [`crate::scheduler`], which take the advisory
//! claim before invoking the engine).

use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use pesabridge_core::NotificationId;
use pesabridge_db::models::{ClientSubscription, Notification, NotificationStatus};

use crate::crypto;
use crate::error::NotifyError;
use crate::validation::validate_destination_url;

/// Header carrying the hex-encoded HMAC-SHA256 over the request body.
pub const SIGNATURE_HEADER: &str = "X-Pesabridge-Signature";

/// Header carrying the delivery timestamp (RFC3339).
pub const TIMESTAMP_HEADER: &str = "X-Pesabridge-Timestamp";

/// Header carrying the notification id.
pub const NOTIFICATION_ID_HEADER: &str = "X-Pesabridge-Notification-Id";

/// Default attempt ceiling before a notification is failed permanently.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default per-request timeout; a hung client endpoint must not block the
/// engine indefinitely.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies are stored truncated to this many characters.
const MAX_STORED_BODY_CHARS: usize = 4096;

/// Delivery engine configuration, passed in at construction so tests can
/// exercise different ceilings without process-wide state.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempt ceiling; reaching it turns a failure permanent.
    pub max_attempts: i32,
    /// Outbound request timeout.
    pub request_timeout: Duration,
    /// Accept plain-HTTP and internal-host destinations (dev/test only).
    pub allow_insecure_urls: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allow_insecure_urls: false,
        }
    }
}

/// Structured result of one `deliver` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The notification was already `sent` or `failed_permanent`; nothing
    /// was attempted and the attempt counter is unchanged.
    AlreadyTerminal(NotificationStatus),
    /// The endpoint answered 2xx; the notification is now `sent`.
    Delivered { attempts: i32, response_code: i16 },
    /// The attempt failed; the notification is `failed` and retry-eligible.
    Retrying { attempts: i32 },
    /// The attempt failed permanently (ceiling reached, missing secret, or
    /// invalid destination); never retried.
    PermanentlyFailed { attempts: i32, reason: String },
}

/// Raw outcome of one HTTP transmission.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// HTTP status code, if a response arrived.
    pub response_code: Option<i16>,
    /// Response body (truncated), if a response arrived.
    pub response_body: Option<String>,
    /// Transport or HTTP error description on failure.
    pub error: Option<String>,
}

impl AttemptResult {
    /// A delivery succeeds if and only if the endpoint answered 2xx,
    /// regardless of body content.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.response_code, Some(code) if (200..300).contains(&code))
    }
}

/// The status a failed attempt lands in: `failed` while below the ceiling,
/// `failed_permanent` once `attempts` reaches it.
#[must_use]
pub fn next_failure_status(attempts: i32, max_attempts: i32) -> NotificationStatus {
    if attempts >= max_attempts {
        NotificationStatus::FailedPermanent
    } else {
        NotificationStatus::Failed
    }
}

/// Transmit a signed notification body to a destination URL.
///
/// Sends the payload bytes verbatim with the signature, timestamp, and
/// notification-id headers. Never panics; transport errors are folded into
/// the returned [`AttemptResult`].
pub async fn post_notification(
    client: &Client,
    url: &str,
    notification_id: NotificationId,
    signature: &str,
    body: Vec<u8>,
) -> AttemptResult {
    let timestamp = Utc::now().to_rfc3339();

    let result = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(TIMESTAMP_HEADER, timestamp)
        .header(NOTIFICATION_ID_HEADER, notification_id.to_string())
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = response.status().as_u16() as i16;
            let body = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_STORED_BODY_CHARS)
                .collect::<String>();

            let error = if (200..300).contains(&status) {
                None
            } else {
                Some(format!("HTTP {status}"))
            };

            AttemptResult {
                response_code: Some(status),
                response_body: Some(body),
                error,
            }
        }
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timed out".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {e}")
            } else {
                format!("Request error: {e}")
            };

            AttemptResult {
                response_code: None,
                response_body: None,
                error: Some(error),
            }
        }
    }
}

/// Engine performing signed notification deliveries.
#[derive(Clone)]
pub struct DeliveryEngine {
    pool: PgPool,
    http: Client,
    encryption_key: Vec<u8>,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Create an engine with a shared HTTP client bound to the configured
    /// request timeout.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Internal` if the HTTP client cannot be built.
    pub fn new(
        pool: PgPool,
        encryption_key: Vec<u8>,
        config: DeliveryConfig,
    ) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("pesabridge-notify/0.3")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| NotifyError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http,
            encryption_key,
            config,
        })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Get a reference to the connection pool (for the scheduler).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attempt exactly one delivery of a notification.
    ///
    /// Returns a structured [`DeliveryOutcome`]; only storage failures and
    /// other unexpected conditions surface as `Err`.
    pub async fn deliver(&self, notification_id: Uuid) -> Result<DeliveryOutcome, NotifyError> {
        let notification = Notification::find_by_id(&self.pool, notification_id)
            .await?
            .ok_or(NotifyError::NotificationNotFound)?;

        // Idempotence guard against re-entrant retries: terminal records are
        // untouchable, attempt counter included.
        if notification.status.is_terminal() {
            tracing::debug!(
                target: "notification_delivery",
                notification_id = %notification_id,
                status = notification.status.as_str(),
                "Skipping delivery of terminal notification"
            );
            return Ok(DeliveryOutcome::AlreadyTerminal(notification.status));
        }

        // A client without a signing secret cannot receive verifiable
        // webhooks; fail permanently rather than deliver unsigned.
        let subscription =
            ClientSubscription::find_for(&self.pool, notification.client_id, notification.kind)
                .await?;
        let Some(secret_encrypted) = subscription.and_then(|s| s.secret_encrypted) else {
            let reason = NotifyError::NoSigningSecret {
                client_id: notification.client_id(),
            }
            .to_string();
            return self
                .fail_permanently(&notification, reason)
                .await;
        };
        let secret = crypto::decrypt_secret(&secret_encrypted, &self.encryption_key)?;

        if let Err(e) =
            validate_destination_url(&notification.destination_url, self.config.allow_insecure_urls)
        {
            return self.fail_permanently(&notification, e.to_string()).await;
        }

        // Persist the in-flight marker before transmitting: attempts + 1,
        // last_attempt_at stamped, status back to pending. A crash from here
        // on leaves the record visibly attempted, not silently stuck.
        let Some(notification) = Notification::begin_attempt(&self.pool, notification_id).await?
        else {
            // Raced with another path that finished the notification.
            let current = Notification::find_by_id(&self.pool, notification_id)
                .await?
                .ok_or(NotifyError::NotificationNotFound)?;
            return Ok(DeliveryOutcome::AlreadyTerminal(current.status));
        };

        let body = serde_json::to_vec(&notification.payload)
            .map_err(|e| NotifyError::Internal(format!("Failed to serialize payload: {e}")))?;
        let signature = crypto::sign_payload(&secret, &body);

        let result = post_notification(
            &self.http,
            &notification.destination_url,
            notification.notification_id(),
            &signature,
            body,
        )
        .await;

        if result.is_success() {
            let response_code = result.response_code.unwrap_or(200);
            Notification::mark_sent(
                &self.pool,
                notification_id,
                response_code,
                result.response_body.as_deref(),
            )
            .await?;

            tracing::info!(
                target: "notification_delivery",
                notification_id = %notification_id,
                client_id = %notification.client_id,
                kind = notification.kind.as_str(),
                response_code,
                attempts = notification.attempts,
                "Notification delivered"
            );

            return Ok(DeliveryOutcome::Delivered {
                attempts: notification.attempts,
                response_code,
            });
        }

        let error_msg = result
            .error
            .clone()
            .unwrap_or_else(|| "Delivery failed".to_string());
        let next_status = next_failure_status(notification.attempts, self.config.max_attempts);
        let permanent = next_status == NotificationStatus::FailedPermanent;

        Notification::mark_failed(
            &self.pool,
            notification_id,
            &error_msg,
            result.response_code,
            result.response_body.as_deref(),
            permanent,
        )
        .await?;

        tracing::warn!(
            target: "notification_delivery",
            notification_id = %notification_id,
            client_id = %notification.client_id,
            kind = notification.kind.as_str(),
            error = %error_msg,
            attempts = notification.attempts,
            max_attempts = self.config.max_attempts,
            permanent,
            "Notification delivery failed"
        );

        if permanent {
            Ok(DeliveryOutcome::PermanentlyFailed {
                attempts: notification.attempts,
                reason: error_msg,
            })
        } else {
            Ok(DeliveryOutcome::Retrying {
                attempts: notification.attempts,
            })
        }
    }

    /// Record an unrecoverable pre-transmission failure. The attempt counter
    /// is not incremented: nothing was transmitted.
    async fn fail_permanently(
        &self,
        notification: &Notification,
        reason: String,
    ) -> Result<DeliveryOutcome, NotifyError> {
        Notification::mark_failed(&self.pool, notification.id, &reason, None, None, true).await?;

        tracing::warn!(
            target: "notification_delivery",
            notification_id = %notification.id,
            client_id = %notification.client_id,
            reason = %reason,
            "Notification failed permanently before transmission"
        );

        Ok(DeliveryOutcome::PermanentlyFailed {
            attempts: notification.attempts,
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
