//! Periodic retry sweep and stale-operation expiry.
//!
//! The scheduler re-drives `failed` notifications once their backoff delay
//! elapses, and times out pending operations the network never called back
//! about. Both sweeps isolate per-item failures: one broken record never
//! stalls the rest of the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;

use pesabridge_db::models::{
    ClientSubscription, CreateNotification, Notification, NotificationKind, Operation,
    OperationStatus,
};

use crate::delivery::DeliveryEngine;
use crate::dispatch::DeliveryQueue;
use crate::error::NotifyError;
use crate::models::NotificationPayload;

/// Default delay between a failed attempt and its retry.
pub const DEFAULT_RETRY_COOLDOWN_SECS: i64 = 300;

/// Default interval between scheduler sweeps.
pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(30);

/// Default age after which a pending operation is considered abandoned.
pub const DEFAULT_OPERATION_TTL_SECS: i64 = 3600;

/// Decides when a failed notification becomes eligible for another attempt.
///
/// The sweep query uses [`min_delay`](BackoffPolicy::min_delay) as a coarse
/// SQL cutoff and then applies [`next_eligible`](BackoffPolicy::next_eligible)
/// per candidate, so per-attempt schedules (exponential, jittered) can be
/// swapped in without touching the storage layer.
pub trait BackoffPolicy: Send + Sync {
    /// Earliest instant the next attempt may run, given the attempt count and
    /// the time of the last attempt.
    fn next_eligible(&self, attempts: i32, last_attempt_at: DateTime<Utc>) -> DateTime<Utc>;

    /// Lower bound of the delay across all attempt counts.
    fn min_delay(&self) -> Duration;
}

/// Flat cooldown between attempts, independent of the attempt count.
#[derive(Debug, Clone)]
pub struct FixedCooldown {
    cooldown: Duration,
}

impl FixedCooldown {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }
}

impl Default for FixedCooldown {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RETRY_COOLDOWN_SECS))
    }
}

impl BackoffPolicy for FixedCooldown {
    fn next_eligible(&self, _attempts: i32, last_attempt_at: DateTime<Utc>) -> DateTime<Utc> {
        last_attempt_at + self.cooldown
    }

    fn min_delay(&self) -> Duration {
        self.cooldown
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between sweeps.
    pub sweep_interval: StdDuration,
    /// Maximum records processed per sweep.
    pub batch_size: i64,
    /// Advisory lease duration taken before each retry attempt.
    pub claim_lease_secs: i64,
    /// Age after which a pending operation is expired to `timed_out`.
    pub operation_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            batch_size: 50,
            claim_lease_secs: 60,
            operation_ttl: Duration::seconds(DEFAULT_OPERATION_TTL_SECS),
        }
    }
}

/// Background scheduler driving retries and operation expiry.
pub struct RetryScheduler {
    pool: PgPool,
    engine: Arc<DeliveryEngine>,
    queue: DeliveryQueue,
    policy: Box<dyn BackoffPolicy>,
    config: SchedulerConfig,
    shutdown: AtomicBool,
}

impl RetryScheduler {
    pub fn new(
        pool: PgPool,
        engine: Arc<DeliveryEngine>,
        queue: DeliveryQueue,
        policy: Box<dyn BackoffPolicy>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pool,
            engine,
            queue,
            policy,
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signal the run loop to stop after the current sweep.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Run sweeps at the configured interval until shutdown.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            target: "notification_delivery",
            interval_secs = self.config.sweep_interval.as_secs(),
            cooldown_secs = self.policy.min_delay().num_seconds(),
            "Retry scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.sweep().await {
                Ok(retried) if retried > 0 => {
                    tracing::info!(
                        target: "notification_delivery",
                        retried,
                        "Retry sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        target: "notification_delivery",
                        error = %e,
                        "Retry sweep failed"
                    );
                }
            }

            match self.expire_stale_operations().await {
                Ok(expired) if expired > 0 => {
                    tracing::info!(
                        target: "notification_delivery",
                        expired,
                        "Operation expiry sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        target: "notification_delivery",
                        error = %e,
                        "Operation expiry sweep failed"
                    );
                }
            }
        }

        tracing::info!(target: "notification_delivery", "Retry scheduler stopped");
    }

    /// Retry eligible failed notifications. Returns the number of
    /// notifications a retry attempt was made for.
    pub async fn sweep(&self) -> Result<usize, NotifyError> {
        let now = Utc::now();
        let candidates = Notification::find_retry_candidates(
            &self.pool,
            self.engine.config().max_attempts,
            now - self.policy.min_delay(),
            self.config.batch_size,
        )
        .await?;

        let mut retried = 0;

        for candidate in candidates {
            // No last_attempt_at means a stranded first delivery (the
            // dispatch handoff was lost); the SQL cutoff already aged it
            // past the delay floor, so it goes straight to an attempt.
            if let Some(last_attempt_at) = candidate.last_attempt_at {
                if self.policy.next_eligible(candidate.attempts, last_attempt_at) > now {
                    continue;
                }
            }

            // Lease first; losing the claim means another worker has it.
            match Notification::claim(&self.pool, candidate.id, self.config.claim_lease_secs).await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(
                        target: "notification_delivery",
                        notification_id = %candidate.id,
                        error = %e,
                        "Failed to claim notification for retry"
                    );
                    continue;
                }
            }

            match self.engine.deliver(candidate.id).await {
                Ok(outcome) => {
                    retried += 1;
                    tracing::debug!(
                        target: "notification_delivery",
                        notification_id = %candidate.id,
                        outcome = ?outcome,
                        "Retry attempt finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target: "notification_delivery",
                        notification_id = %candidate.id,
                        error = %e,
                        "Retry attempt errored"
                    );
                }
            }
        }

        Ok(retried)
    }

    /// Time out pending operations older than the configured TTL and emit
    /// `operation_expired` notifications to subscribed clients.
    pub async fn expire_stale_operations(&self) -> Result<usize, NotifyError> {
        let cutoff = Utc::now() - self.config.operation_ttl;
        let stale =
            Operation::find_stale_pending(&self.pool, cutoff, self.config.batch_size).await?;

        let mut expired = 0;

        for operation in stale {
            match self.expire_one(operation).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "notification_delivery",
                        error = %e,
                        "Failed to expire stale operation"
                    );
                }
            }
        }

        Ok(expired)
    }

    async fn expire_one(&self, operation: Operation) -> Result<bool, NotifyError> {
        let Some(operation) = Operation::mark_terminal(
            &self.pool,
            operation.id,
            OperationStatus::TimedOut,
            None,
            Some("Expired awaiting network result"),
            None,
            None,
            None,
        )
        .await?
        else {
            // Lost the race with a late callback; the callback wins.
            return Ok(false);
        };

        tracing::warn!(
            target: "notification_delivery",
            operation_id = %operation.id,
            client_id = %operation.client_id,
            kind = operation.kind.as_str(),
            "Expired stale pending operation"
        );

        let Some(subscription) = ClientSubscription::find_for(
            &self.pool,
            operation.client_id,
            NotificationKind::OperationExpired,
        )
        .await?
        else {
            return Ok(true);
        };

        let payload = NotificationPayload {
            kind: NotificationKind::OperationExpired,
            operation_id: Some(operation.operation_id()),
            status: OperationStatus::TimedOut,
            amount: operation.amount,
            msisdn: operation.msisdn.clone(),
            result_code: None,
            result_description: operation.result_description.clone(),
            receipt_number: None,
            completed_at: None,
            metadata: operation.metadata.clone(),
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| NotifyError::Internal(format!("Failed to serialize payload: {e}")))?;

        let notification = Notification::create(
            &self.pool,
            CreateNotification {
                client_id: operation.client_id,
                operation_id: Some(operation.id),
                kind: NotificationKind::OperationExpired,
                payload,
                destination_url: subscription.destination_url,
            },
        )
        .await?;

        self.queue.enqueue(notification.id);

        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_cooldown_next_eligible() {
        let policy = FixedCooldown::new(Duration::seconds(300));
        let last = Utc::now();
        assert_eq!(policy.next_eligible(1, last), last + Duration::seconds(300));
    }

    #[test]
    fn test_fixed_cooldown_ignores_attempt_count() {
        let policy = FixedCooldown::new(Duration::seconds(300));
        let last = Utc::now();
        assert_eq!(policy.next_eligible(1, last), policy.next_eligible(4, last));
    }

    #[test]
    fn test_fixed_cooldown_min_delay() {
        let policy = FixedCooldown::new(Duration::seconds(120));
        assert_eq!(policy.min_delay(), Duration::seconds(120));
    }

    #[test]
    fn test_default_cooldown_is_five_minutes() {
        let policy = FixedCooldown::default();
        assert_eq!(policy.min_delay(), Duration::seconds(300));
    }

    #[test]
    fn test_eligibility_boundary() {
        let policy = FixedCooldown::new(Duration::seconds(300));
        let now = Utc::now();

        let just_failed = now - Duration::seconds(10);
        assert!(policy.next_eligible(1, just_failed) > now);

        let cooled_down = now - Duration::seconds(301);
        assert!(policy.next_eligible(1, cooled_down) <= now);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.claim_lease_secs, 60);
        assert_eq!(
            config.operation_ttl,
            Duration::seconds(DEFAULT_OPERATION_TTL_SECS)
        );
    }
}
