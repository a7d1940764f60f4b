//! Notification delivery subsystem for the pesabridge payment broker.
//!
//! Receives opaque result callbacks from the payment network, correlates
//! them to previously issued operations, and forwards HMAC-SHA256 signed
//! notifications to client-registered endpoints with bounded retry and
//! failure escalation.

pub mod callback;
pub mod crypto;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod scheduler;
pub mod validation;

pub use callback::CallbackAdapter;
pub use delivery::{DeliveryConfig, DeliveryEngine, DeliveryOutcome};
pub use dispatch::{delivery_channel, DeliveryDispatcher, DeliveryQueue};
pub use error::NotifyError;
pub use models::{NetworkCallback, NotificationPayload};
pub use router::{notify_router, NotifyState};
pub use scheduler::{BackoffPolicy, FixedCooldown, RetryScheduler, SchedulerConfig};
