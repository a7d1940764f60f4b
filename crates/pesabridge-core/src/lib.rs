//! pesabridge core library.
//!
//! Shared types for the pesabridge payment broker.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (ClientId, OperationId, NotificationId)

pub mod ids;

pub use ids::{ClientId, NotificationId, OperationId};
