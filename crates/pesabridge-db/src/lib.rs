//! pesabridge persistence layer.
//!
//! Postgres-backed entity models for payment operations, outbound
//! notifications, and client subscriptions. Query methods take a `&PgPool`
//! and return typed rows; status transitions are enforced with conditional
//! UPDATEs so invariants hold under concurrent access.

pub mod error;
pub mod models;

pub use error::DbError;

/// Embedded SQL migrations, applied at startup with `MIGRATOR.run(&pool)`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
