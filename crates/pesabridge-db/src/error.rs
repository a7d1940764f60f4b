//! Error types for the pesabridge-db crate.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An operation already carries a correlation identifier.
    ///
    /// Binding is one-shot; a second bind is rejected so that a duplicate
    /// network submission cannot silently re-point the operation.
    #[error("Operation {operation_id} is already bound to a correlation identifier")]
    AlreadyBound { operation_id: uuid::Uuid },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// Check if this error indicates a rejected duplicate correlation bind.
    #[must_use]
    pub fn is_already_bound(&self) -> bool {
        matches!(self, DbError::AlreadyBound { .. })
    }

    /// Check if this error indicates a missing row.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_bound_display_names_the_operation() {
        let id = uuid::Uuid::new_v4();
        let err = DbError::AlreadyBound { operation_id: id };
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.is_already_bound());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_display() {
        let err = DbError::NotFound("Operation".to_string());
        assert_eq!(err.to_string(), "Not found: Operation");
        assert!(err.is_not_found());
    }
}
