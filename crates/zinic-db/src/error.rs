//! Database-specific error types and conversions.

use zinic_core::error::ZinicError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record already exists: {entity} {id}")]
    Conflict { entity: String, id: String },

    #[error("Invalid filter field: {0}")]
    InvalidField(String),
}

impl DbError {
    /// Classify a failed statement. Duplicate record ids and unique-index
    /// violations surface as [`DbError::Conflict`].
    pub(crate) fn from_statement(message: String) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("already exists") || lowered.contains("already contains") {
            DbError::Conflict {
                entity: "record".into(),
                id: message,
            }
        } else {
            DbError::Query(message)
        }
    }
}

impl From<DbError> for ZinicError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict { entity, id } => ZinicError::AlreadyExists { entity, id },
            DbError::InvalidField(field) => {
                ZinicError::validation(format!("invalid filter field: {field}"))
            }
            other => ZinicError::RemoteUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_messages_become_conflicts() {
        let err = DbError::from_statement(
            "Database index `idx_users_client_username` already contains ['GRAND01', 'asha']"
                .into(),
        );
        assert!(matches!(err, DbError::Conflict { .. }));
        let err = DbError::from_statement("Parse error".into());
        assert!(matches!(err, DbError::Query(_)));
    }

    #[test]
    fn conversion_keeps_conflicts_and_hides_driver_errors() {
        let conflict: ZinicError = DbError::Conflict {
            entity: "record".into(),
            id: "users:asha".into(),
        }
        .into();
        assert!(matches!(conflict, ZinicError::AlreadyExists { .. }));

        let field: ZinicError = DbError::InvalidField("client id".into()).into();
        assert!(matches!(field, ZinicError::Validation { .. }));

        let other: ZinicError = DbError::Query("connection reset".into()).into();
        assert!(matches!(other, ZinicError::RemoteUnavailable(_)));
    }
}
