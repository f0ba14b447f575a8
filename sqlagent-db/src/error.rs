use sqlagent_core::SqlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("tables not found in database: {}", .0.join(", "))]
    UnknownTables(Vec<String>),
}

impl From<DatabaseError> for SqlError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Connection(source) | DatabaseError::Query(source) => {
                classify(source)
            }
            other => SqlError::Unavailable(other.to_string()),
        }
    }
}

/// Splits driver errors into engine rejections, which the agent feeds back
/// to the model, and connectivity problems, which abort the question.
pub(crate) fn classify(error: sqlx::Error) -> SqlError {
    match error {
        sqlx::Error::Database(db_error) => SqlError::Execution(db_error.message().to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => SqlError::Execution(error.to_string()),
        other => SqlError::Unavailable(other.to_string()),
    }
}
