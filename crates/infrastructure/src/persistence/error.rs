//! Shared error mapping for the sqlx persistence layer

use application::ApplicationError;

/// Map a sqlx error to an application-layer error
pub fn map_sqlx_error(e: sqlx::Error) -> ApplicationError {
    match e {
        sqlx::Error::RowNotFound => {
            ApplicationError::NotFound("Database record not found".to_string())
        },
        sqlx::Error::Database(db_err) => ApplicationError::Database(db_err.to_string()),
        other => ApplicationError::Database(other.to_string()),
    }
}
