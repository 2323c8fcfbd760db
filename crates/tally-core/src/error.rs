//! Error types for Tally

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data failed to decode (bad MCC list, corrupt row). The request
    /// was fine; the store is not.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Malformed input: empty ids, a custom category used as a base, an empty
    /// transaction list. The caller corrects the input and retries.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The default/fallback built-in category is missing (or the seed set is
    /// malformed). Not retryable: no operation can keep every transaction
    /// categorized without it.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A concurrent mutation invalidated the operation's assumptions. The whole
    /// unit has been rolled back; retrying with fresh state is safe.
    #[error("Consistency conflict: {0}")]
    ConsistencyConflict(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a caller on the other side of an API boundary should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was wrong (validation, missing resource)
    BadRequest,
    /// Something is wrong on our side (configuration, store, conflict)
    ServerFault,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NotFound(_) => ErrorKind::BadRequest,
            _ => ErrorKind::ServerFault,
        }
    }

    /// Whether retrying the same call with fresh state can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConsistencyConflict(_))
    }

    /// Message safe to show outside the process (no SQL or pool details)
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::ConsistencyConflict(_) => {
                "The data changed while the request was processed. Please retry.".to_string()
            }
            Self::Configuration(_) => {
                "The service is misconfigured. An operator has to fix it.".to_string()
            }
            _ => "An unexpected error occurred.".to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("no matching row".to_string()),
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Error::ConsistencyConflict(
                    message
                        .clone()
                        .unwrap_or_else(|| "database is busy".to_string()),
                )
            }
            // 787 is SQLITE_CONSTRAINT_FOREIGNKEY: a referenced row vanished
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.extended_code == 787 =>
            {
                Error::ConsistencyConflict(
                    message
                        .clone()
                        .unwrap_or_else(|| "foreign key constraint failed".to_string()),
                )
            }
            error => {
                tracing::error!("unhandled SQL error: {}", error);
                Error::Database(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            Error::Validation("x".into()).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::BadRequest);
        assert_eq!(
            Error::Configuration("x".into()).kind(),
            ErrorKind::ServerFault
        );
        assert_eq!(
            Error::ConsistencyConflict("x".into()).kind(),
            ErrorKind::ServerFault
        );
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        let failure = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY);
        let err: Error = rusqlite::Error::SqliteFailure(failure, None).into();
        assert!(matches!(err, Error::ConsistencyConflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_public_message_hides_store_details() {
        let err = Error::Database(rusqlite::Error::InvalidQuery);
        assert_eq!(err.kind(), ErrorKind::ServerFault);
        assert!(!err.public_message().contains("query"));
    }

    #[test]
    fn test_invalid_stored_data_is_server_fault() {
        let err = Error::InvalidData("category 12 has mcc_codes 'abc'".into());
        assert_eq!(err.kind(), ErrorKind::ServerFault);
        assert!(!err.is_retryable());
        assert_eq!(err.public_message(), "An unexpected error occurred.");
    }
}
