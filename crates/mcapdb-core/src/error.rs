//! Error types for lookup operations.
//!
//! This module defines [`LookupError`] which covers every failure that can occur
//! between receiving a spreadsheet call and returning a value: input validation,
//! missing rows, store access, configuration and call logging.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::EntityId;

/// Errors that can occur during lookup operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// A caller-supplied argument was malformed. Raised before any I/O.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The key is well formed but the store holds no matching row.
    #[error("Data not found for entity {entity_id} on {date}")]
    NotFound {
        /// The entity that was requested.
        entity_id: EntityId,
        /// The date that was requested.
        date: NaiveDate,
    },

    /// The relational store could not be reached or the query failed.
    #[error("Database error: {0}")]
    StoreUnavailable(String),

    /// The configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The call log could not be written.
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type alias using [`LookupError`].
pub type Result<T> = std::result::Result<T, LookupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LookupError::NotFound {
            entity_id: EntityId::new(42).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        };
        assert_eq!(err.to_string(), "Data not found for entity 42 on 2024-01-15");

        let err = LookupError::StoreUnavailable("unable to open database file".to_string());
        assert_eq!(
            err.to_string(),
            "Database error: unable to open database file"
        );
    }
}
