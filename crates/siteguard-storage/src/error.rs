use siteguard_common::period::Period;

/// Errors that can occur within the trigger log.
///
/// # Examples
///
/// ```rust
/// use siteguard_storage::error::StorageError;
/// use siteguard_common::period::{Granularity, Period};
///
/// let err = StorageError::DuplicateTrigger {
///     rule_id: 3,
///     site_id: 7,
///     period: Period::new(
///         Granularity::Day,
///         chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     ),
/// };
/// assert!(err.to_string().contains("rule 3"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The trigger identity tuple already exists. At most one record is
    /// ever written per (rule, site, period); concurrent workers racing
    /// on the same tuple see this instead of a second row.
    #[error("storage: duplicate trigger for rule {rule_id}, site {site_id}, {} starting {}", period.granularity, period.start)]
    DuplicateTrigger {
        rule_id: i64,
        site_id: i64,
        period: Period,
    },

    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (recipient-list columns).
    #[error("storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column held a value that does not parse back into its domain type.
    #[error("storage: invalid value in column '{column}': {message}")]
    InvalidColumn {
        column: &'static str,
        message: String,
    },
}

/// Convenience `Result` alias for trigger-log operations.
pub type Result<T> = std::result::Result<T, StorageError>;
