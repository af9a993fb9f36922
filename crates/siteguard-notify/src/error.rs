/// Errors that can occur within the notification subsystem.
///
/// Transport failures during fan-out are deliberately NOT surfaced
/// through this type — the notifier collects them per recipient into
/// the dispatch report and leaves the affected records unsent. This
/// enum covers the failures that stop a dispatch run outright (storage)
/// and the errors transports raise from a single send.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Reading or updating the trigger log failed.
    #[error("notify: storage error: {0}")]
    Storage(#[from] siteguard_storage::error::StorageError),

    /// A recipient or sender address did not parse.
    #[error("notify: invalid address '{0}'")]
    InvalidAddress(String),

    /// SMTP transport error when sending email.
    #[error("notify: SMTP error: {0}")]
    Smtp(String),

    /// An HTTP request to the SMS gateway failed.
    #[error("notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The SMS gateway returned a non-success response.
    #[error("notify: API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
