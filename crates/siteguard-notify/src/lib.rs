//! Notification delivery for triggered alerts.
//!
//! The [`notifier::Notifier`] reads unsent trigger records for a
//! period, consolidates them per recipient (one message per recipient
//! per period, regardless of how many rules fired), renders
//! channel-specific bodies, and dispatches through the [`MailTransport`]
//! and [`SmsTransport`] seams. Built-in transports cover SMTP
//! ([`channels::email::SmtpMailer`]) and a JSON SMS gateway
//! ([`channels::sms::HttpSmsGateway`]).

pub mod channels;
pub mod error;
pub mod notifier;
pub mod render;


use anyhow::Result;
use async_trait::async_trait;
use siteguard_common::types::ReportRef;

/// Resolves a login to the user's email address.
///
/// User accounts live outside this engine; `Ok(None)` means the login
/// is unknown or has no address on file.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_for(&self, login: &str) -> Result<Option<String>>;
}

/// Human-readable display names for reports and metrics.
///
/// Lookup failures are tolerated everywhere this trait is consumed:
/// rendering falls back to the raw identifiers rather than dropping a
/// message over a missing label.
#[async_trait]
pub trait ReportMetadata: Send + Sync {
    async fn display_name(&self, report: &ReportRef) -> Result<String>;

    async fn metric_label(&self, report: Option<&ReportRef>, metric: &str) -> Result<String>;
}

/// Outbound email transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers one message with both HTML and plain-text bodies.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; the caller keeps the
    /// underlying records unsent so the next run retries.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()>;
}

/// Outbound SMS transport.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()>;
}
