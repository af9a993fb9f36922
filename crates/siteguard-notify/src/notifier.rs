use std::collections::BTreeMap;
use std::sync::Arc;

use siteguard_common::period::Period;
use siteguard_common::types::TriggerRecord;
use siteguard_storage::TriggerLog;

use crate::error::{NotifyError, Result};
use crate::render::{
    email_html_body, email_subject, email_text_body, sms_body, EnrichedAlert,
};
use crate::{MailTransport, ReportMetadata, SmsTransport, UserDirectory};

/// Delivery channel a failure occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// One recipient whose message could not be delivered. The records
/// behind it remain unsent and are retried on the next dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub channel: Channel,
    pub recipient: String,
    pub error: String,
}

/// Summary of one dispatch run.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub emails_sent: usize,
    pub sms_sent: usize,
    pub failures: Vec<DispatchFailure>,
}

/// Groups unsent trigger records per recipient and dispatches one
/// consolidated message per recipient and channel.
pub struct Notifier {
    log: Arc<TriggerLog>,
    directory: Arc<dyn UserDirectory>,
    metadata: Arc<dyn ReportMetadata>,
    mail: Arc<dyn MailTransport>,
    sms: Arc<dyn SmsTransport>,
}

impl Notifier {
    pub fn new(
        log: Arc<TriggerLog>,
        directory: Arc<dyn UserDirectory>,
        metadata: Arc<dyn ReportMetadata>,
        mail: Arc<dyn MailTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            log,
            directory,
            metadata,
            mail,
            sms,
        }
    }

    /// Dispatches every unsent trigger for `period`, optionally scoped
    /// to one site.
    ///
    /// Safe to re-invoke: successfully delivered records are marked
    /// sent and drop out of the next fetch, failed recipients keep
    /// their records unsent and are retried. A failure for one
    /// recipient never blocks the others; they are collected in the
    /// returned report instead of raised.
    pub async fn dispatch_period(
        &self,
        period: &Period,
        site_id: Option<i64>,
    ) -> Result<DispatchReport> {
        let records = self.log.unsent_for_period(period, site_id)?;
        let mut report = DispatchReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        // Records arrive in trigger order (rule id, then site id) and
        // each group preserves its insertion order, so consolidated
        // message content is deterministic. BTreeMap keys make the
        // recipient iteration order stable too.
        let mut email_groups: BTreeMap<String, Vec<&TriggerRecord>> = BTreeMap::new();
        let mut sms_groups: BTreeMap<String, Vec<&TriggerRecord>> = BTreeMap::new();

        for record in &records {
            for email in self.email_recipients(record).await {
                email_groups.entry(email).or_default().push(record);
            }
            for phone in &record.phone_numbers {
                let phone = phone.trim();
                if phone.is_empty() {
                    continue;
                }
                sms_groups.entry(phone.to_string()).or_default().push(record);
            }
        }

        for (recipient, group) in &email_groups {
            let alerts = self.enrich(group).await;
            let subject = email_subject(&group[0].site_name, period);
            let html = email_html_body(&alerts);
            let text = email_text_body(&alerts);

            match self.mail.send_email(recipient, &subject, &html, &text).await {
                Ok(()) => {
                    self.mark_sent(group)?;
                    report.emails_sent += 1;
                }
                Err(e) => {
                    tracing::error!(
                        recipient = %recipient,
                        error = %e,
                        "Email dispatch failed; records stay unsent for retry"
                    );
                    report.failures.push(DispatchFailure {
                        channel: Channel::Email,
                        recipient: recipient.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for (recipient, group) in &sms_groups {
            let alerts = self.enrich(group).await;
            let body = sms_body(&alerts);

            match self.sms.send_sms(recipient, &body).await {
                Ok(()) => {
                    self.mark_sent(group)?;
                    report.sms_sent += 1;
                }
                Err(e) => {
                    tracing::error!(
                        recipient = %recipient,
                        error = %e,
                        "SMS dispatch failed; records stay unsent for retry"
                    );
                    report.failures.push(DispatchFailure {
                        channel: Channel::Sms,
                        recipient: recipient.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Email addresses for one record, from its snapshot: the
    /// additional addresses, plus the owner's directory address when
    /// the rule asked for it. A failed or empty owner lookup skips the
    /// owner only, never the record.
    async fn email_recipients(&self, record: &TriggerRecord) -> Vec<String> {
        let mut recipients: Vec<String> = Vec::new();
        for email in &record.additional_emails {
            let email = email.trim();
            if !email.is_empty() && !recipients.iter().any(|r| r == email) {
                recipients.push(email.to_string());
            }
        }

        if record.email_owner {
            match self.directory.email_for(&record.login).await {
                Ok(Some(email)) if !email.trim().is_empty() => {
                    if !recipients.contains(&email) {
                        recipients.push(email);
                    }
                }
                Ok(_) => {
                    tracing::warn!(
                        login = %record.login,
                        rule_id = record.rule_id,
                        "Rule owner has no email address; skipping owner notification"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        login = %record.login,
                        rule_id = record.rule_id,
                        error = %e,
                        "Owner email lookup failed; skipping owner notification"
                    );
                }
            }
        }

        recipients
    }

    /// Resolves display labels for each record, falling back to the raw
    /// identifiers so one unresolved report never aborts a message.
    async fn enrich<'a>(&self, group: &[&'a TriggerRecord]) -> Vec<EnrichedAlert<'a>> {
        let mut alerts = Vec::with_capacity(group.len());
        for &record in group {
            let report_name = match &record.report {
                Some(report) => Some(match self.metadata.display_name(report).await {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::debug!(
                            report = %report,
                            error = %e,
                            "Report name lookup failed; using raw identifier"
                        );
                        report.to_string()
                    }
                }),
                None => None,
            };
            let metric_label = match self
                .metadata
                .metric_label(record.report.as_ref(), &record.metric)
                .await
            {
                Ok(label) => label,
                Err(e) => {
                    tracing::debug!(
                        metric = %record.metric,
                        error = %e,
                        "Metric label lookup failed; using raw identifier"
                    );
                    record.metric.clone()
                }
            };
            alerts.push(EnrichedAlert {
                record,
                report_name,
                metric_label,
            });
        }
        alerts
    }

    fn mark_sent(&self, group: &[&TriggerRecord]) -> std::result::Result<(), NotifyError> {
        let ids: Vec<String> = group.iter().map(|r| r.id.clone()).collect();
        self.log.mark_sent(&ids)?;
        Ok(())
    }
}
