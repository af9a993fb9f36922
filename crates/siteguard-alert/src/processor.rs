use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use siteguard_common::id;
use siteguard_common::period::Period;
use siteguard_common::types::{AlertRule, Baseline, Site, TriggerRecord};
use siteguard_storage::error::StorageError;
use siteguard_storage::TriggerLog;

use crate::condition::{metric_condition_met, report_condition_met};
use crate::ReportSource;

/// Result of evaluating one (rule, site, period) unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NotTriggered,
    Triggered {
        value_old: Option<f64>,
        value_new: f64,
    },
    /// Evaluation did not run to a verdict; the reason says why
    /// (already evaluated, malformed rule, lost insert race, or an
    /// isolated fetch failure inside [`AlertProcessor::process_period`]).
    Skipped {
        reason: String,
    },
}

/// Outcome of one rule within a `process_period` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_id: i64,
    pub outcome: Outcome,
}

/// Evaluates rules against the report source and records triggers.
///
/// At-most-once per (rule, site, period) is enforced twice: a cheap
/// existence check up front, and the trigger log's unique insert as the
/// authoritative gate — concurrent workers may both pass the check, but
/// only one insert wins.
pub struct AlertProcessor {
    source: Arc<dyn ReportSource>,
    log: Arc<TriggerLog>,
}

impl AlertProcessor {
    pub fn new(source: Arc<dyn ReportSource>, log: Arc<TriggerLog>) -> Self {
        Self { source, log }
    }

    /// Evaluates one rule for one site and period.
    ///
    /// # Errors
    ///
    /// Returns an error only when a collaborator call or the trigger
    /// log fails unexpectedly. Absent data and malformed rules are
    /// outcomes, not errors.
    pub async fn evaluate(
        &self,
        rule: &AlertRule,
        site: &Site,
        period: &Period,
    ) -> Result<Outcome> {
        if let Err(e) = rule.validate() {
            tracing::warn!(rule_id = rule.id, error = %e, "Skipping malformed rule");
            return Ok(Outcome::Skipped {
                reason: e.to_string(),
            });
        }

        if self.log.has_triggered(rule.id, site.id, period)? {
            return Ok(Outcome::Skipped {
                reason: "already evaluated".into(),
            });
        }

        // The report condition gates metric evaluation: no row, or a
        // failed match, and the metric is never consulted.
        if let Some(report) = &rule.report {
            let Some(label) = self.source.dimension_value(site.id, period, report).await? else {
                return Ok(Outcome::NotTriggered);
            };
            if let Some(condition) = rule.report_condition {
                let expected = rule.report_matched.as_deref().unwrap_or("");
                if !report_condition_met(condition, &label, expected) {
                    return Ok(Outcome::NotTriggered);
                }
            }
        }

        let current = self
            .source
            .metric_value(site.id, period, rule.report.as_ref(), &rule.metric)
            .await?;
        let Some(current) = current else {
            return Ok(Outcome::NotTriggered);
        };

        let baseline = if rule.metric_condition.compares_to_baseline() {
            match baseline_period(rule, period) {
                Some(prior) => {
                    self.source
                        .metric_value(site.id, &prior, rule.report.as_ref(), &rule.metric)
                        .await?
                }
                None => None,
            }
        } else {
            None
        };

        if !metric_condition_met(
            rule.metric_condition,
            current,
            baseline,
            rule.metric_threshold,
        ) {
            return Ok(Outcome::NotTriggered);
        }

        match self.log.record(&snapshot(rule, site, period, baseline, current)) {
            Ok(()) => {
                tracing::info!(
                    rule_id = rule.id,
                    site_id = site.id,
                    value_new = current,
                    "Alert triggered"
                );
                Ok(Outcome::Triggered {
                    value_old: baseline,
                    value_new: current,
                })
            }
            // Another worker recorded the same identity between our
            // check and insert; their record stands.
            Err(StorageError::DuplicateTrigger { .. }) => Ok(Outcome::Skipped {
                reason: "concurrent trigger".into(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluates every rule scoped to `site` and matching the period's
    /// granularity. Each rule is an independent unit: a failure in one
    /// is logged and reported as a skip, and the rest still run.
    pub async fn process_period(
        &self,
        rules: &[AlertRule],
        site: &Site,
        period: &Period,
    ) -> Vec<RuleOutcome> {
        let mut outcomes = Vec::new();
        for rule in rules {
            if rule.granularity != period.granularity || !rule.applies_to(site.id) {
                continue;
            }
            let outcome = match self.evaluate(rule, site, period).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        rule_id = rule.id,
                        site_id = site.id,
                        error = %e,
                        "Rule evaluation failed; continuing with remaining rules"
                    );
                    Outcome::Skipped {
                        reason: format!("evaluation failed: {e}"),
                    }
                }
            };
            outcomes.push(RuleOutcome {
                rule_id: rule.id,
                outcome,
            });
        }
        outcomes
    }
}

fn baseline_period(rule: &AlertRule, period: &Period) -> Option<Period> {
    match rule.compared_to {
        Baseline::None => None,
        Baseline::PreviousPeriod => Some(period.previous()),
        Baseline::PreviousYear => period.previous_year(),
    }
}

fn snapshot(
    rule: &AlertRule,
    site: &Site,
    period: &Period,
    value_old: Option<f64>,
    value_new: f64,
) -> TriggerRecord {
    TriggerRecord {
        id: id::next_id(),
        rule_id: rule.id,
        site_id: site.id,
        granularity: period.granularity,
        period_start: period.start,
        triggered_at: Utc::now(),
        value_old,
        value_new,
        rule_name: rule.name.clone(),
        login: rule.login.clone(),
        site_name: site.name.clone(),
        metric: rule.metric.clone(),
        metric_condition: rule.metric_condition,
        metric_threshold: rule.metric_threshold,
        compared_to: rule.compared_to,
        report: rule.report.clone(),
        report_condition: rule.report_condition,
        report_matched: rule.report_matched.clone(),
        email_owner: rule.email_owner,
        additional_emails: rule.additional_emails.clone(),
        phone_numbers: rule.phone_numbers.clone(),
        sent: false,
        sent_at: None,
    }
}
