//! Message rendering for consolidated alert notifications.
//!
//! Everything here is pure string building over trigger-record
//! snapshots, so rendered output is reproducible for any historical
//! record regardless of what happened to the rule since.

use siteguard_common::period::Period;
use siteguard_common::types::{MetricCondition, TriggerRecord};

/// A trigger record paired with resolved display labels.
///
/// `report_name` is `None` for rules evaluated against the site
/// aggregate; when metadata lookup failed upstream, both labels carry
/// the raw identifiers instead.
pub struct EnrichedAlert<'a> {
    pub record: &'a TriggerRecord,
    pub report_name: Option<String>,
    pub metric_label: String,
}

fn format_value(v: f64) -> String {
    v.to_string()
}

/// The "is 4493 which is less than 5000" part of a line, phrased per
/// condition. Baseline conditions that fired without a baseline fall
/// back to the threshold phrasing, matching how they were evaluated.
fn change_clause(record: &TriggerRecord) -> String {
    let new = format_value(record.value_new);
    let threshold = format_value(record.metric_threshold);

    let against_threshold = |relation: &str| format!("is {new} which {relation} {threshold}");

    match (record.metric_condition, record.value_old) {
        (MetricCondition::GreaterThan, _) => against_threshold("is greater than"),
        (MetricCondition::LessThan, _) => against_threshold("is less than"),
        (MetricCondition::Matches, _) => against_threshold("matches"),
        (MetricCondition::Increased, Some(old)) => {
            format!("increased from {} to {new}", format_value(old))
        }
        (MetricCondition::Decreased, Some(old)) => {
            format!("decreased from {} to {new}", format_value(old))
        }
        (MetricCondition::Changed, Some(old)) => {
            format!("changed from {} to {new}", format_value(old))
        }
        (MetricCondition::IncreasedMoreThan, Some(old)) => format!(
            "increased from {} to {new} which is more than {threshold}%",
            format_value(old)
        ),
        (MetricCondition::DecreasedMoreThan, Some(old)) => format!(
            "decreased from {} to {new} which is more than {threshold}%",
            format_value(old)
        ),
        (MetricCondition::Increased | MetricCondition::IncreasedMoreThan, None) => {
            against_threshold("is greater than")
        }
        (MetricCondition::Decreased | MetricCondition::DecreasedMoreThan, None) => {
            against_threshold("is less than")
        }
        (MetricCondition::Changed, None) => against_threshold("differs from"),
    }
}

fn subject_clause(alert: &EnrichedAlert<'_>, quote: &str) -> String {
    match &alert.report_name {
        Some(report) => format!(
            "the metric {quote}{}{quote} in report {quote}{}{quote}",
            alert.metric_label, report
        ),
        None => format!("the metric {quote}{}{quote}", alert.metric_label),
    }
}

/// Plain-text sentence for one alert, e.g.
/// `MyName1 has been triggered as the metric Visits in report Single
/// Website dashboard is 4493 which is less than 5000.`
pub fn text_line(alert: &EnrichedAlert<'_>) -> String {
    format!(
        "{} has been triggered as {} {}.",
        alert.record.rule_name,
        subject_clause(alert, ""),
        change_clause(alert.record)
    )
}

/// SMS sentence; names the website since a phone number has no other
/// context for which site fired.
pub fn sms_line(alert: &EnrichedAlert<'_>) -> String {
    format!(
        "{} has been triggered for website {} as {} {}.",
        alert.record.rule_name,
        alert.record.site_name,
        subject_clause(alert, ""),
        change_clause(alert.record)
    )
}

/// HTML table-cell content for one alert, quoted and escaped.
pub fn html_line(alert: &EnrichedAlert<'_>) -> String {
    let quoted = EnrichedAlert {
        record: alert.record,
        report_name: alert.report_name.as_deref().map(escape_html),
        metric_label: escape_html(&alert.metric_label),
    };
    format!(
        "{} has been triggered as {} {}.",
        escape_html(&format!("'{}'", alert.record.rule_name)),
        subject_clause(&quoted, "&#039;"),
        change_clause(alert.record)
    )
}

pub fn email_subject(site_name: &str, period: &Period) -> String {
    format!("New alert for website {site_name} [{}]", period.label())
}

pub fn email_text_body(alerts: &[EnrichedAlert<'_>]) -> String {
    let mut body = String::from(
        "Hello,\n\nThe triggered alerts are listed below. To adjust your custom \
         alert settings, please sign in and access the Alerts page.\n\n",
    );
    for alert in alerts {
        body.push_str(&text_line(alert));
        body.push('\n');
    }
    body
}

pub fn email_html_body(alerts: &[EnrichedAlert<'_>]) -> String {
    let mut body = String::from(
        "Hello,<br /><br />\nThe triggered alerts are listed in the table below. \
         To adjust your custom alert settings, please sign in and access the Alerts \
         page.<br /><br />\n<table style=\"border-collapse: collapse;\">\n<thead>\n\
         <tr><th style=\"padding:6px 6px;text-align: left;\">Alert</th></tr>\n\
         </thead>\n<tbody>\n",
    );
    for alert in alerts {
        body.push_str(&format!(
            "<tr><td style=\"border-bottom:1px solid rgb(231,231,231);\
             padding:5px 0 5px 6px;\">{}</td></tr>\n",
            html_line(alert)
        ));
    }
    body.push_str("</tbody>\n</table>\n");
    body
}

/// One terse line for the whole consolidated SMS: sentences joined by
/// single spaces, in trigger order.
pub fn sms_body(alerts: &[EnrichedAlert<'_>]) -> String {
    alerts
        .iter()
        .map(sms_line)
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
