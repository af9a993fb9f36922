use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::period::{Granularity, Period};

/// A monitored analytics site, as resolved by the external site registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
}

/// Comparison baseline selected for a rule's relative conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    None,
    PreviousPeriod,
    PreviousYear,
}

impl std::fmt::Display for Baseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Baseline::None => write!(f, "none"),
            Baseline::PreviousPeriod => write!(f, "previous_period"),
            Baseline::PreviousYear => write!(f, "previous_year"),
        }
    }
}

impl std::str::FromStr for Baseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Baseline::None),
            "previous_period" => Ok(Baseline::PreviousPeriod),
            "previous_year" => Ok(Baseline::PreviousYear),
            _ => Err(format!("unknown baseline selector: {s}")),
        }
    }
}

/// Condition applied to a rule's metric value.
///
/// The threshold family (`GreaterThan`, `LessThan`, `Matches`) compares
/// the current value against the rule threshold; the remaining variants
/// compare against the baseline value of the prior period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCondition {
    GreaterThan,
    LessThan,
    Matches,
    Increased,
    Decreased,
    Changed,
    IncreasedMoreThan,
    DecreasedMoreThan,
}

impl MetricCondition {
    /// Whether this condition needs a baseline value from a prior period.
    pub fn compares_to_baseline(&self) -> bool {
        matches!(
            self,
            MetricCondition::Increased
                | MetricCondition::Decreased
                | MetricCondition::Changed
                | MetricCondition::IncreasedMoreThan
                | MetricCondition::DecreasedMoreThan
        )
    }

    /// Whether the threshold is a percentage rather than an absolute value.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricCondition::IncreasedMoreThan | MetricCondition::DecreasedMoreThan
        )
    }
}

impl std::fmt::Display for MetricCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetricCondition::GreaterThan => "greater_than",
            MetricCondition::LessThan => "less_than",
            MetricCondition::Matches => "matches",
            MetricCondition::Increased => "increased",
            MetricCondition::Decreased => "decreased",
            MetricCondition::Changed => "changed",
            MetricCondition::IncreasedMoreThan => "increased_more_than",
            MetricCondition::DecreasedMoreThan => "decreased_more_than",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MetricCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" => Ok(MetricCondition::GreaterThan),
            "less_than" => Ok(MetricCondition::LessThan),
            "matches" => Ok(MetricCondition::Matches),
            "increased" => Ok(MetricCondition::Increased),
            "decreased" => Ok(MetricCondition::Decreased),
            "changed" => Ok(MetricCondition::Changed),
            "increased_more_than" => Ok(MetricCondition::IncreasedMoreThan),
            "decreased_more_than" => Ok(MetricCondition::DecreasedMoreThan),
            _ => Err(format!("unknown metric condition: {s}")),
        }
    }
}

/// Condition applied to a report row's dimension label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCondition {
    MatchesExactly,
    MatchesAny,
    Contains,
    DoesNotContain,
}

impl std::fmt::Display for ReportCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportCondition::MatchesExactly => "matches_exactly",
            ReportCondition::MatchesAny => "matches_any",
            ReportCondition::Contains => "contains",
            ReportCondition::DoesNotContain => "does_not_contain",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ReportCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matches_exactly" => Ok(ReportCondition::MatchesExactly),
            "matches_any" => Ok(ReportCondition::MatchesAny),
            "contains" => Ok(ReportCondition::Contains),
            "does_not_contain" => Ok(ReportCondition::DoesNotContain),
            _ => Err(format!("unknown report condition: {s}")),
        }
    }
}

/// Reference to an analytics report, `module.action`
/// (e.g. `MultiSites.getOne`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportRef {
    pub module: String,
    pub action: String,
}

impl ReportRef {
    pub fn new(module: &str, action: &str) -> Self {
        Self {
            module: module.to_string(),
            action: action.to_string(),
        }
    }
}

impl std::fmt::Display for ReportRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.action)
    }
}

impl std::str::FromStr for ReportRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((module, action)) if !module.is_empty() && !action.is_empty() => {
                Ok(ReportRef::new(module, action))
            }
            _ => Err(format!("report reference must be module.action: {s}")),
        }
    }
}

/// A rule configuration that fails validation.
///
/// Malformed rules are skipped at evaluation time rather than raised;
/// this type carries the reason into the log.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidRule {
    #[error("metric threshold is not a finite number")]
    NonFiniteThreshold,
    #[error("report condition set without a report reference")]
    ConditionWithoutReport,
    #[error("previous-year baseline is undefined for yearly periods")]
    YearOverYearOnYearly,
}

/// A user-defined alert rule.
///
/// Rule storage and CRUD live outside this engine; rules arrive here
/// already loaded, scoped to the sites the caller may evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    /// Login of the owning user, resolved to an email address at
    /// dispatch time when `email_owner` is set.
    pub login: String,
    pub granularity: Granularity,
    pub site_ids: Vec<i64>,
    pub metric: String,
    pub metric_condition: MetricCondition,
    pub metric_threshold: f64,
    pub compared_to: Baseline,
    pub report: Option<ReportRef>,
    pub report_condition: Option<ReportCondition>,
    pub report_matched: Option<String>,
    pub email_owner: bool,
    pub additional_emails: Vec<String>,
    pub phone_numbers: Vec<String>,
}

impl AlertRule {
    /// Checks the rule invariants that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), InvalidRule> {
        if !self.metric_threshold.is_finite() {
            return Err(InvalidRule::NonFiniteThreshold);
        }
        if self.report_condition.is_some() && self.report.is_none() {
            return Err(InvalidRule::ConditionWithoutReport);
        }
        if self.compared_to == Baseline::PreviousYear && self.granularity == Granularity::Year {
            return Err(InvalidRule::YearOverYearOnYearly);
        }
        Ok(())
    }

    pub fn applies_to(&self, site_id: i64) -> bool {
        self.site_ids.contains(&site_id)
    }
}

/// One trigger event: a rule's condition was satisfied for a site and
/// period.
///
/// Everything the notifier needs to render and fan out is snapshotted
/// from the rule at trigger time; editing or re-scoping the rule later
/// never changes a historical notification. Identity is
/// (rule_id, site_id, granularity, period_start) — the storage layer
/// enforces at most one record per tuple. Immutable once written except
/// for `sent`/`sent_at`, which transition once, forward only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: String,
    pub rule_id: i64,
    pub site_id: i64,
    pub granularity: Granularity,
    pub period_start: NaiveDate,
    pub triggered_at: DateTime<Utc>,
    pub value_old: Option<f64>,
    pub value_new: f64,
    pub rule_name: String,
    pub login: String,
    pub site_name: String,
    pub metric: String,
    pub metric_condition: MetricCondition,
    pub metric_threshold: f64,
    pub compared_to: Baseline,
    pub report: Option<ReportRef>,
    pub report_condition: Option<ReportCondition>,
    pub report_matched: Option<String>,
    pub email_owner: bool,
    pub additional_emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl TriggerRecord {
    pub fn period(&self) -> Period {
        Period::new(self.granularity, self.period_start)
    }
}
