//! Pure condition checks, stateless and side-effect free.

use siteguard_common::types::{MetricCondition, ReportCondition};

/// Percentage change of `new` relative to `old`. Callers must guard
/// against a zero `old`.
fn percent_delta(new: f64, old: f64) -> f64 {
    (new - old) / old.abs() * 100.0
}

/// Whether `current` satisfies `condition`.
///
/// `threshold` is the rule's configured threshold; `baseline` is the
/// prior-period value for the increase/decrease family, `None` when no
/// comparison is selected or the prior period has no data.
///
/// Comparisons are exact: "less than 5" excludes 5. Percentage
/// conditions never trigger on a zero baseline (the delta is
/// undefined, not infinite). With no baseline at all, the
/// increase/decrease family falls back to comparing `current` against
/// `threshold` in the condition's own direction.
pub fn metric_condition_met(
    condition: MetricCondition,
    current: f64,
    baseline: Option<f64>,
    threshold: f64,
) -> bool {
    match condition {
        MetricCondition::GreaterThan => current > threshold,
        MetricCondition::LessThan => current < threshold,
        MetricCondition::Matches => current == threshold,
        MetricCondition::Increased => match baseline {
            Some(old) => current > old,
            None => current > threshold,
        },
        MetricCondition::Decreased => match baseline {
            Some(old) => current < old,
            None => current < threshold,
        },
        MetricCondition::Changed => match baseline {
            Some(old) => current != old,
            None => current != threshold,
        },
        MetricCondition::IncreasedMoreThan => match baseline {
            Some(old) if old != 0.0 => percent_delta(current, old) > threshold,
            Some(_) => false,
            None => current > threshold,
        },
        MetricCondition::DecreasedMoreThan => match baseline {
            Some(old) if old != 0.0 => -percent_delta(current, old) > threshold,
            Some(_) => false,
            None => current < threshold,
        },
    }
}

/// Whether a report row's dimension `label` satisfies `condition`
/// against the rule's expected value.
///
/// `MatchesAny` is a pure presence check — the row exists, so it
/// matches whatever the label says. String checks are case-sensitive;
/// no normalization happens here beyond what the report service
/// already did.
pub fn report_condition_met(condition: ReportCondition, label: &str, expected: &str) -> bool {
    match condition {
        ReportCondition::MatchesAny => true,
        ReportCondition::MatchesExactly => label == expected,
        ReportCondition::Contains => label.contains(expected),
        ReportCondition::DoesNotContain => !label.contains(expected),
    }
}
