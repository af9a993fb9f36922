//! Alert evaluation engine: decides, per (rule, site, period), whether
//! a user-defined threshold rule fires against the analytics data.
//!
//! Evaluation is split into pure condition checks ([`condition`]) and
//! the stateful [`processor::AlertProcessor`], which consults the
//! external report source, applies the conditions, and writes the
//! at-most-once trigger record.

pub mod condition;
pub mod processor;


use anyhow::Result;
use async_trait::async_trait;
use siteguard_common::period::Period;
use siteguard_common::types::ReportRef;

/// Read side of the external analytics query service.
///
/// Absent data is `Ok(None)`, never an error — a site without traffic
/// for a period is a normal outcome. Errors are reserved for the
/// service actually failing; timeout and retry policy belong to the
/// implementation, not to callers.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Value of `metric` for the site and period, taken from the row
    /// the referenced report resolves to, or from the site aggregate
    /// when `report` is `None`.
    async fn metric_value(
        &self,
        site_id: i64,
        period: &Period,
        report: Option<&ReportRef>,
        metric: &str,
    ) -> Result<Option<f64>>;

    /// Dimension label of the row `report` resolves to for the site
    /// and period, if the row exists.
    async fn dimension_value(
        &self,
        site_id: i64,
        period: &Period,
        report: &ReportRef,
    ) -> Result<Option<String>>;
}
