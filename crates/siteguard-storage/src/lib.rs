//! Append-only trigger log for the siteguard alerting engine.
//!
//! Each row records one trigger event together with a snapshot of the
//! rule fields the notifier needs, so dispatched messages are stable
//! under later rule edits. A unique index over the identity tuple
//! (rule, site, granularity, period start) makes the insert the
//! at-most-once coordination point for concurrent workers — there is
//! no in-process locking to rely on across processes.

pub mod error;

#[cfg(test)]
mod tests;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use error::{Result, StorageError};
use siteguard_common::period::Period;
use siteguard_common::types::TriggerRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trigger_log (
    id TEXT PRIMARY KEY,
    rule_id INTEGER NOT NULL,
    site_id INTEGER NOT NULL,
    granularity TEXT NOT NULL,
    period_start TEXT NOT NULL,
    triggered_at INTEGER NOT NULL,
    value_old REAL,
    value_new REAL NOT NULL,
    rule_name TEXT NOT NULL,
    login TEXT NOT NULL,
    site_name TEXT NOT NULL,
    metric TEXT NOT NULL,
    metric_condition TEXT NOT NULL,
    metric_threshold REAL NOT NULL,
    compared_to TEXT NOT NULL,
    report TEXT,
    report_condition TEXT,
    report_matched TEXT,
    email_owner INTEGER NOT NULL,
    additional_emails TEXT NOT NULL DEFAULT '[]',
    phone_numbers TEXT NOT NULL DEFAULT '[]',
    sent INTEGER NOT NULL DEFAULT 0,
    sent_at INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_trigger_identity
    ON trigger_log(rule_id, site_id, granularity, period_start);
CREATE INDEX IF NOT EXISTS idx_trigger_period_sent
    ON trigger_log(granularity, period_start, sent);
";

const COLUMNS: &str = "id, rule_id, site_id, granularity, period_start, triggered_at, \
     value_old, value_new, rule_name, login, site_name, metric, metric_condition, \
     metric_threshold, compared_to, report, report_condition, report_matched, \
     email_owner, additional_emails, phone_numbers, sent, sent_at";

/// Persistent store of trigger events.
pub struct TriggerLog {
    conn: Mutex<Connection>,
}

impl TriggerLog {
    /// Opens (or creates) the trigger log database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!(path = %path.display(), "Opened trigger log");
        Self::init(conn)
    }

    /// An in-memory log, private to this handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends one trigger record.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateTrigger`] when a record with the same
    /// identity tuple already exists — the insert is the atomic
    /// conditional write; callers treat the duplicate as "someone else
    /// already triggered this", never as a reason to write again.
    pub fn record(&self, rec: &TriggerRecord) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO trigger_log (id, rule_id, site_id, granularity, period_start, \
             triggered_at, value_old, value_new, rule_name, login, site_name, metric, \
             metric_condition, metric_threshold, compared_to, report, report_condition, \
             report_matched, email_owner, additional_emails, phone_numbers, sent, sent_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
             ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        )?;
        let result = stmt.execute(rusqlite::params![
            rec.id,
            rec.rule_id,
            rec.site_id,
            rec.granularity.to_string(),
            rec.period_start.format("%Y-%m-%d").to_string(),
            rec.triggered_at.timestamp_millis(),
            rec.value_old,
            rec.value_new,
            rec.rule_name,
            rec.login,
            rec.site_name,
            rec.metric,
            rec.metric_condition.to_string(),
            rec.metric_threshold,
            rec.compared_to.to_string(),
            rec.report.as_ref().map(|r| r.to_string()),
            rec.report_condition.as_ref().map(|c| c.to_string()),
            rec.report_matched,
            rec.email_owner,
            serde_json::to_string(&rec.additional_emails)?,
            serde_json::to_string(&rec.phone_numbers)?,
            rec.sent,
            rec.sent_at.map(|t| t.timestamp_millis()),
        ]);

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateTrigger {
                rule_id: rec.rule_id,
                site_id: rec.site_id,
                period: rec.period(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a trigger was already recorded for (rule, site, period).
    pub fn has_triggered(&self, rule_id: i64, site_id: i64, period: &Period) -> Result<bool> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM trigger_log \
             WHERE rule_id = ?1 AND site_id = ?2 AND granularity = ?3 AND period_start = ?4",
        )?;
        let found = stmt.exists(rusqlite::params![
            rule_id,
            site_id,
            period.granularity.to_string(),
            period.start.format("%Y-%m-%d").to_string(),
        ])?;
        Ok(found)
    }

    /// Records for `period` not yet dispatched, in stable order:
    /// ascending rule id, then site id. Optionally restricted to one site.
    pub fn unsent_for_period(
        &self,
        period: &Period,
        site_id: Option<i64>,
    ) -> Result<Vec<TriggerRecord>> {
        let conn = self.lock();
        let granularity = period.granularity.to_string();
        let start = period.start.format("%Y-%m-%d").to_string();

        let sql = format!(
            "SELECT {COLUMNS} FROM trigger_log \
             WHERE granularity = ?1 AND period_start = ?2 AND sent = 0{} \
             ORDER BY rule_id ASC, site_id ASC",
            if site_id.is_some() {
                " AND site_id = ?3"
            } else {
                ""
            }
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        let mut rows = match site_id {
            Some(site) => stmt.query(rusqlite::params![granularity, start, site])?,
            None => stmt.query(rusqlite::params![granularity, start])?,
        };
        collect_records(&mut rows)
    }

    /// All records for `period`, regardless of sent state, in trigger
    /// order. Optionally filtered to rules owned by `login`.
    pub fn triggered_for_period(
        &self,
        period: &Period,
        login: Option<&str>,
    ) -> Result<Vec<TriggerRecord>> {
        let conn = self.lock();
        let granularity = period.granularity.to_string();
        let start = period.start.format("%Y-%m-%d").to_string();

        let sql = format!(
            "SELECT {COLUMNS} FROM trigger_log \
             WHERE granularity = ?1 AND period_start = ?2{} \
             ORDER BY rule_id ASC, site_id ASC",
            if login.is_some() { " AND login = ?3" } else { "" }
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        let mut rows = match login {
            Some(login) => stmt.query(rusqlite::params![granularity, start, login])?,
            None => stmt.query(rusqlite::params![granularity, start])?,
        };
        collect_records(&mut rows)
    }

    /// Marks the given records dispatched. Records already sent keep
    /// their original `sent_at`; marking them again is a no-op.
    pub fn mark_sent(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE trigger_log SET sent = 1, sent_at = ?1 WHERE id = ?2 AND sent = 0",
            )?;
            for id in ids {
                stmt.execute(rusqlite::params![now, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes all records for a deleted rule. Returns the number removed.
    pub fn delete_for_rule(&self, rule_id: i64) -> Result<u64> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM trigger_log WHERE rule_id = ?1",
            rusqlite::params![rule_id],
        )?;
        Ok(n as u64)
    }

    /// Removes all records for a deleted site. Returns the number removed.
    pub fn delete_for_site(&self, site_id: i64) -> Result<u64> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM trigger_log WHERE site_id = ?1",
            rusqlite::params![site_id],
        )?;
        Ok(n as u64)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn collect_records(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<TriggerRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(record_from_row(row)?);
    }
    Ok(records)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<TriggerRecord> {
    let granularity: String = row.get("granularity")?;
    let period_start: String = row.get("period_start")?;
    let metric_condition: String = row.get("metric_condition")?;
    let compared_to: String = row.get("compared_to")?;
    let report: Option<String> = row.get("report")?;
    let report_condition: Option<String> = row.get("report_condition")?;
    let additional_emails: String = row.get("additional_emails")?;
    let phone_numbers: String = row.get("phone_numbers")?;
    let triggered_at: i64 = row.get("triggered_at")?;
    let sent_at: Option<i64> = row.get("sent_at")?;

    Ok(TriggerRecord {
        id: row.get("id")?,
        rule_id: row.get("rule_id")?,
        site_id: row.get("site_id")?,
        granularity: parse_column("granularity", &granularity)?,
        period_start: NaiveDate::parse_from_str(&period_start, "%Y-%m-%d").map_err(|e| {
            StorageError::InvalidColumn {
                column: "period_start",
                message: e.to_string(),
            }
        })?,
        triggered_at: millis_to_utc("triggered_at", triggered_at)?,
        value_old: row.get("value_old")?,
        value_new: row.get("value_new")?,
        rule_name: row.get("rule_name")?,
        login: row.get("login")?,
        site_name: row.get("site_name")?,
        metric: row.get("metric")?,
        metric_condition: parse_column("metric_condition", &metric_condition)?,
        metric_threshold: row.get("metric_threshold")?,
        compared_to: parse_column("compared_to", &compared_to)?,
        report: report
            .as_deref()
            .map(|r| parse_column("report", r))
            .transpose()?,
        report_condition: report_condition
            .as_deref()
            .map(|c| parse_column("report_condition", c))
            .transpose()?,
        report_matched: row.get("report_matched")?,
        email_owner: row.get("email_owner")?,
        additional_emails: serde_json::from_str(&additional_emails)?,
        phone_numbers: serde_json::from_str(&phone_numbers)?,
        sent: row.get("sent")?,
        sent_at: sent_at.map(|t| millis_to_utc("sent_at", t)).transpose()?,
    })
}

fn parse_column<T>(column: &'static str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|message| StorageError::InvalidColumn { column, message })
}

fn millis_to_utc(column: &'static str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StorageError::InvalidColumn {
        column,
        message: format!("out-of-range timestamp {millis}"),
    })
}
