use crate::error::StorageError;
use crate::TriggerLog;
use chrono::{NaiveDate, Utc};
use siteguard_common::period::{Granularity, Period};
use siteguard_common::types::{Baseline, MetricCondition, ReportCondition, ReportRef, TriggerRecord};
use tempfile::TempDir;

fn setup() -> (TempDir, TriggerLog) {
    siteguard_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let log = TriggerLog::open(&dir.path().join("triggers.db")).unwrap();
    (dir, log)
}

fn week() -> Period {
    Period::new(
        Granularity::Week,
        NaiveDate::from_ymd_opt(2009, 12, 21).unwrap(),
    )
}

fn make_record(rule_id: i64, site_id: i64, period: &Period) -> TriggerRecord {
    TriggerRecord {
        id: siteguard_common::id::next_id(),
        rule_id,
        site_id,
        granularity: period.granularity,
        period_start: period.start,
        triggered_at: Utc::now(),
        value_old: Some(228.0),
        value_new: 4493.0,
        rule_name: format!("Rule{rule_id}"),
        login: "login1".into(),
        site_name: "Example Store".into(),
        metric: "nb_visits".into(),
        metric_condition: MetricCondition::LessThan,
        metric_threshold: 5000.0,
        compared_to: Baseline::None,
        report: Some(ReportRef::new("MultiSites", "getOne")),
        report_condition: Some(ReportCondition::MatchesExactly),
        report_matched: Some("Example".into()),
        email_owner: true,
        additional_emails: vec!["test5@example.com".into()],
        phone_numbers: vec!["+1234567890".into()],
        sent: false,
        sent_at: None,
    }
}

#[test]
fn record_and_read_back() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();

    let records = log.unsent_for_period(&period, None).unwrap();
    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.rule_id, 1);
    assert_eq!(rec.metric_condition, MetricCondition::LessThan);
    assert_eq!(rec.report, Some(ReportRef::new("MultiSites", "getOne")));
    assert_eq!(rec.report_condition, Some(ReportCondition::MatchesExactly));
    assert_eq!(rec.additional_emails, vec!["test5@example.com".to_string()]);
    assert_eq!(rec.phone_numbers, vec!["+1234567890".to_string()]);
    assert_eq!(rec.value_old, Some(228.0));
    assert!(!rec.sent);
    assert!(rec.sent_at.is_none());
}

#[test]
fn duplicate_identity_is_rejected() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();

    // Same identity tuple with a fresh row id must fail closed.
    let err = log.record(&make_record(1, 1, &period)).unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateTrigger {
            rule_id: 1,
            site_id: 1,
            ..
        }
    ));

    assert_eq!(log.unsent_for_period(&period, None).unwrap().len(), 1);
}

#[test]
fn same_rule_different_site_or_period_is_distinct() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();
    log.record(&make_record(1, 2, &period)).unwrap();
    log.record(&make_record(1, 1, &period.previous())).unwrap();

    assert_eq!(log.unsent_for_period(&period, None).unwrap().len(), 2);
    assert_eq!(
        log.unsent_for_period(&period.previous(), None).unwrap().len(),
        1
    );
}

#[test]
fn has_triggered_matches_identity() {
    let (_dir, log) = setup();
    let period = week();

    assert!(!log.has_triggered(1, 1, &period).unwrap());
    log.record(&make_record(1, 1, &period)).unwrap();
    assert!(log.has_triggered(1, 1, &period).unwrap());
    assert!(!log.has_triggered(1, 2, &period).unwrap());
    assert!(!log.has_triggered(1, 1, &period.previous()).unwrap());
}

#[test]
fn unsent_order_is_rule_then_site() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(2, 1, &period)).unwrap();
    log.record(&make_record(1, 2, &period)).unwrap();
    log.record(&make_record(1, 1, &period)).unwrap();

    let records = log.unsent_for_period(&period, None).unwrap();
    let order: Vec<(i64, i64)> = records.iter().map(|r| (r.rule_id, r.site_id)).collect();
    assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);
}

#[test]
fn unsent_can_be_scoped_to_one_site() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();
    log.record(&make_record(2, 2, &period)).unwrap();

    let records = log.unsent_for_period(&period, Some(2)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].site_id, 2);
}

#[test]
fn mark_sent_excludes_from_unsent_and_is_idempotent() {
    let (_dir, log) = setup();
    let period = week();

    let rec = make_record(1, 1, &period);
    log.record(&rec).unwrap();
    log.record(&make_record(2, 1, &period)).unwrap();

    log.mark_sent(std::slice::from_ref(&rec.id)).unwrap();

    let unsent = log.unsent_for_period(&period, None).unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].rule_id, 2);

    let sent = log
        .triggered_for_period(&period, None)
        .unwrap()
        .into_iter()
        .find(|r| r.id == rec.id)
        .unwrap();
    assert!(sent.sent);
    let first_sent_at = sent.sent_at.unwrap();

    // A second mark keeps the original timestamp; it never reverts.
    log.mark_sent(std::slice::from_ref(&rec.id)).unwrap();
    let again = log
        .triggered_for_period(&period, None)
        .unwrap()
        .into_iter()
        .find(|r| r.id == rec.id)
        .unwrap();
    assert_eq!(again.sent_at.unwrap(), first_sent_at);
}

#[test]
fn triggered_for_period_filters_by_login() {
    let (_dir, log) = setup();
    let period = week();

    let mut mine = make_record(1, 1, &period);
    mine.login = "login1".into();
    let mut theirs = make_record(2, 1, &period);
    theirs.login = "login2".into();
    log.record(&mine).unwrap();
    log.record(&theirs).unwrap();

    let all = log.triggered_for_period(&period, None).unwrap();
    assert_eq!(all.len(), 2);

    let only_mine = log.triggered_for_period(&period, Some("login1")).unwrap();
    assert_eq!(only_mine.len(), 1);
    assert_eq!(only_mine[0].rule_id, 1);
}

#[test]
fn delete_for_rule_cascades_history() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();
    log.record(&make_record(1, 2, &period)).unwrap();
    log.record(&make_record(2, 1, &period)).unwrap();

    assert_eq!(log.delete_for_rule(1).unwrap(), 2);
    let left = log.unsent_for_period(&period, None).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].rule_id, 2);
}

#[test]
fn delete_for_site_cascades_history() {
    let (_dir, log) = setup();
    let period = week();

    log.record(&make_record(1, 1, &period)).unwrap();
    log.record(&make_record(2, 2, &period)).unwrap();

    assert_eq!(log.delete_for_site(2).unwrap(), 1);
    let left = log.unsent_for_period(&period, None).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].site_id, 1);
}

#[test]
fn minimal_record_round_trips_null_columns() {
    let (_dir, log) = setup();
    let period = Period::new(
        Granularity::Day,
        NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
    );

    let mut rec = make_record(9, 3, &period);
    rec.value_old = None;
    rec.report = None;
    rec.report_condition = None;
    rec.report_matched = None;
    rec.additional_emails = vec![];
    rec.phone_numbers = vec![];
    log.record(&rec).unwrap();

    let back = &log.unsent_for_period(&period, None).unwrap()[0];
    assert_eq!(back.value_old, None);
    assert_eq!(back.report, None);
    assert_eq!(back.report_condition, None);
    assert_eq!(back.report_matched, None);
    assert!(back.additional_emails.is_empty());
    assert!(back.phone_numbers.is_empty());
}
