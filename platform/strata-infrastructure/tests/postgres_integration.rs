use chrono::NaiveDate;
use std::time::{SystemTime, UNIX_EPOCH};
use strata_domain::repositories::audit_sink::AuditSink;
use strata_domain::repositories::partitioned_store::PartitionedStore;
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};
use strata_domain::value_objects::partition::PartitionKey;
use strata_domain::value_objects::snapshot::SnapshotRow;
use strata_infrastructure::persistence::build_pool;
use strata_infrastructure::persistence::postgres_audit::PostgresAuditSink;
use strata_infrastructure::persistence::postgres_store::PostgresPartitionedStore;

fn should_run_db_tests() -> bool {
    std::env::var("STRATA_DB_RUN_TESTS").ok().as_deref() == Some("1")
}

fn db_url() -> Option<String> {
    std::env::var("STRATA_DB_URL").ok()
}

fn unique_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}_{}", std::process::id(), now)
}

fn row(date: NaiveDate, id: &str, close: f64) -> SnapshotRow {
    SnapshotRow {
        date,
        instrument_id: id.to_string(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 100,
        dividends: 0.0,
        split_ratio: 0.0,
    }
}

#[test]
fn partitioned_insert_is_idempotent() {
    if !should_run_db_tests() {
        eprintln!("skipping: set STRATA_DB_RUN_TESTS=1 and STRATA_DB_URL to run");
        return;
    }
    let Some(url) = db_url() else {
        eprintln!("skipping: STRATA_DB_URL not set");
        return;
    };
    let store = PostgresPartitionedStore::new(build_pool(&url, 2).unwrap());
    let table = format!("stock_data_it_{}", unique_suffix());

    store.ensure_table(&table).unwrap();
    store.ensure_table(&table).unwrap();

    let feb = PartitionKey::new(2024, 2).unwrap();
    assert!(store.ensure_partition(&table, &feb).unwrap());
    assert!(!store.ensure_partition(&table, &feb).unwrap());

    let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let rows = vec![row(day, "AAPL", 187.68), row(day, "MSFT", 405.65)];
    assert_eq!(store.insert_ignore(&table, &rows).unwrap(), 2);
    // a corrected value is not merged
    let rerun = vec![row(day, "AAPL", 999.0), row(day, "MSFT", 405.65)];
    assert_eq!(store.insert_ignore(&table, &rerun).unwrap(), 0);
}

#[test]
fn audit_records_are_appended() {
    if !should_run_db_tests() {
        eprintln!("skipping: set STRATA_DB_RUN_TESTS=1 and STRATA_DB_URL to run");
        return;
    }
    let Some(url) = db_url() else {
        eprintln!("skipping: STRATA_DB_URL not set");
        return;
    };
    let table = format!("stock_data_log_it_{}", unique_suffix());
    let sink = PostgresAuditSink::new(build_pool(&url, 1).unwrap(), table).unwrap();
    sink.ensure_table().unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let record = AuditRecord::new(AuditStep::Fetch, AuditLevel::Info, AuditResult::Success, "1 bar")
        .with_instrument("AAPL")
        .with_day(day)
        .finished();
    sink.append(&record).unwrap();
}
