use crate::audit::AuditLogger;
use crate::cancel::CancelToken;
use crate::convert::acknowledge;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::bulk_loader::{BulkLoader, LoadReport};
use strata_domain::repositories::columnar::ColumnarReader;
use strata_domain::repositories::partitioned_store::PartitionedStore;
use strata_domain::repositories::work_queue::WorkQueue;
use strata_domain::services::layout::date_from_snapshot_name;
use strata_domain::services::schema::SchemaMapping;
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};
use strata_domain::value_objects::partition::PartitionKey;
use strata_domain::value_objects::snapshot::SnapshotRow;

/// Native bulk loader: reads the columnar file, maps it onto the storage
/// schema and inserts it partition by partition with conflict-ignore.
pub struct DriverBulkLoader {
    reader: Box<dyn ColumnarReader>,
    store: Box<dyn PartitionedStore>,
    mapping: SchemaMapping,
    ready_tables: RefCell<HashSet<String>>,
}

impl DriverBulkLoader {
    pub fn new(reader: Box<dyn ColumnarReader>, store: Box<dyn PartitionedStore>) -> Self {
        Self {
            reader,
            store,
            mapping: SchemaMapping::CURRENT,
            ready_tables: RefCell::new(HashSet::new()),
        }
    }

    fn ensure_table_once(&self, table: &str) -> Result<(), PipelineError> {
        if self.ready_tables.borrow().contains(table) {
            return Ok(());
        }
        self.store.ensure_table(table)?;
        self.ready_tables.borrow_mut().insert(table.to_string());
        Ok(())
    }
}

fn group_by_partition(rows: Vec<SnapshotRow>) -> BTreeMap<PartitionKey, Vec<SnapshotRow>> {
    let mut groups: BTreeMap<PartitionKey, Vec<SnapshotRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(PartitionKey::for_date(row.date))
            .or_default()
            .push(row);
    }
    groups
}

impl BulkLoader for DriverBulkLoader {
    fn name(&self) -> &str {
        "driver"
    }

    fn load(&self, file: &Path, target_table: &str) -> Result<LoadReport, PipelineError> {
        self.ensure_table_once(target_table)?;
        let frame = self.reader.read_frame(file)?;
        let version = self.mapping.version();
        let rows = self.mapping.apply(&frame).map_err(|err| match err {
            PipelineError::DataQuality(msg) => {
                PipelineError::DataQuality(format!("schema v{version}: {msg}"))
            }
            other => other,
        })?;
        tracing::debug!(schema_version = version, rows = rows.len(), "frame mapped");

        let mut report = LoadReport {
            rows_read: rows.len() as u64,
            ..LoadReport::default()
        };
        for (key, group) in group_by_partition(rows) {
            if self.store.ensure_partition(target_table, &key)? {
                report.partitions_created += 1;
            }
            report.rows_inserted += self.store.insert_ignore(target_table, &group)?;
        }
        report.rows_ignored = report.rows_read.saturating_sub(report.rows_inserted);
        Ok(report)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub entries: u64,
    pub loaded: u64,
    pub failed: u64,
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_ignored: u64,
    pub partitions_created: u64,
    /// Trading days whose columnar file loaded, taken from the file names.
    pub loaded_days: Vec<NaiveDate>,
}

impl LoadSummary {
    fn absorb(&mut self, report: &LoadReport) {
        self.loaded += 1;
        self.rows_read += report.rows_read;
        self.rows_inserted += report.rows_inserted;
        self.rows_ignored += report.rows_ignored;
        self.partitions_created += report.partitions_created;
    }
}

/// Drains the columnar queue into the partitioned store.
pub struct PartitionedLoader {
    bulk: Box<dyn BulkLoader>,
    queue: Rc<dyn WorkQueue>,
    table: String,
    audit: Rc<AuditLogger>,
}

impl PartitionedLoader {
    pub fn new(
        bulk: Box<dyn BulkLoader>,
        queue: Rc<dyn WorkQueue>,
        table: impl Into<String>,
        audit: Rc<AuditLogger>,
    ) -> Self {
        Self {
            bulk,
            queue,
            table: table.into(),
            audit,
        }
    }

    pub fn run(&self, cancel: &CancelToken) -> Result<LoadSummary, PipelineError> {
        let span = tracing::info_span!(
            "app.load",
            queue = self.queue.label(),
            loader = self.bulk.name(),
            table = %self.table
        );
        let _enter = span.enter();

        let batch = self.queue.drain_all()?;
        let mut summary = LoadSummary::default();
        for entry in &batch.entries {
            cancel.check()?;
            summary.entries += 1;
            match self.load_file(entry) {
                Ok(report) => {
                    summary.absorb(&report);
                    if let Some(day) = date_from_snapshot_name(entry) {
                        summary.loaded_days.push(day);
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }
        acknowledge(&*self.queue, &batch, &self.audit)?;
        tracing::info!(
            loaded = summary.loaded,
            failed = summary.failed,
            rows_inserted = summary.rows_inserted,
            rows_ignored = summary.rows_ignored,
            "load stage finished"
        );
        Ok(summary)
    }

    /// Loads one file and records the outcome. Usable outside the queue.
    pub fn load_file(&self, path: &Path) -> Result<LoadReport, PipelineError> {
        let started = Utc::now();
        let record = |level, result, message: String| {
            let record = AuditRecord::new(AuditStep::Load, level, result, message).started_at(started);
            let record = match date_from_snapshot_name(path) {
                Some(day) => record.with_day(day),
                None => record,
            };
            record.finished()
        };

        let outcome = if path.is_file() {
            self.bulk.load(path, &self.table)
        } else {
            Err(PipelineError::NotFound(format!("{} does not exist", path.display())))
        };

        match outcome {
            Ok(report) => {
                metrics::counter!("strata.app.load.rows_inserted_total").increment(report.rows_inserted);
                metrics::counter!("strata.app.load.rows_ignored_total").increment(report.rows_ignored);
                self.audit.record(record(
                    AuditLevel::Info,
                    AuditResult::Success,
                    format!(
                        "{} via {}: read {}, inserted {}, ignored {}, partitions created {}",
                        path.display(),
                        self.bulk.name(),
                        report.rows_read,
                        report.rows_inserted,
                        report.rows_ignored,
                        report.partitions_created
                    ),
                ));
                Ok(report)
            }
            Err(err) => {
                metrics::counter!("strata.app.load.errors_total", "kind" => err.kind().as_str())
                    .increment(1);
                self.audit.record(record(
                    AuditLevel::Error,
                    AuditResult::Failed,
                    format!("{}: {err}", path.display()),
                ));
                Err(err)
            }
        }
    }
}
