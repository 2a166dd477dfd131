use crate::audit::AuditLogger;
use crate::cancel::CancelToken;
use crate::writer::absolute;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::columnar::ColumnarCodec;
use strata_domain::repositories::work_queue::{DrainedBatch, WorkQueue};
use strata_domain::services::layout::{date_from_snapshot_name, mirror_path};
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertSummary {
    pub entries: u64,
    pub converted: u64,
    pub failed: u64,
    pub sources_deleted: u64,
    pub rows: u64,
    /// Trading days whose snapshot converted, taken from the file names.
    pub converted_days: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub destination: PathBuf,
    pub rows: u64,
    pub source_deleted: bool,
}

/// Drains the snapshot queue into columnar files mirrored under `dest_root`.
pub struct ColumnarConverter {
    codec: Box<dyn ColumnarCodec>,
    source_queue: Rc<dyn WorkQueue>,
    target_queue: Rc<dyn WorkQueue>,
    source_root: PathBuf,
    dest_root: PathBuf,
    delete_source: bool,
    audit: Rc<AuditLogger>,
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, ext, out)?;
        } else if has_extension(&path, ext) {
            out.push(path);
        }
    }
    Ok(())
}

impl ColumnarConverter {
    pub fn new(
        codec: Box<dyn ColumnarCodec>,
        source_queue: Rc<dyn WorkQueue>,
        target_queue: Rc<dyn WorkQueue>,
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        audit: Rc<AuditLogger>,
    ) -> Self {
        Self {
            codec,
            source_queue,
            target_queue,
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            delete_source: false,
            audit,
        }
    }

    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    /// Converts every queued snapshot, then acknowledges the whole batch.
    /// Cancellation leaves the batch unacknowledged.
    pub fn run(&self, cancel: &CancelToken) -> Result<ConvertSummary, PipelineError> {
        let span = tracing::info_span!("app.convert", queue = self.source_queue.label());
        let _enter = span.enter();

        let batch = self.source_queue.drain_all()?;
        let mut summary = ConvertSummary::default();
        for entry in &batch.entries {
            cancel.check()?;
            self.convert_counted(entry, &mut summary);
        }
        acknowledge(&*self.source_queue, &batch, &self.audit)?;
        tracing::info!(
            converted = summary.converted,
            failed = summary.failed,
            "convert stage finished"
        );
        Ok(summary)
    }

    /// Converts one named file outside the queue.
    pub fn convert_file(&self, path: &Path) -> Result<Converted, PipelineError> {
        self.convert_entry(path)
    }

    /// Converts every source-format file below `dir`, in path order.
    pub fn convert_folder(&self, dir: &Path, cancel: &CancelToken) -> Result<ConvertSummary, PipelineError> {
        let mut files = Vec::new();
        collect_files(dir, self.codec.source_extension(), &mut files)
            .map_err(|err| PipelineError::io(format!("failed to list {}", dir.display()), err))?;
        files.sort();

        let mut summary = ConvertSummary::default();
        for file in &files {
            cancel.check()?;
            self.convert_counted(file, &mut summary);
        }
        Ok(summary)
    }

    fn convert_counted(&self, entry: &Path, summary: &mut ConvertSummary) {
        summary.entries += 1;
        match self.convert_entry(entry) {
            Ok(converted) => {
                summary.converted += 1;
                summary.rows += converted.rows;
                if let Some(day) = date_from_snapshot_name(entry) {
                    summary.converted_days.push(day);
                }
                if converted.source_deleted {
                    summary.sources_deleted += 1;
                }
            }
            Err(_) => summary.failed += 1,
        }
    }

    fn destination_for(&self, source: &Path) -> Result<PathBuf, PipelineError> {
        let source_root = absolute(&self.source_root)?;
        let dest_root = absolute(&self.dest_root)?;
        let source = absolute(source)?;
        Ok(mirror_path(
            &source_root,
            &dest_root,
            &source,
            self.codec.target_extension(),
        ))
    }

    fn convert_entry(&self, source: &Path) -> Result<Converted, PipelineError> {
        let started = Utc::now();
        let record = |step, level, result, message: String| {
            let record = AuditRecord::new(step, level, result, message).started_at(started);
            let record = match date_from_snapshot_name(source) {
                Some(day) => record.with_day(day),
                None => record,
            };
            record.finished()
        };

        let outcome = self.try_convert(source);
        let (destination, rows) = match outcome {
            Ok(done) => done,
            Err(err) => {
                metrics::counter!("strata.app.convert.errors_total", "kind" => err.kind().as_str())
                    .increment(1);
                self.audit.record(record(
                    AuditStep::Convert,
                    AuditLevel::Error,
                    AuditResult::Failed,
                    format!("{}: {err}", source.display()),
                ));
                return Err(err);
            }
        };

        metrics::counter!("strata.app.convert.files_total").increment(1);
        self.audit.record(record(
            AuditStep::Convert,
            AuditLevel::Info,
            AuditResult::Success,
            format!(
                "{} -> {} ({rows} row(s), {})",
                source.display(),
                destination.display(),
                self.codec.compression()
            ),
        ));

        let mut source_deleted = false;
        if self.delete_source {
            match fs::remove_file(source) {
                Ok(()) => {
                    source_deleted = true;
                    self.audit.record(record(
                        AuditStep::SourceDelete,
                        AuditLevel::Info,
                        AuditResult::Success,
                        format!("deleted {}", source.display()),
                    ));
                }
                Err(err) => self.audit.record(record(
                    AuditStep::SourceDelete,
                    AuditLevel::Warn,
                    AuditResult::Failed,
                    format!("could not delete {}: {err}", source.display()),
                )),
            }
        }

        Ok(Converted {
            destination,
            rows,
            source_deleted,
        })
    }

    fn try_convert(&self, source: &Path) -> Result<(PathBuf, u64), PipelineError> {
        if !source.is_file() {
            return Err(PipelineError::NotFound(format!(
                "{} does not exist",
                source.display()
            )));
        }
        let expected = self.codec.source_extension();
        if !has_extension(source, expected) {
            return Err(PipelineError::DataQuality(format!(
                "{} is not a .{expected} file",
                source.display()
            )));
        }
        let destination = self.destination_for(source)?;
        let rows = self.codec.convert(source, &destination)?;
        self.target_queue.enqueue(&destination)?;
        Ok((destination, rows))
    }
}

/// Acknowledges a fully handled batch and records the outcome.
pub(crate) fn acknowledge(
    queue: &dyn WorkQueue,
    batch: &DrainedBatch,
    audit: &AuditLogger,
) -> Result<(), PipelineError> {
    if batch.is_empty() && batch.consumed_bytes == 0 {
        return Ok(());
    }
    let started = Utc::now();
    match queue.acknowledge(batch) {
        Ok(()) => {
            audit.record(
                AuditRecord::new(
                    AuditStep::QueueAck,
                    AuditLevel::Info,
                    AuditResult::Success,
                    format!("acknowledged {} entr(ies) on {}", batch.len(), queue.label()),
                )
                .started_at(started)
                .finished(),
            );
            Ok(())
        }
        Err(err) => {
            audit.record(
                AuditRecord::new(
                    AuditStep::QueueAck,
                    AuditLevel::Error,
                    AuditResult::Failed,
                    format!("failed to acknowledge {}: {err}", queue.label()),
                )
                .started_at(started)
                .finished(),
            );
            Err(err)
        }
    }
}
