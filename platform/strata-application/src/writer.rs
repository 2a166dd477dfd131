use crate::audit::AuditLogger;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::snapshot_file::SnapshotFileWriter;
use strata_domain::repositories::work_queue::WorkQueue;
use strata_domain::services::layout::snapshot_path;
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};
use strata_domain::value_objects::snapshot::SnapshotTable;

/// Persists a day's snapshot under the dated layout and hands its absolute
/// path to the snapshot queue.
pub struct SnapshotWriter {
    root: PathBuf,
    file: Box<dyn SnapshotFileWriter>,
    queue: Rc<dyn WorkQueue>,
    audit: Rc<AuditLogger>,
}

#[derive(Debug)]
pub enum WriteError {
    /// Nothing usable was written.
    Write(PipelineError),
    /// The file exists but could not be enqueued.
    Enqueue(PathBuf, PipelineError),
}

impl SnapshotWriter {
    pub fn new(
        root: impl Into<PathBuf>,
        file: Box<dyn SnapshotFileWriter>,
        queue: Rc<dyn WorkQueue>,
        audit: Rc<AuditLogger>,
    ) -> Self {
        Self {
            root: root.into(),
            file,
            queue,
            audit,
        }
    }

    fn absolute_root(&self) -> Result<PathBuf, PipelineError> {
        absolute(&self.root)
    }

    pub fn write(&self, table: &SnapshotTable) -> Result<PathBuf, WriteError> {
        let started = Utc::now();
        let record = |level, result, message: String| {
            AuditRecord::new(AuditStep::SnapshotWrite, level, result, message)
                .with_day(table.date)
                .started_at(started)
                .finished()
        };

        let path = match self
            .absolute_root()
            .map(|root| snapshot_path(&root, table.date, self.file.extension()))
            .and_then(|path| self.file.write(&path, table).map(|()| path))
        {
            Ok(path) => path,
            Err(err) => {
                self.audit.record(record(
                    AuditLevel::Error,
                    AuditResult::Failed,
                    format!("failed to write snapshot: {err}"),
                ));
                return Err(WriteError::Write(err));
            }
        };

        if let Err(err) = self.queue.enqueue(&path) {
            self.audit.record(record(
                AuditLevel::Error,
                AuditResult::Failed,
                format!(
                    "wrote {} but could not enqueue it on {}: {err}",
                    path.display(),
                    self.queue.label()
                ),
            ));
            return Err(WriteError::Enqueue(path, err));
        }

        metrics::counter!("strata.app.snapshots_written_total").increment(1);
        self.audit.record(record(
            AuditLevel::Info,
            AuditResult::Success,
            format!("wrote {} row(s) to {}", table.len(), path.display()),
        ));
        Ok(path)
    }
}

/// Resolves `path` against the working directory without touching the
/// filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf, PipelineError> {
    std::path::absolute(path)
        .map_err(|err| PipelineError::io(format!("cannot resolve {}", path.display()), err))
}
