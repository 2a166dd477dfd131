use crate::atomic;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use strata_domain::errors::PipelineError;
use strata_domain::repositories::work_queue::{DrainedBatch, WorkQueue};

/// Newline-delimited list of file paths, appended with `sync_data` and
/// consumed by prefix.
///
/// Single-process: `acknowledge` reads the file and then removes or replaces
/// it, so an entry appended by another process in between is lost. Runs that
/// share a queue file must not overlap.
#[derive(Debug, Clone)]
pub struct FileWorkQueue {
    label: String,
    path: PathBuf,
}

impl FileWorkQueue {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_content(&self) -> Result<Option<Vec<u8>>, PipelineError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PipelineError::Io(format!(
                "failed to read queue {} ({}): {err}",
                self.label,
                self.path.display()
            ))),
        }
    }
}

impl WorkQueue for FileWorkQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn enqueue(&self, entry: &Path) -> Result<(), PipelineError> {
        let line = entry.to_str().ok_or_else(|| {
            PipelineError::DataQuality(format!(
                "queue entry is not valid UTF-8: {}",
                entry.display()
            ))
        })?;
        if line.contains('\n') {
            return Err(PipelineError::DataQuality(format!(
                "queue entry contains a newline: {line:?}"
            )));
        }

        let io_err = |err: io::Error| {
            metrics::counter!("strata.infra.queue.enqueue_errors_total", "queue" => self.label.clone())
                .increment(1);
            PipelineError::Io(format!(
                "failed to append to queue {} ({}): {err}",
                self.label,
                self.path.display()
            ))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(io_err)?;
        file.flush().map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        metrics::counter!("strata.infra.queue.enqueued_total", "queue" => self.label.clone())
            .increment(1);
        tracing::debug!(queue = %self.label, entry = %line, "enqueued");
        Ok(())
    }

    fn drain_all(&self) -> Result<DrainedBatch, PipelineError> {
        let Some(bytes) = self.read_content()? else {
            return Ok(DrainedBatch::default());
        };
        let text = std::str::from_utf8(&bytes).map_err(|err| {
            PipelineError::DataQuality(format!(
                "queue {} ({}) is not valid UTF-8: {err}",
                self.label,
                self.path.display()
            ))
        })?;
        // entries are taken verbatim; only whitespace-only lines are skipped
        let entries: Vec<PathBuf> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect();

        metrics::counter!("strata.infra.queue.drained_total", "queue" => self.label.clone())
            .increment(entries.len() as u64);
        tracing::debug!(queue = %self.label, entries = entries.len(), "drained");
        Ok(DrainedBatch {
            entries,
            consumed_bytes: bytes.len() as u64,
        })
    }

    fn acknowledge(&self, batch: &DrainedBatch) -> Result<(), PipelineError> {
        if batch.consumed_bytes == 0 {
            return Ok(());
        }
        let Some(current) = self.read_content()? else {
            return Ok(());
        };
        let consumed = batch.consumed_bytes as usize;
        if current.len() < consumed {
            return Err(PipelineError::Io(format!(
                "queue {} shrank from {consumed} to {} bytes since it was drained",
                self.label,
                current.len()
            )));
        }

        let io_err = |err: io::Error| {
            PipelineError::Io(format!(
                "failed to acknowledge queue {} ({}): {err}",
                self.label,
                self.path.display()
            ))
        };
        if current.len() == consumed {
            fs::remove_file(&self.path).map_err(io_err)?;
        } else {
            atomic::write_bytes(&self.path, &current[consumed..]).map_err(io_err)?;
        }

        tracing::debug!(
            queue = %self.label,
            acknowledged = batch.len(),
            remaining_bytes = current.len() - consumed,
            "acknowledged"
        );
        Ok(())
    }
}
