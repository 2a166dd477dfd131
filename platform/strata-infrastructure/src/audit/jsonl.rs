use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use strata_domain::errors::PipelineError;
use strata_domain::repositories::audit_sink::AuditSink;
use strata_domain::value_objects::audit::AuditRecord;

/// Local fallback sink: one JSON object per line, synced on every append.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), PipelineError> {
        let mut line = serde_json::to_string(record)
            .map_err(|err| PipelineError::Io(format!("failed to encode audit record: {err}")))?;
        line.push('\n');

        let io_err = |err: std::io::Error| {
            PipelineError::Io(format!(
                "failed to append audit fallback {}: {err}",
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
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        metrics::counter!("strata.infra.audit.fallback_records_total").increment(1);
        Ok(())
    }
}
