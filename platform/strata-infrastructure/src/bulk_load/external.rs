use std::path::Path;
use std::process::Command;
use std::time::Instant;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::bulk_loader::{BulkLoader, LoadReport};

/// Hands a columnar file to an external bulk-load program. `{file}` and
/// `{table}` in the arguments are substituted per call. The tool reports no
/// row counts, so the returned report is empty.
#[derive(Debug, Clone)]
pub struct ExternalToolBulkLoader {
    program: String,
    args: Vec<String>,
}

impl ExternalToolBulkLoader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, PipelineError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(PipelineError::Config(
                "bulk_load.program must not be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    pub fn render_args(&self, file: &Path, table: &str) -> Vec<String> {
        let file = file.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{file}", &file).replace("{table}", table))
            .collect()
    }
}

impl BulkLoader for ExternalToolBulkLoader {
    fn name(&self) -> &str {
        "external"
    }

    fn load(&self, file: &Path, target_table: &str) -> Result<LoadReport, PipelineError> {
        let start = Instant::now();
        let args = self.render_args(file, target_table);
        let span = tracing::info_span!(
            "infra.bulk_load.external",
            program = %self.program,
            file = %file.display()
        );
        let _enter = span.enter();

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|err| {
                PipelineError::ExternalTool(format!("failed to spawn {}: {err}", self.program))
            })?;

        metrics::histogram!("strata.infra.bulk_load.external_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            metrics::counter!("strata.infra.bulk_load.external_failures_total").increment(1);
            return Err(PipelineError::ExternalTool(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(status = %output.status, "external bulk load finished");
        Ok(LoadReport::default())
    }
}
