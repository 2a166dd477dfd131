use crate::errors::PipelineError;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_read: u64,
    pub rows_inserted: u64,
    /// Rows dropped because their key already existed.
    pub rows_ignored: u64,
    pub partitions_created: u64,
}

pub trait BulkLoader {
    fn name(&self) -> &str;

    fn load(&self, file: &Path, target_table: &str) -> Result<LoadReport, PipelineError>;
}
