use crate::errors::PipelineError;
use crate::value_objects::snapshot::SnapshotTable;
use std::path::Path;

/// Row-oriented snapshot file format.
pub trait SnapshotFileWriter {
    fn extension(&self) -> &str;

    fn write(&self, path: &Path, table: &SnapshotTable) -> Result<(), PipelineError>;
}
