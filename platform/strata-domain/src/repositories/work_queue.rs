use crate::errors::PipelineError;
use std::path::{Path, PathBuf};

/// Entries read by one drain. Acknowledging the batch removes exactly these
/// entries from the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainedBatch {
    pub entries: Vec<PathBuf>,
    /// Length in bytes of the queue content the entries were read from.
    pub consumed_bytes: u64,
}

impl DrainedBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Append-only work list between two pipeline stages (at-least-once).
pub trait WorkQueue {
    fn label(&self) -> &str;

    fn enqueue(&self, path: &Path) -> Result<(), PipelineError>;

    fn drain_all(&self) -> Result<DrainedBatch, PipelineError>;

    /// Must only be called once every entry of `batch` has been handled.
    fn acknowledge(&self, batch: &DrainedBatch) -> Result<(), PipelineError>;
}
