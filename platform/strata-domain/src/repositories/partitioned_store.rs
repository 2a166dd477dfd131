use crate::errors::PipelineError;
use crate::value_objects::partition::PartitionKey;
use crate::value_objects::snapshot::SnapshotRow;

/// Range-partitioned relational store keyed by `(date, instrument_id)`.
pub trait PartitionedStore {
    fn ensure_table(&self, table: &str) -> Result<(), PipelineError>;

    /// Creates the monthly partition if missing. Returns `true` only when this
    /// call created it; repeated or concurrent calls must not error.
    fn ensure_partition(&self, table: &str, key: &PartitionKey) -> Result<bool, PipelineError>;

    /// Inserts with conflict-ignore semantics and returns the number of rows
    /// actually inserted.
    fn insert_ignore(&self, table: &str, rows: &[SnapshotRow]) -> Result<u64, PipelineError>;
}
