pub mod csv_snapshot;

pub use csv_snapshot::CsvSnapshotWriter;
