use crate::atomic;
use std::io;
use std::path::Path;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::snapshot_file::SnapshotFileWriter;
use strata_domain::value_objects::snapshot::SnapshotTable;

pub const SNAPSHOT_HEADER: [&str; 9] = [
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "Dividends",
    "Stock Splits",
    "Ticker",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSnapshotWriter;

fn number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

impl SnapshotFileWriter for CsvSnapshotWriter {
    fn extension(&self) -> &str {
        "csv"
    }

    fn write(&self, path: &Path, table: &SnapshotTable) -> Result<(), PipelineError> {
        let span = tracing::info_span!(
            "infra.snapshot.write_csv",
            path = %path.display(),
            date = %table.date
        );
        let _enter = span.enter();

        atomic::write_with(path, |out| {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(SNAPSHOT_HEADER).map_err(io::Error::from)?;
            for row in table.rows() {
                writer
                    .write_record([
                        row.date.format("%Y-%m-%d").to_string(),
                        number(row.open),
                        number(row.high),
                        number(row.low),
                        number(row.close),
                        row.volume.to_string(),
                        number(row.dividends),
                        number(row.split_ratio),
                        row.instrument_id.clone(),
                    ])
                    .map_err(io::Error::from)?;
            }
            writer.flush()
        })
        .map_err(|err| {
            metrics::counter!("strata.infra.snapshot.write_errors_total").increment(1);
            PipelineError::io(format!("failed to write snapshot {}", path.display()), err)
        })?;

        metrics::counter!("strata.infra.snapshot.rows_written_total").increment(table.len() as u64);
        tracing::debug!(rows = table.len(), "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CsvSnapshotWriter;
    use crate::test_support::unique_tmp_dir;
    use chrono::NaiveDate;
    use strata_domain::repositories::snapshot_file::SnapshotFileWriter;
    use strata_domain::value_objects::snapshot::{SnapshotRow, SnapshotTable};

    #[test]
    fn writes_header_and_rows() {
        let dir = unique_tmp_dir("csv_snapshot");
        let date = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let mut table = SnapshotTable::new(date);
        table.push(SnapshotRow {
            date,
            instrument_id: "AAPL".to_string(),
            open: 187.15,
            high: 189.25,
            low: 185.84,
            close: 187.68,
            volume: 69_668_800,
            dividends: 0.0,
            split_ratio: 0.0,
        });
        let path = dir.join("2024").join("02").join("snapshot_2024-02-05.csv");
        CsvSnapshotWriter.write(&path, &table).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Open,High,Low,Close,Volume,Dividends,Stock Splits,Ticker")
        );
        assert_eq!(
            lines.next(),
            Some("2024-02-05,187.15,189.25,185.84,187.68,69668800,0,0,AAPL")
        );
        assert_eq!(lines.next(), None);
        std::fs::remove_dir_all(dir).ok();
    }
}
