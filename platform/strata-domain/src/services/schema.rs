use crate::errors::PipelineError;
use crate::value_objects::raw_frame::{CellValue, RawFrame};
use crate::value_objects::snapshot::SnapshotRow;
use chrono::NaiveDate;

/// Maps the column names found in a columnar file onto the storage schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMapping {
    V1,
}

const REQUIRED_NUMERIC: [&str; 5] = ["open", "high", "low", "close", "volume"];

impl SchemaMapping {
    pub const CURRENT: SchemaMapping = SchemaMapping::V1;

    pub fn version(&self) -> u32 {
        match self {
            SchemaMapping::V1 => 1,
        }
    }

    /// Lowercases, trims, turns inner whitespace into underscores and
    /// resolves known aliases.
    pub fn canonical_column(&self, raw: &str) -> String {
        let normalized = raw
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        match self {
            SchemaMapping::V1 => match normalized.as_str() {
                "ticker" | "symbol" => "instrument_id".to_string(),
                "stock_splits" | "splits" => "split_ratio".to_string(),
                _ => normalized,
            },
        }
    }

    pub fn apply(&self, frame: &RawFrame) -> Result<Vec<SnapshotRow>, PipelineError> {
        let columns: Vec<String> = frame
            .columns
            .iter()
            .map(|c| self.canonical_column(c))
            .collect();
        let find = |name: &str| columns.iter().position(|c| c == name);

        let date_idx = find("date").ok_or_else(|| {
            PipelineError::DataQuality("missing mandatory column 'date'".to_string())
        })?;
        let id_idx = find("instrument_id").ok_or_else(|| {
            PipelineError::DataQuality("missing mandatory column 'instrument_id'".to_string())
        })?;
        let mut numeric_idx = [0usize; 5];
        for (slot, name) in numeric_idx.iter_mut().zip(REQUIRED_NUMERIC) {
            *slot = find(name).ok_or_else(|| {
                PipelineError::DataQuality(format!("missing mandatory column '{name}'"))
            })?;
        }
        let dividends_idx = find("dividends");
        let split_idx = find("split_ratio");

        let mut out = Vec::with_capacity(frame.height());
        for (row_no, row) in frame.rows.iter().enumerate() {
            let cell = |idx: usize| row.get(idx).unwrap_or(&CellValue::Null);

            let date = parse_date(cell(date_idx)).ok_or_else(|| {
                PipelineError::DataQuality(format!(
                    "row {row_no}: unparsable date {:?}",
                    cell(date_idx)
                ))
            })?;
            let instrument_id = cell(id_idx)
                .as_text()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    PipelineError::DataQuality(format!("row {row_no}: empty instrument_id"))
                })?;

            let price = |idx: usize| cell(idx).as_f64().unwrap_or(f64::NAN);
            let optional = |idx: Option<usize>| idx.and_then(|i| cell(i).as_f64()).unwrap_or(0.0);

            out.push(SnapshotRow {
                date,
                instrument_id,
                open: price(numeric_idx[0]),
                high: price(numeric_idx[1]),
                low: price(numeric_idx[2]),
                close: price(numeric_idx[3]),
                volume: cell(numeric_idx[4]).as_i64().unwrap_or(0),
                dividends: optional(dividends_idx),
                split_ratio: optional(split_idx),
            });
        }
        Ok(out)
    }
}

/// Accepts date cells, timestamps, and text starting with `YYYY-MM-DD`.
/// Timestamps with an offset keep their local calendar date.
pub fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Text(s) => {
            let s = s.trim();
            s.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_date, SchemaMapping};
    use crate::errors::PipelineError;
    use crate::value_objects::raw_frame::{CellValue, RawFrame};
    use chrono::NaiveDate;

    fn frame(columns: &[&str], rows: Vec<Vec<CellValue>>) -> RawFrame {
        RawFrame {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn canonical_column_normalizes_and_aliases() {
        let m = SchemaMapping::V1;
        assert_eq!(m.canonical_column(" Stock Splits "), "split_ratio");
        assert_eq!(m.canonical_column("Ticker"), "instrument_id");
        assert_eq!(m.canonical_column("Close"), "close");
        assert_eq!(m.canonical_column("Adj  Close"), "adj_close");
    }

    #[test]
    fn applies_snapshot_header() {
        let f = frame(
            &[
                "Date",
                "Open",
                "High",
                "Low",
                "Close",
                "Volume",
                "Dividends",
                "Stock Splits",
                "Ticker",
            ],
            vec![vec![
                CellValue::Text("2024-02-05 00:00:00-05:00".to_string()),
                CellValue::Float(10.0),
                CellValue::Float(11.0),
                CellValue::Float(9.5),
                CellValue::Float(10.5),
                CellValue::Int(1200),
                CellValue::Float(0.0),
                CellValue::Float(2.0),
                CellValue::Text("AAPL".to_string()),
            ]],
        );
        let rows = SchemaMapping::CURRENT.apply(&f).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 2, 5).unwrap());
        assert_eq!(row.instrument_id, "AAPL");
        assert_eq!(row.volume, 1200);
        assert_eq!(row.split_ratio, 2.0);
    }

    #[test]
    fn missing_date_column_is_data_quality() {
        let f = frame(
            &["Open", "High", "Low", "Close", "Volume", "Ticker"],
            vec![],
        );
        let err = SchemaMapping::V1.apply(&f).unwrap_err();
        assert!(matches!(err, PipelineError::DataQuality(ref msg) if msg.contains("date")));
    }

    #[test]
    fn optional_columns_default_to_zero() {
        let f = frame(
            &["date", "open", "high", "low", "close", "volume", "ticker"],
            vec![vec![
                CellValue::Date(NaiveDate::from_ymd_opt(2024, 2, 6).unwrap()),
                CellValue::Float(1.0),
                CellValue::Float(1.0),
                CellValue::Float(1.0),
                CellValue::Float(1.0),
                CellValue::Null,
                CellValue::Text("MSFT".to_string()),
            ]],
        );
        let rows = SchemaMapping::V1.apply(&f).unwrap();
        assert_eq!(rows[0].dividends, 0.0);
        assert_eq!(rows[0].split_ratio, 0.0);
        assert_eq!(rows[0].volume, 0);
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date(&CellValue::Text("yesterday".to_string())).is_none());
        assert!(parse_date(&CellValue::Int(20240205)).is_none());
        assert!(parse_date(&CellValue::Null).is_none());
    }
}
