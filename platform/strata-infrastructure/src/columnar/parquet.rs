use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::time::Instant;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::columnar::{ColumnarCodec, ColumnarReader};
use strata_domain::value_objects::raw_frame::{CellValue, RawFrame};

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// CSV to Parquet conversion and Parquet reads through polars. Output is
/// always Snappy-compressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarsParquetCodec;

impl PolarsParquetCodec {
    fn read_csv(source: &Path) -> Result<DataFrame, PipelineError> {
        CsvReadOptions::default()
            .with_has_header(true)
            .map_parse_options(|opts| opts.with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(source.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|err| {
                PipelineError::DataQuality(format!("failed to parse CSV {}: {err}", source.display()))
            })
    }
}

impl ColumnarCodec for PolarsParquetCodec {
    fn source_extension(&self) -> &str {
        "csv"
    }

    fn target_extension(&self) -> &str {
        "parquet"
    }

    fn compression(&self) -> &str {
        "snappy"
    }

    fn convert(&self, source: &Path, destination: &Path) -> Result<u64, PipelineError> {
        let start = Instant::now();
        let span = tracing::info_span!(
            "infra.parquet.convert",
            source = %source.display(),
            destination = %destination.display()
        );
        let _enter = span.enter();

        let mut df = Self::read_csv(source)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                PipelineError::io(format!("failed to create {}", parent.display()), err)
            })?;
        }
        let file = File::create(destination).map_err(|err| {
            PipelineError::io(format!("failed to create {}", destination.display()), err)
        })?;
        if let Err(err) = ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
        {
            let _ = fs::remove_file(destination);
            metrics::counter!("strata.infra.parquet.convert_errors_total").increment(1);
            return Err(PipelineError::Io(format!(
                "failed to write parquet {}: {err}",
                destination.display()
            )));
        }

        let rows = df.height() as u64;
        metrics::counter!("strata.infra.parquet.rows_converted_total").increment(rows);
        metrics::histogram!("strata.infra.parquet.convert_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(rows, "converted");
        Ok(rows)
    }
}

impl ColumnarReader for PolarsParquetCodec {
    fn read_frame(&self, path: &Path) -> Result<RawFrame, PipelineError> {
        let file = File::open(path)
            .map_err(|err| PipelineError::io(format!("failed to open {}", path.display()), err))?;
        let df = ParquetReader::new(file).finish().map_err(|err| {
            PipelineError::DataQuality(format!("failed to read parquet {}: {err}", path.display()))
        })?;
        dataframe_to_frame(&df)
    }
}

fn dataframe_to_frame(df: &DataFrame) -> Result<RawFrame, PipelineError> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let height = df.height();
    let mut rows = vec![Vec::with_capacity(columns.len()); height];

    for column in df.get_columns() {
        let series = column.as_materialized_series();
        for (idx, row) in rows.iter_mut().enumerate() {
            let value = series.get(idx).map_err(|err| {
                PipelineError::DataQuality(format!("column {}: {err}", series.name()))
            })?;
            row.push(to_cell(value));
        }
    }

    Ok(RawFrame { columns, rows })
}

fn to_cell(value: AnyValue<'_>) -> CellValue {
    match value {
        AnyValue::Null => CellValue::Null,
        AnyValue::Boolean(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int32(v) => CellValue::Int(v.into()),
        AnyValue::Int64(v) => CellValue::Int(v),
        AnyValue::UInt32(v) => CellValue::Int(v.into()),
        AnyValue::UInt64(v) => CellValue::Int(v as i64),
        AnyValue::Float32(v) => CellValue::Float(v.into()),
        AnyValue::Float64(v) => CellValue::Float(v),
        AnyValue::String(v) => CellValue::Text(v.to_string()),
        AnyValue::StringOwned(v) => CellValue::Text(v.to_string()),
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        AnyValue::Datetime(value, unit, _) => datetime_from(value, unit)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Null),
        other => CellValue::Text(other.to_string()),
    }
}

fn datetime_from(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    };
    dt.map(|dt| dt.naive_utc())
}
