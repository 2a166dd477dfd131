pub mod parquet;

pub use parquet::PolarsParquetCodec;
