pub mod audit_sink;
pub mod bulk_loader;
pub mod columnar;
pub mod holiday_calendar;
pub mod instrument_fetcher;
pub mod partitioned_store;
pub mod snapshot_file;
pub mod work_queue;
