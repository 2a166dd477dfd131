pub mod atomic;
pub mod audit;
pub mod bulk_load;
pub mod calendar;
pub mod columnar;
pub mod market_data;
pub mod persistence;
pub mod queue;
pub mod snapshot;
