pub mod audit;
pub mod date_cursor;
pub mod day_state;
pub mod partition;
pub mod price_bar;
pub mod raw_frame;
pub mod snapshot;
