use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily bar as returned by an instrument fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub dividends: f64,
    pub split_ratio: f64,
}
