use crate::value_objects::price_bar::PriceBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub dividends: f64,
    pub split_ratio: f64,
}

impl SnapshotRow {
    pub fn from_bar(instrument_id: &str, bar: &PriceBar) -> Self {
        Self {
            date: bar.date,
            instrument_id: instrument_id.to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            dividends: bar.dividends,
            split_ratio: bar.split_ratio,
        }
    }
}

/// Every row captured for one trading day, at most one per instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotTable {
    pub date: NaiveDate,
    rows: Vec<SnapshotRow>,
}

impl SnapshotTable {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            rows: Vec::new(),
        }
    }

    /// Adds a row unless the instrument is already present or the row is for
    /// another day. Returns whether the row was kept.
    pub fn push(&mut self, row: SnapshotRow) -> bool {
        if row.date != self.date {
            return false;
        }
        if self
            .rows
            .iter()
            .any(|existing| existing.instrument_id == row.instrument_id)
        {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn instrument_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.instrument_id.as_str()).collect()
    }
}
