use chrono::{Datelike, NaiveDate};
use std::fmt;

/// Monthly range partition of the main store table.
///
/// Bounds are `[first-of-month, first-of-next-month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
}

impl PartitionKey {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("invalid partition month: {month}"));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(format!("invalid partition year: {year}"));
        }
        Ok(Self { year, month })
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn lower_bound(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn upper_bound(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.lower_bound() && date < self.upper_bound()
    }

    pub fn table_name(&self, parent: &str) -> String {
        format!("{parent}_{:04}_{:02}", self.year, self.month)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
