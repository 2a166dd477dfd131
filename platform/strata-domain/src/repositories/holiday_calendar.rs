use crate::errors::PipelineError;
use chrono::NaiveDate;
use std::collections::BTreeSet;

pub trait HolidaySource {
    /// Market holidays (weekday closures) for one calendar year.
    fn holidays(&self, year: i32) -> Result<BTreeSet<NaiveDate>, PipelineError>;
}
