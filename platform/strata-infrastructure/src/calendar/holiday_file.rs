use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::holiday_calendar::HolidaySource;

/// Holidays listed one `YYYY-MM-DD` per line; `#` starts a comment. The file
/// is re-read on every lookup, so edits apply to the next uncached year.
#[derive(Debug, Clone)]
pub struct FileHolidaySource {
    path: PathBuf,
}

impl FileHolidaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(content: &str) -> Result<BTreeSet<NaiveDate>, String> {
        let mut out = BTreeSet::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let date = NaiveDate::parse_from_str(line, "%Y-%m-%d")
                .map_err(|err| format!("line {}: invalid date '{line}': {err}", idx + 1))?;
            out.insert(date);
        }
        Ok(out)
    }
}

impl HolidaySource for FileHolidaySource {
    fn holidays(&self, year: i32) -> Result<BTreeSet<NaiveDate>, PipelineError> {
        let content = fs::read_to_string(&self.path).map_err(|err| {
            PipelineError::io(
                format!("failed to read holiday file {}", self.path.display()),
                err,
            )
        })?;
        let all = Self::parse(&content).map_err(|err| {
            PipelineError::DataQuality(format!("holiday file {}: {err}", self.path.display()))
        })?;
        Ok(all.into_iter().filter(|d| d.year() == year).collect())
    }
}
