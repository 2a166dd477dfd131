use crate::errors::PipelineError;
use crate::repositories::holiday_calendar::HolidaySource;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Rule-based full-day closures of the New York Stock Exchange.
///
/// Covers the regular holiday schedule; one-off closures (days of mourning,
/// weather) come from `extra_closures`.
#[derive(Debug, Clone, Default)]
pub struct NyseHolidayCalendar {
    extra_closures: BTreeSet<NaiveDate>,
}

impl NyseHolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_closures(extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            extra_closures: extra.into_iter().collect(),
        }
    }

    pub fn holidays_for_year(&self, year: i32) -> Result<BTreeSet<NaiveDate>, String> {
        let mut out = BTreeSet::new();

        // Saturday New Year's Day is not moved to the prior Friday.
        let new_year = ymd(year, 1, 1)?;
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => {
                out.insert(new_year + Duration::days(1));
            }
            _ => {
                out.insert(new_year);
            }
        }

        out.insert(nth_weekday(year, 1, Weekday::Mon, 3)?);
        out.insert(nth_weekday(year, 2, Weekday::Mon, 3)?);
        out.insert(easter_sunday(year)? - Duration::days(2));
        out.insert(last_weekday(year, 5, Weekday::Mon)?);
        if year >= 2022 {
            out.insert(observed(ymd(year, 6, 19)?));
        }
        out.insert(observed(ymd(year, 7, 4)?));
        out.insert(nth_weekday(year, 9, Weekday::Mon, 1)?);
        out.insert(nth_weekday(year, 11, Weekday::Thu, 4)?);
        out.insert(observed(ymd(year, 12, 25)?));

        out.extend(
            self.extra_closures
                .iter()
                .copied()
                .filter(|d| d.year() == year),
        );
        Ok(out)
    }
}

impl HolidaySource for NyseHolidayCalendar {
    fn holidays(&self, year: i32) -> Result<BTreeSet<NaiveDate>, PipelineError> {
        self.holidays_for_year(year).map_err(PipelineError::Config)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, String> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("invalid date {year}-{month:02}-{day:02}"))
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> Result<NaiveDate, String> {
    let first = ymd(year, month, 1)?;
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    ymd(year, month, 1 + offset + 7 * (n - 1))
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Result<NaiveDate, String> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let mut day = ymd(next_year, next_month, 1)? - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Ok(day)
}

// Anonymous Gregorian computus.
fn easter_sunday(year: i32) -> Result<NaiveDate, String> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::NyseHolidayCalendar;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn schedule_2024_matches_exchange_calendar() {
        let holidays = NyseHolidayCalendar::new().holidays_for_year(2024).unwrap();
        let expected = vec![
            day(2024, 1, 1),
            day(2024, 1, 15),
            day(2024, 2, 19),
            day(2024, 3, 29),
            day(2024, 5, 27),
            day(2024, 6, 19),
            day(2024, 7, 4),
            day(2024, 9, 2),
            day(2024, 11, 28),
            day(2024, 12, 25),
        ];
        assert_eq!(holidays.into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn schedule_2025_includes_good_friday() {
        let holidays = NyseHolidayCalendar::new().holidays_for_year(2025).unwrap();
        assert!(holidays.contains(&day(2025, 4, 18)));
        assert!(holidays.contains(&day(2025, 1, 20)));
        assert!(holidays.contains(&day(2025, 11, 27)));
        assert_eq!(holidays.len(), 10);
    }

    #[test]
    fn weekend_holidays_are_observed_on_adjacent_weekdays() {
        let cal = NyseHolidayCalendar::new();
        // 2022: New Year's on Saturday is not observed, Juneteenth and
        // Christmas fall on Sunday and move to Monday.
        let h2022 = cal.holidays_for_year(2022).unwrap();
        assert!(!h2022.contains(&day(2021, 12, 31)));
        assert!(h2022.contains(&day(2022, 6, 20)));
        assert!(h2022.contains(&day(2022, 12, 26)));
        // 2026: Independence Day on Saturday moves to Friday.
        let h2026 = cal.holidays_for_year(2026).unwrap();
        assert!(h2026.contains(&day(2026, 7, 3)));
    }

    #[test]
    fn juneteenth_only_from_2022() {
        let h2021 = NyseHolidayCalendar::new().holidays_for_year(2021).unwrap();
        assert!(!h2021.contains(&day(2021, 6, 18)));
        assert!(!h2021.contains(&day(2021, 6, 21)));
    }

    #[test]
    fn extra_closures_are_included_for_their_year() {
        let cal = NyseHolidayCalendar::with_extra_closures(vec![day(2025, 1, 9)]);
        assert!(cal.holidays_for_year(2025).unwrap().contains(&day(2025, 1, 9)));
        assert!(!cal.holidays_for_year(2024).unwrap().contains(&day(2025, 1, 9)));
    }
}
