use crate::repositories::holiday_calendar::HolidaySource;
use chrono::{Datelike, NaiveDate, Weekday};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradingDay {
    Trading,
    Weekend,
    Holiday,
    /// The holiday source could not be consulted; treated as closed.
    Unverified(String),
}

impl TradingDay {
    pub fn is_trading(&self) -> bool {
        matches!(self, TradingDay::Trading)
    }
}

/// Decides whether a date is a trading day. Fails closed when the holiday
/// source is unavailable.
pub struct TradingCalendarGate {
    source: Box<dyn HolidaySource>,
    cache: RefCell<BTreeMap<i32, BTreeSet<NaiveDate>>>,
}

impl TradingCalendarGate {
    pub fn new(source: Box<dyn HolidaySource>) -> Self {
        Self {
            source,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn classify(&self, date: NaiveDate) -> TradingDay {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return TradingDay::Weekend;
        }

        let year = date.year();
        if let Some(holidays) = self.cache.borrow().get(&year) {
            return if holidays.contains(&date) {
                TradingDay::Holiday
            } else {
                TradingDay::Trading
            };
        }

        // failures are not cached so a later day can retry the source
        match self.source.holidays(year) {
            Ok(holidays) => {
                let is_holiday = holidays.contains(&date);
                self.cache.borrow_mut().insert(year, holidays);
                if is_holiday {
                    TradingDay::Holiday
                } else {
                    TradingDay::Trading
                }
            }
            Err(err) => TradingDay::Unverified(err.to_string()),
        }
    }

    pub fn is_non_trading_day(&self, date: NaiveDate) -> bool {
        !self.classify(date).is_trading()
    }
}

#[cfg(test)]
mod tests {
    use super::{TradingCalendarGate, TradingDay};
    use crate::errors::PipelineError;
    use crate::repositories::holiday_calendar::HolidaySource;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    struct FixedHolidays(Vec<NaiveDate>, Rc<Cell<usize>>);

    impl HolidaySource for FixedHolidays {
        fn holidays(&self, _year: i32) -> Result<BTreeSet<NaiveDate>, PipelineError> {
            self.1.set(self.1.get() + 1);
            Ok(self.0.iter().copied().collect())
        }
    }

    struct Unavailable;

    impl HolidaySource for Unavailable {
        fn holidays(&self, _year: i32) -> Result<BTreeSet<NaiveDate>, PipelineError> {
            Err(PipelineError::Transient("calendar offline".to_string()))
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekends_and_holidays_are_non_trading() {
        let calls = Rc::new(Cell::new(0));
        let gate = TradingCalendarGate::new(Box::new(FixedHolidays(
            vec![day(2024, 2, 19)],
            calls.clone(),
        )));
        assert_eq!(gate.classify(day(2024, 2, 3)), TradingDay::Weekend);
        assert_eq!(gate.classify(day(2024, 2, 4)), TradingDay::Weekend);
        assert_eq!(gate.classify(day(2024, 2, 19)), TradingDay::Holiday);
        assert_eq!(gate.classify(day(2024, 2, 20)), TradingDay::Trading);
        assert!(!gate.is_non_trading_day(day(2024, 2, 5)));
        assert_eq!(calls.get(), 1, "holidays are loaded once per year");
    }

    #[test]
    fn unavailable_source_fails_closed() {
        let gate = TradingCalendarGate::new(Box::new(Unavailable));
        let verdict = gate.classify(day(2024, 2, 5));
        assert!(matches!(verdict, TradingDay::Unverified(ref reason) if reason.contains("calendar offline")));
        assert!(gate.is_non_trading_day(day(2024, 2, 5)));
        // weekends never consult the source
        assert_eq!(gate.classify(day(2024, 2, 3)), TradingDay::Weekend);
    }
}
