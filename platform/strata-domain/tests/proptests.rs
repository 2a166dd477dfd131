use chrono::{Datelike, Duration, NaiveDate};
use proptest::prelude::*;
use strata_domain::value_objects::date_cursor::DateCursor;
use strata_domain::value_objects::partition::PartitionKey;

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..20_000).prop_map(|offset| {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(offset)
    })
}

proptest! {
    #[test]
    fn cursor_yields_every_day_once_in_order(start in date_strategy(), span in 0i64..400) {
        let end = start + Duration::days(span);
        let days: Vec<NaiveDate> = DateCursor::new(start, end).collect();
        prop_assert_eq!(days.len() as i64, span + 1);
        prop_assert_eq!(days.first().copied(), Some(start));
        prop_assert_eq!(days.last().copied(), Some(end));
        for pair in days.windows(2) {
            prop_assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }

    #[test]
    fn inverted_cursor_is_empty(start in date_strategy(), gap in 1i64..400) {
        let end = start - Duration::days(gap);
        prop_assert_eq!(DateCursor::new(start, end).count(), 0);
    }

    #[test]
    fn partition_contains_exactly_its_month(date in date_strategy(), probe in date_strategy()) {
        let key = PartitionKey::for_date(date);
        prop_assert!(key.contains(date));
        let same_month = probe.year() == date.year() && probe.month() == date.month();
        prop_assert_eq!(key.contains(probe), same_month);
        prop_assert!(key.lower_bound() <= date && date < key.upper_bound());
    }
}
