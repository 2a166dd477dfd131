use chrono::NaiveDate;

/// Inclusive calendar-day walk over `[from, to]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateCursor {
    pub from: NaiveDate,
    pub to: NaiveDate,
    current: Option<NaiveDate>,
}

impl DateCursor {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            current: Some(from),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.current {
            Some(day) => day > self.to,
            None => true,
        }
    }

    pub fn remaining_days(&self) -> usize {
        match self.current {
            Some(day) if day <= self.to => ((self.to - day).num_days() + 1) as usize,
            _ => 0,
        }
    }
}

impl Iterator for DateCursor {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let day = self.current?;
        if day > self.to {
            self.current = None;
            return None;
        }
        self.current = day.succ_opt();
        Some(day)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining_days();
        (remaining, Some(remaining))
    }
}
