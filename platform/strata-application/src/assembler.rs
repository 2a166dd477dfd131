use crate::audit::AuditLogger;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::rc::Rc;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::instrument_fetcher::InstrumentFetcher;
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};
use strata_domain::value_objects::snapshot::{SnapshotRow, SnapshotTable};

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Assembled(SnapshotTable),
    /// Nothing to write and at least one instrument answered without data.
    NoData,
    /// Nothing to write and every instrument failed.
    FetchFailed,
}

/// Builds one day's snapshot by fetching every instrument for that day.
pub struct SnapshotAssembler {
    fetcher: Box<dyn InstrumentFetcher>,
    audit: Rc<AuditLogger>,
}

/// Drops repeated ids, keeping first-seen order.
pub fn unique_instruments(instruments: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    instruments
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

impl SnapshotAssembler {
    pub fn new(fetcher: Box<dyn InstrumentFetcher>, audit: Rc<AuditLogger>) -> Self {
        Self { fetcher, audit }
    }

    pub fn assemble(&self, date: NaiveDate, instruments: &[String]) -> AssemblyOutcome {
        let span = tracing::info_span!("app.assemble", %date, provider = self.fetcher.name());
        let _enter = span.enter();

        let mut table = SnapshotTable::new(date);
        let mut answered_empty = false;

        for instrument_id in unique_instruments(instruments) {
            let started = Utc::now();
            let base = |level, result, message: String| {
                AuditRecord::new(AuditStep::Fetch, level, result, message)
                    .with_instrument(instrument_id)
                    .with_day(date)
                    .started_at(started)
                    .finished()
            };

            match self.fetcher.fetch(instrument_id, date, date) {
                Ok(bars) => {
                    let fetched = bars.len();
                    let mut kept = 0usize;
                    for bar in bars.iter().filter(|bar| bar.date == date) {
                        if table.push(SnapshotRow::from_bar(instrument_id, bar)) {
                            kept += 1;
                        }
                    }
                    if kept == 0 {
                        answered_empty = true;
                        let err = PipelineError::DataQuality(format!(
                            "no bar for {date} ({fetched} bar(s) returned)"
                        ));
                        self.audit
                            .record(base(AuditLevel::Warn, AuditResult::Failed, err.to_string()));
                    } else {
                        self.audit.record(base(
                            AuditLevel::Info,
                            AuditResult::Success,
                            format!("fetched {kept} bar(s) from {}", self.fetcher.name()),
                        ));
                    }
                }
                Err(err) => {
                    metrics::counter!("strata.app.fetch.errors_total", "kind" => err.kind().as_str())
                        .increment(1);
                    self.audit
                        .record(base(AuditLevel::Error, AuditResult::Failed, err.to_string()));
                }
            }
        }

        if !table.is_empty() {
            AssemblyOutcome::Assembled(table)
        } else if answered_empty || instruments.is_empty() {
            AssemblyOutcome::NoData
        } else {
            AssemblyOutcome::FetchFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{unique_instruments, AssemblyOutcome, SnapshotAssembler};
    use crate::audit::testing::MemorySink;
    use crate::audit::AuditLogger;
    use chrono::NaiveDate;
    use std::rc::Rc;
    use strata_domain::errors::PipelineError;
    use strata_domain::repositories::instrument_fetcher::InstrumentFetcher;
    use strata_domain::value_objects::audit::{AuditResult, AuditStep};
    use strata_domain::value_objects::price_bar::PriceBar;

    struct ScriptedFetcher;

    fn bar(date: NaiveDate) -> PriceBar {
        PriceBar {
            date,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
            dividends: 0.0,
            split_ratio: 0.0,
        }
    }

    impl InstrumentFetcher for ScriptedFetcher {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(
            &self,
            instrument_id: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceBar>, PipelineError> {
            match instrument_id {
                "GOOD" => Ok(vec![bar(start)]),
                "STALE" => Ok(vec![bar(start.pred_opt().unwrap())]),
                "EMPTY" => Ok(vec![]),
                _ => Err(PipelineError::Transient(format!("{instrument_id} timed out"))),
            }
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn assembler() -> (SnapshotAssembler, MemorySink) {
        let sink = MemorySink::default();
        let audit = Rc::new(AuditLogger::fallback_only(Box::new(sink.clone())));
        (SnapshotAssembler::new(Box::new(ScriptedFetcher), audit), sink)
    }

    #[test]
    fn mixed_outcomes_keep_successful_instruments() {
        let (assembler, sink) = assembler();
        let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let outcome = assembler.assemble(day, &ids(&["GOOD", "EMPTY", "BROKEN", "STALE", "GOOD"]));
        let AssemblyOutcome::Assembled(table) = outcome else {
            panic!("expected a table");
        };
        assert_eq!(table.instrument_ids(), vec!["GOOD"]);

        let records = sink.records.borrow();
        assert_eq!(records.len(), 4, "duplicate id fetched once");
        assert!(records.iter().all(|r| r.step == AuditStep::Fetch));
        let failed = records
            .iter()
            .filter(|r| r.result == AuditResult::Failed)
            .count();
        assert_eq!(failed, 3);
        assert!(records[1].message.contains("data quality"));
    }

    #[test]
    fn empty_answers_are_no_data() {
        let (assembler, _) = assembler();
        let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        assert_eq!(
            assembler.assemble(day, &ids(&["EMPTY", "BROKEN"])),
            AssemblyOutcome::NoData
        );
    }

    #[test]
    fn all_errors_are_fetch_failed() {
        let (assembler, _) = assembler();
        let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        assert_eq!(
            assembler.assemble(day, &ids(&["BROKEN", "DOWN"])),
            AssemblyOutcome::FetchFailed
        );
    }

    #[test]
    fn unique_instruments_keeps_first_order() {
        let list = ids(&["B", "A", "B", "C", "A"]);
        assert_eq!(unique_instruments(&list), vec!["B", "A", "C"]);
    }
}
