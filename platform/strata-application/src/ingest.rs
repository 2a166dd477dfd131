use crate::assembler::{AssemblyOutcome, SnapshotAssembler};
use crate::audit::AuditLogger;
use crate::cancel::CancelToken;
use crate::writer::{SnapshotWriter, WriteError};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::rc::Rc;
use strata_domain::errors::PipelineError;
use strata_domain::services::calendar::{TradingCalendarGate, TradingDay};
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};
use strata_domain::value_objects::date_cursor::DateCursor;
use strata_domain::value_objects::day_state::DayState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub days_walked: u64,
    pub skipped: u64,
    pub written: u64,
    pub no_data: u64,
    pub fetch_failed: u64,
    pub write_failed: u64,
    pub snapshots: Vec<PathBuf>,
    #[serde(skip)]
    pub day_states: Vec<(NaiveDate, DayState)>,
}

/// Walks a date range and produces one queued snapshot per trading day.
pub struct IngestDriver {
    calendar: TradingCalendarGate,
    assembler: SnapshotAssembler,
    writer: SnapshotWriter,
    audit: Rc<AuditLogger>,
}

fn transition(state: &mut DayState, next: DayState) {
    match state.advance(next) {
        Ok(advanced) => *state = advanced,
        Err(err) => {
            tracing::error!(error = %err, "unexpected day transition");
            *state = next;
        }
    }
}

impl IngestDriver {
    pub fn new(
        calendar: TradingCalendarGate,
        assembler: SnapshotAssembler,
        writer: SnapshotWriter,
        audit: Rc<AuditLogger>,
    ) -> Self {
        Self {
            calendar,
            assembler,
            writer,
            audit,
        }
    }

    pub fn run(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        instruments: &[String],
        cancel: &CancelToken,
    ) -> Result<IngestSummary, PipelineError> {
        if from > to {
            return Err(PipelineError::Config(format!(
                "from date {from} is after to date {to}"
            )));
        }
        if instruments.is_empty() {
            return Err(PipelineError::Config("no instruments to fetch".to_string()));
        }

        let span = tracing::info_span!("app.ingest", %from, %to, instruments = instruments.len());
        let _enter = span.enter();

        let run_start = Utc::now();
        let run_record = |level, result, message: String| {
            AuditRecord::new(AuditStep::Run, level, result, message)
                .with_range(from, to)
                .started_at(run_start)
        };
        self.audit.record(run_record(
            AuditLevel::Info,
            AuditResult::InProgress,
            format!("ingest started for {} instrument(s)", instruments.len()),
        ));

        let mut summary = IngestSummary::default();
        for day in DateCursor::new(from, to) {
            if cancel.is_cancelled() {
                self.audit.record(
                    run_record(
                        AuditLevel::Warn,
                        AuditResult::Failed,
                        format!("cancelled after {} day(s)", summary.days_walked),
                    )
                    .finished(),
                );
                return Err(PipelineError::Cancelled);
            }
            summary.days_walked += 1;
            let state = self.run_day(day, instruments, &mut summary);
            summary.day_states.push((day, state));
        }

        metrics::counter!("strata.app.ingest.days_total").increment(summary.days_walked);
        let end = if summary.written > 0 {
            run_record(
                AuditLevel::Info,
                AuditResult::Success,
                format!(
                    "{} snapshot(s) written, {} day(s) skipped, {} without data, {} failed",
                    summary.written,
                    summary.skipped,
                    summary.no_data,
                    summary.fetch_failed + summary.write_failed
                ),
            )
        } else {
            run_record(
                AuditLevel::Error,
                AuditResult::Failed,
                "no data fetched for any date in range".to_string(),
            )
        };
        self.audit.record(end.finished());
        Ok(summary)
    }

    fn run_day(&self, day: NaiveDate, instruments: &[String], summary: &mut IngestSummary) -> DayState {
        let mut state = DayState::Pending;

        let skip_reason = match self.calendar.classify(day) {
            TradingDay::Trading => None,
            TradingDay::Weekend => Some((AuditLevel::Info, "weekend".to_string())),
            TradingDay::Holiday => Some((AuditLevel::Info, "market holiday".to_string())),
            TradingDay::Unverified(reason) => Some((
                AuditLevel::Warn,
                format!("holiday calendar unavailable, treated as closed: {reason}"),
            )),
        };
        if let Some((level, message)) = skip_reason {
            summary.skipped += 1;
            transition(&mut state, DayState::Skipped);
            self.audit.record(
                AuditRecord::new(AuditStep::Skipped, level, AuditResult::Skipped, message)
                    .with_day(day)
                    .finished(),
            );
            return state;
        }

        let day_start = Utc::now();
        let day_record = |level, result, message: String| {
            AuditRecord::new(AuditStep::Day, level, result, message)
                .with_day(day)
                .started_at(day_start)
        };
        self.audit.record(day_record(
            AuditLevel::Info,
            AuditResult::InProgress,
            "day started".to_string(),
        ));

        transition(&mut state, DayState::Fetching);
        let end = match self.assembler.assemble(day, instruments) {
            AssemblyOutcome::Assembled(table) => {
                transition(&mut state, DayState::Assembled);
                match self.writer.write(&table) {
                    Ok(path) => {
                        transition(&mut state, DayState::Written);
                        transition(&mut state, DayState::Queued);
                        summary.written += 1;
                        summary.snapshots.push(path);
                        day_record(
                            AuditLevel::Info,
                            AuditResult::Success,
                            format!("{} instrument(s) captured", table.len()),
                        )
                    }
                    Err(WriteError::Write(err)) => {
                        transition(&mut state, DayState::WriteFailed);
                        summary.write_failed += 1;
                        day_record(AuditLevel::Error, AuditResult::Failed, err.to_string())
                    }
                    Err(WriteError::Enqueue(path, err)) => {
                        transition(&mut state, DayState::Written);
                        transition(&mut state, DayState::WriteFailed);
                        summary.write_failed += 1;
                        day_record(
                            AuditLevel::Error,
                            AuditResult::Failed,
                            format!("{} not enqueued: {err}", path.display()),
                        )
                    }
                }
            }
            AssemblyOutcome::NoData => {
                transition(&mut state, DayState::NoData);
                summary.no_data += 1;
                day_record(
                    AuditLevel::Warn,
                    AuditResult::NoData,
                    "no instrument returned data".to_string(),
                )
            }
            AssemblyOutcome::FetchFailed => {
                transition(&mut state, DayState::FetchFailed);
                summary.fetch_failed += 1;
                day_record(
                    AuditLevel::Error,
                    AuditResult::Failed,
                    "every instrument fetch failed".to_string(),
                )
            }
        };
        self.audit.record(end.finished());
        state
    }
}
