use std::cell::Cell;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::audit_sink::AuditSink;
use strata_domain::value_objects::audit::{AuditLevel, AuditRecord};

/// Single audit entry point shared by every stage.
///
/// Records go to the primary sink; when that fails they go to the fallback
/// sink and a `WARN` event notes the degraded durability. After the first
/// primary failure the logger stays on the fallback for its lifetime. If
/// both fail the whole record is emitted at `ERROR`. Every record is also
/// mirrored to tracing under the `strata::audit` target.
pub struct AuditLogger {
    primary: Option<Box<dyn AuditSink>>,
    fallback: Box<dyn AuditSink>,
    primary_down: Cell<bool>,
    degraded: Cell<u64>,
    lost: Cell<u64>,
}

impl AuditLogger {
    pub fn new(primary: Box<dyn AuditSink>, fallback: Box<dyn AuditSink>) -> Self {
        Self {
            primary: Some(primary),
            fallback,
            primary_down: Cell::new(false),
            degraded: Cell::new(0),
            lost: Cell::new(0),
        }
    }

    /// Logger without a primary store; every record lands in `fallback`.
    pub fn fallback_only(fallback: Box<dyn AuditSink>) -> Self {
        Self {
            primary: None,
            fallback,
            primary_down: Cell::new(false),
            degraded: Cell::new(0),
            lost: Cell::new(0),
        }
    }

    pub fn record(&self, record: AuditRecord) {
        mirror(&record);

        let primary_err = match &self.primary {
            Some(primary) if !self.primary_down.get() => match primary.append(&record) {
                Ok(()) => return,
                Err(err) => {
                    self.primary_down.set(true);
                    tracing::warn!(
                        error = %err,
                        "primary audit sink failed, using the fallback for the rest of this run"
                    );
                    Some(err.to_string())
                }
            },
            Some(_) => Some("primary audit sink unavailable earlier in this run".to_string()),
            None => None,
        };

        match self.fallback.append(&record) {
            Ok(()) => {
                if let Some(err) = primary_err {
                    self.degraded.set(self.degraded.get() + 1);
                    metrics::counter!("strata.app.audit.degraded_total").increment(1);
                    let degraded = PipelineError::Durability(err);
                    tracing::warn!(
                        error = %degraded,
                        step = record.step.as_str(),
                        "audit record written to fallback sink"
                    );
                }
            }
            Err(fallback_err) => {
                self.lost.set(self.lost.get() + 1);
                metrics::counter!("strata.app.audit.unpersisted_total").increment(1);
                let payload = serde_json::to_string(&record)
                    .unwrap_or_else(|_| format!("{record:?}"));
                tracing::error!(
                    primary_error = %primary_err.unwrap_or_default(),
                    fallback_error = %fallback_err,
                    record = %payload,
                    "audit record could not be persisted"
                );
            }
        }
    }

    /// Records that reached only the fallback sink.
    pub fn degraded_count(&self) -> u64 {
        self.degraded.get()
    }

    /// Records that reached no sink at all.
    pub fn unpersisted_count(&self) -> u64 {
        self.lost.get()
    }
}

fn mirror(record: &AuditRecord) {
    let instrument = record.instrument_id.as_deref().unwrap_or("");
    let from = record.from_date.map(|d| d.to_string()).unwrap_or_default();
    let to = record.to_date.map(|d| d.to_string()).unwrap_or_default();
    match record.level {
        AuditLevel::Info => tracing::info!(
            target: "strata::audit",
            step = record.step.as_str(),
            result = record.result.as_str(),
            instrument,
            from = %from,
            to = %to,
            "{}",
            record.message
        ),
        AuditLevel::Warn => tracing::warn!(
            target: "strata::audit",
            step = record.step.as_str(),
            result = record.result.as_str(),
            instrument,
            from = %from,
            to = %to,
            "{}",
            record.message
        ),
        AuditLevel::Error => tracing::error!(
            target: "strata::audit",
            step = record.step.as_str(),
            result = record.result.as_str(),
            instrument,
            from = %from,
            to = %to,
            "{}",
            record.message
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::AuditLogger;
    use strata_domain::value_objects::audit::{AuditLevel, AuditRecord, AuditResult, AuditStep};

    fn record() -> AuditRecord {
        AuditRecord::new(AuditStep::Fetch, AuditLevel::Info, AuditResult::Success, "ok")
    }

    #[test]
    fn primary_receives_records_when_healthy() {
        let primary = MemorySink::default();
        let fallback = MemorySink::default();
        let logger = AuditLogger::new(Box::new(primary.clone()), Box::new(fallback.clone()));
        logger.record(record());
        assert_eq!(primary.records.borrow().len(), 1);
        assert!(fallback.records.borrow().is_empty());
        assert_eq!(logger.degraded_count(), 0);
    }

    #[test]
    fn primary_failure_degrades_to_fallback() {
        let fallback = MemorySink::default();
        let logger = AuditLogger::new(Box::new(MemorySink::failing()), Box::new(fallback.clone()));
        logger.record(record());
        logger.record(record());
        assert_eq!(fallback.records.borrow().len(), 2);
        assert_eq!(logger.degraded_count(), 2);
        assert_eq!(logger.unpersisted_count(), 0);
    }

    #[test]
    fn failed_primary_is_not_retried_within_a_run() {
        let primary = MemorySink::failing();
        let fallback = MemorySink::default();
        let logger = AuditLogger::new(Box::new(primary.clone()), Box::new(fallback.clone()));
        for _ in 0..5 {
            logger.record(record());
        }
        assert_eq!(primary.attempts.get(), 1);
        assert_eq!(fallback.records.borrow().len(), 5);
        assert_eq!(logger.degraded_count(), 5);
    }

    #[test]
    fn both_sinks_failing_is_counted_not_fatal() {
        let logger = AuditLogger::new(
            Box::new(MemorySink::failing()),
            Box::new(MemorySink::failing()),
        );
        logger.record(record());
        assert_eq!(logger.unpersisted_count(), 1);
    }

    #[test]
    fn fallback_only_logger_is_not_degraded() {
        let fallback = MemorySink::default();
        let logger = AuditLogger::fallback_only(Box::new(fallback.clone()));
        logger.record(record());
        assert_eq!(fallback.records.borrow().len(), 1);
        assert_eq!(logger.degraded_count(), 0);
    }
}
