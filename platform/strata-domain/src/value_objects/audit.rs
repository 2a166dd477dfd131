use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStep {
    Run,
    Day,
    Skipped,
    Fetch,
    SnapshotWrite,
    Convert,
    SourceDelete,
    Load,
    QueueAck,
}

impl AuditStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStep::Run => "run",
            AuditStep::Day => "day",
            AuditStep::Skipped => "skipped",
            AuditStep::Fetch => "fetch",
            AuditStep::SnapshotWrite => "snapshot_write",
            AuditStep::Convert => "convert",
            AuditStep::SourceDelete => "source_delete",
            AuditStep::Load => "load",
            AuditStep::QueueAck => "queue_ack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warn => "WARN",
            AuditLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    InProgress,
    Success,
    Failed,
    Skipped,
    NoData,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::InProgress => "in_progress",
            AuditResult::Success => "success",
            AuditResult::Failed => "failed",
            AuditResult::Skipped => "skipped",
            AuditResult::NoData => "no_data",
        }
    }
}

/// One append-only audit row. `instrument_id` is `None` for events that
/// concern the whole run, day or file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub step: AuditStep,
    pub level: AuditLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    pub message: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: AuditResult,
}

impl AuditRecord {
    pub fn new(step: AuditStep, level: AuditLevel, result: AuditResult, message: impl Into<String>) -> Self {
        Self {
            step,
            level,
            instrument_id: None,
            message: message.into(),
            from_date: None,
            to_date: None,
            start_time: Utc::now(),
            end_time: None,
            result,
        }
    }

    pub fn with_instrument(mut self, instrument_id: impl Into<String>) -> Self {
        self.instrument_id = Some(instrument_id.into());
        self
    }

    pub fn with_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }

    pub fn with_day(self, day: NaiveDate) -> Self {
        self.with_range(day, day)
    }

    pub fn started_at(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = start;
        self
    }

    /// Stamps `end_time` with the current instant.
    pub fn finished(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditLevel, AuditRecord, AuditResult, AuditStep};
    use chrono::NaiveDate;

    #[test]
    fn serializes_with_wire_names() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let record = AuditRecord::new(
            AuditStep::SnapshotWrite,
            AuditLevel::Warn,
            AuditResult::NoData,
            "nothing to write",
        )
        .with_day(day)
        .finished();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["step"], "snapshot_write");
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["result"], "no_data");
        assert_eq!(json["from_date"], "2024-02-05");
        assert!(json.get("instrument_id").is_none());
        assert!(record.end_time.unwrap() >= record.start_time);

        let back: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
