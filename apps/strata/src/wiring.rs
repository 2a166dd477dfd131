use std::env;
use std::rc::Rc;
use std::time::Duration;
use strata_application::assembler::SnapshotAssembler;
use strata_application::audit::AuditLogger;
use strata_application::config::{BulkLoadMode, CalendarSource, Config};
use strata_application::convert::ColumnarConverter;
use strata_application::ingest::IngestDriver;
use strata_application::load::{DriverBulkLoader, PartitionedLoader};
use strata_application::pipeline::Pipeline;
use strata_application::writer::SnapshotWriter;
use strata_domain::repositories::bulk_loader::BulkLoader;
use strata_domain::repositories::holiday_calendar::HolidaySource;
use strata_domain::repositories::partitioned_store::PartitionedStore;
use strata_domain::services::calendar::TradingCalendarGate;
use strata_domain::services::nyse::NyseHolidayCalendar;
use strata_infrastructure::audit::JsonlAuditSink;
use strata_infrastructure::bulk_load::ExternalToolBulkLoader;
use strata_infrastructure::calendar::FileHolidaySource;
use strata_infrastructure::columnar::PolarsParquetCodec;
use strata_infrastructure::market_data::{YahooChartFetcher, YahooSettings};
use strata_infrastructure::persistence::postgres_audit::PostgresAuditSink;
use strata_infrastructure::persistence::postgres_store::PostgresPartitionedStore;
use strata_infrastructure::persistence::{build_pool, PgPool};
use strata_infrastructure::queue::FileWorkQueue;
use strata_infrastructure::snapshot::CsvSnapshotWriter;

const DEFAULT_POOL_MAX_SIZE: u32 = 4;

/// `db.url` wins over `STRATA_DB_URL`; neither is an error only for stages
/// that need the database.
pub fn resolve_db_url(config: &Config) -> Option<String> {
    match config.db.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Some(url.to_string()),
        _ => env::var("STRATA_DB_URL")
            .ok()
            .filter(|url| !url.trim().is_empty()),
    }
}

/// Adapters shared by every stage of one invocation.
pub struct Wiring<'a> {
    config: &'a Config,
    pool: Option<PgPool>,
    audit: Rc<AuditLogger>,
    snapshot_queue: Rc<FileWorkQueue>,
    columnar_queue: Rc<FileWorkQueue>,
}

impl<'a> Wiring<'a> {
    pub fn new(config: &'a Config) -> Result<Self, String> {
        let pool = match resolve_db_url(config) {
            Some(url) => {
                let max = config.db.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE);
                Some(build_pool(&url, max).map_err(|err| err.to_string())?)
            }
            None => None,
        };
        let audit = Rc::new(build_audit(config, pool.as_ref())?);

        Ok(Self {
            config,
            pool,
            audit,
            snapshot_queue: Rc::new(FileWorkQueue::new("snapshot", &config.queues.snapshot)),
            columnar_queue: Rc::new(FileWorkQueue::new("columnar", &config.queues.columnar)),
        })
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn require_pool(&self) -> Result<&PgPool, String> {
        self.pool
            .as_ref()
            .ok_or_else(|| "missing db.url in config and env STRATA_DB_URL is not set".to_string())
    }

    pub fn ingest(&self) -> Result<IngestDriver, String> {
        let fetcher = YahooChartFetcher::new(yahoo_settings(self.config))
            .map_err(|err| err.to_string())?;
        Ok(IngestDriver::new(
            TradingCalendarGate::new(build_holidays(self.config)),
            SnapshotAssembler::new(Box::new(fetcher), self.audit.clone()),
            SnapshotWriter::new(
                self.config.pipeline.snapshot_root.clone(),
                Box::new(CsvSnapshotWriter),
                self.snapshot_queue.clone(),
                self.audit.clone(),
            ),
            self.audit.clone(),
        ))
    }

    /// `delete_source` adds to `pipeline.delete_source`; it never disables it.
    pub fn converter(&self, delete_source: bool) -> ColumnarConverter {
        ColumnarConverter::new(
            Box::new(PolarsParquetCodec),
            self.snapshot_queue.clone(),
            self.columnar_queue.clone(),
            self.config.pipeline.snapshot_root.clone(),
            self.config.pipeline.columnar_root.clone(),
            self.audit.clone(),
        )
        .with_delete_source(self.config.pipeline.delete_source || delete_source)
    }

    pub fn loader(&self) -> Result<PartitionedLoader, String> {
        let bulk: Box<dyn BulkLoader> = match self.config.bulk_load_mode() {
            BulkLoadMode::Driver => {
                let pool = self.require_pool()?;
                Box::new(DriverBulkLoader::new(
                    Box::new(PolarsParquetCodec),
                    Box::new(PostgresPartitionedStore::new(pool.clone())),
                ))
            }
            BulkLoadMode::External => {
                let (program, args) = self
                    .config
                    .bulk_load
                    .as_ref()
                    .map(|b| (b.program.clone().unwrap_or_default(), b.args.clone()))
                    .unwrap_or_default();
                Box::new(ExternalToolBulkLoader::new(program, args).map_err(|err| err.to_string())?)
            }
        };
        Ok(PartitionedLoader::new(
            bulk,
            self.columnar_queue.clone(),
            self.config.db.table.clone(),
            self.audit.clone(),
        ))
    }

    pub fn pipeline(&self, delete_source: bool) -> Result<Pipeline, String> {
        Ok(Pipeline {
            ingest: self.ingest()?,
            converter: self.converter(delete_source),
            loader: self.loader()?,
        })
    }

    /// Creates the partitioned price table and the audit log table.
    pub fn migrate(&self) -> Result<(), String> {
        let pool = self.require_pool()?;
        PostgresPartitionedStore::new(pool.clone())
            .ensure_table(&self.config.db.table)
            .map_err(|err| err.to_string())?;
        PostgresAuditSink::new(pool.clone(), self.config.db.log_table.clone())
            .and_then(|sink| sink.ensure_table())
            .map_err(|err| err.to_string())?;
        tracing::info!(
            table = %self.config.db.table,
            log_table = %self.config.db.log_table,
            "schema ready"
        );
        Ok(())
    }
}

fn build_audit(config: &Config, pool: Option<&PgPool>) -> Result<AuditLogger, String> {
    let fallback = Box::new(JsonlAuditSink::new(config.audit.fallback_path.clone()));
    let Some(pool) = pool else {
        tracing::warn!(
            fallback = %config.audit.fallback_path.display(),
            "no database configured, audit records go to the fallback file only"
        );
        return Ok(AuditLogger::fallback_only(fallback));
    };
    let primary = PostgresAuditSink::new(pool.clone(), config.db.log_table.clone())
        .map_err(|err| err.to_string())?;
    if let Err(err) = primary.ensure_table() {
        tracing::warn!(
            error = %err,
            fallback = %config.audit.fallback_path.display(),
            "audit log table unavailable, audit records go to the fallback file only"
        );
        return Ok(AuditLogger::fallback_only(fallback));
    }
    Ok(AuditLogger::new(Box::new(primary), fallback))
}

fn build_holidays(config: &Config) -> Box<dyn HolidaySource> {
    let calendar = config.calendar.as_ref();
    match config.calendar_source() {
        CalendarSource::Nyse => Box::new(NyseHolidayCalendar::with_extra_closures(
            calendar
                .map(|c| c.extra_closures.clone())
                .unwrap_or_default(),
        )),
        // validated: holidays_path is present for the file source
        CalendarSource::File => Box::new(FileHolidaySource::new(
            calendar
                .and_then(|c| c.holidays_path.clone())
                .unwrap_or_default(),
        )),
    }
}

fn yahoo_settings(config: &Config) -> YahooSettings {
    let mut settings = YahooSettings::default();
    let Some(provider) = &config.provider else {
        return settings;
    };
    if let Some(url) = provider.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        settings.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(ms) = provider.timeout_ms {
        settings.timeout = Duration::from_millis(ms);
    }
    if let Some(retries) = provider.retries {
        settings.retries = retries;
    }
    if let Some(ms) = provider.backoff_ms {
        settings.backoff_base = Duration::from_millis(ms);
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::yahoo_settings;
    use std::time::Duration;
    use strata_application::config::Config;

    const BASE: &str = r#"
[pipeline]
snapshot_root = "data/csv"
columnar_root = "data/parquet"

[queues]
snapshot = "state/csv_files.log"
columnar = "state/parquet_files.log"

[db]

[audit]
fallback_path = "state/audit_fallback.jsonl"
"#;

    #[test]
    fn provider_overrides_apply_on_top_of_defaults() {
        let toml_str = format!(
            "{BASE}\n[provider]\nbase_url = \"http://127.0.0.1:9/\"\nretries = 0\nbackoff_ms = 5\n"
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        let settings = yahoo_settings(&config);
        assert_eq!(settings.base_url, "http://127.0.0.1:9");
        assert_eq!(settings.retries, 0);
        assert_eq!(settings.backoff_base, Duration::from_millis(5));
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_provider_keeps_defaults() {
        let config: Config = toml::from_str(BASE).unwrap();
        assert_eq!(yahoo_settings(&config).retries, 3);
    }
}
