use super::{bare_name, checked_table, checkout, PgPool};
use strata_domain::errors::PipelineError;
use strata_domain::repositories::audit_sink::AuditSink;
use strata_domain::value_objects::audit::AuditRecord;

/// Primary audit sink: one row per record in the run log table.
#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
    table: String,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, PipelineError> {
        let table = table.into();
        checked_table(&table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ensure_table(&self) -> Result<(), PipelineError> {
        let table = &self.table;
        let short = bare_name(table);
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
               log_id BIGSERIAL PRIMARY KEY, \
               step TEXT NOT NULL, \
               level TEXT NOT NULL, \
               instrument_id TEXT, \
               message TEXT, \
               from_date DATE, \
               to_date DATE, \
               start_time TIMESTAMPTZ NOT NULL, \
               end_time TIMESTAMPTZ, \
               result TEXT NOT NULL, \
               created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
             );\
             CREATE INDEX IF NOT EXISTS idx_{short}_step ON {table} (step);\
             CREATE INDEX IF NOT EXISTS idx_{short}_level ON {table} (level);\
             CREATE INDEX IF NOT EXISTS idx_{short}_instrument ON {table} (instrument_id);"
        );
        let mut client = checkout(&self.pool, "ensure_audit_table")?;
        client.batch_execute(&ddl).map_err(|err| {
            PipelineError::Transient(format!("failed to create audit table {table}: {err}"))
        })?;
        tracing::info!(table = %table, "audit table ready");
        Ok(())
    }
}

impl AuditSink for PostgresAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), PipelineError> {
        let mut client = checkout(&self.pool, "audit_append")?;
        let sql = format!(
            "INSERT INTO {} \
             (step, level, instrument_id, message, from_date, to_date, start_time, end_time, result) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.table
        );
        client
            .execute(
                &sql,
                &[
                    &record.step.as_str(),
                    &record.level.as_str(),
                    &record.instrument_id,
                    &record.message,
                    &record.from_date,
                    &record.to_date,
                    &record.start_time,
                    &record.end_time,
                    &record.result.as_str(),
                ],
            )
            .map_err(|err| {
                metrics::counter!("strata.infra.postgres.audit.errors_total").increment(1);
                PipelineError::Transient(format!("failed to append audit record: {err}"))
            })?;
        Ok(())
    }
}
