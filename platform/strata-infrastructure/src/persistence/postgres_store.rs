use super::{checked_table, checkout, PgPool};
use postgres::error::SqlState;
use std::time::Instant;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::partitioned_store::PartitionedStore;
use strata_domain::value_objects::partition::PartitionKey;
use strata_domain::value_objects::snapshot::SnapshotRow;

#[derive(Debug, Clone)]
pub struct PostgresPartitionedStore {
    pool: PgPool,
}

impl PostgresPartitionedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_already_exists(err: &postgres::Error) -> bool {
    matches!(
        err.code(),
        Some(code) if *code == SqlState::DUPLICATE_TABLE || *code == SqlState::UNIQUE_VIOLATION
    )
}

fn db_err(context: &str, err: postgres::Error) -> PipelineError {
    PipelineError::Transient(format!("{context}: {err}"))
}

impl PartitionedStore for PostgresPartitionedStore {
    fn ensure_table(&self, table: &str) -> Result<(), PipelineError> {
        let table = checked_table(table)?;
        let mut client = checkout(&self.pool, "ensure_table")?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
               date DATE NOT NULL, \
               instrument_id TEXT NOT NULL, \
               open NUMERIC, \
               high NUMERIC, \
               low NUMERIC, \
               close NUMERIC, \
               volume BIGINT, \
               dividends NUMERIC, \
               split_ratio NUMERIC, \
               PRIMARY KEY (date, instrument_id)\
             ) PARTITION BY RANGE (date)"
        );
        client
            .batch_execute(&ddl)
            .map_err(|err| db_err(&format!("failed to create table {table}"), err))?;
        tracing::info!(table, "table ready");
        Ok(())
    }

    fn ensure_partition(&self, table: &str, key: &PartitionKey) -> Result<bool, PipelineError> {
        let table = checked_table(table)?;
        let partition = key.table_name(table);
        checked_table(&partition)?;

        let mut client = checkout(&self.pool, "ensure_partition")?;
        let exists: bool = client
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&partition])
            .map_err(|err| db_err("failed to look up partition", err))?
            .get(0);
        if exists {
            return Ok(false);
        }

        let ddl = format!(
            "CREATE TABLE {partition} PARTITION OF {table} FOR VALUES FROM ('{}') TO ('{}')",
            key.lower_bound().format("%Y-%m-%d"),
            key.upper_bound().format("%Y-%m-%d"),
        );
        match client.batch_execute(&ddl) {
            Ok(()) => {
                metrics::counter!("strata.infra.postgres.partitions_created_total").increment(1);
                tracing::info!(%partition, "partition created");
                Ok(true)
            }
            // created concurrently by another loader
            Err(err) if is_already_exists(&err) => Ok(false),
            Err(err) => Err(db_err(&format!("failed to create partition {partition}"), err)),
        }
    }

    fn insert_ignore(&self, table: &str, rows: &[SnapshotRow]) -> Result<u64, PipelineError> {
        let table = checked_table(table)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();
        let span = tracing::info_span!("infra.postgres.insert_ignore", table, rows = rows.len());
        let _enter = span.enter();

        let mut client = checkout(&self.pool, "insert_ignore")?;
        let mut tx = client
            .transaction()
            .map_err(|err| db_err("failed to begin transaction", err))?;
        let stmt = tx
            .prepare(&format!(
                "INSERT INTO {table} \
                 (date, instrument_id, open, high, low, close, volume, dividends, split_ratio) \
                 VALUES ($1, $2, $3::FLOAT8, $4::FLOAT8, $5::FLOAT8, $6::FLOAT8, $7, $8::FLOAT8, $9::FLOAT8) \
                 ON CONFLICT (date, instrument_id) DO NOTHING"
            ))
            .map_err(|err| db_err("failed to prepare insert", err))?;

        let mut inserted = 0u64;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.date,
                        &row.instrument_id,
                        &row.open,
                        &row.high,
                        &row.low,
                        &row.close,
                        &row.volume,
                        &row.dividends,
                        &row.split_ratio,
                    ],
                )
                .map_err(|err| {
                    metrics::counter!("strata.infra.postgres.insert.errors_total").increment(1);
                    db_err(&format!("failed to insert {} {}", row.instrument_id, row.date), err)
                })?;
        }
        tx.commit()
            .map_err(|err| db_err("failed to commit insert", err))?;

        metrics::counter!("strata.infra.postgres.rows_inserted_total").increment(inserted);
        metrics::counter!("strata.infra.postgres.rows_ignored_total")
            .increment(rows.len() as u64 - inserted);
        metrics::histogram!("strata.infra.postgres.insert_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(inserted, ignored = rows.len() as u64 - inserted, "rows inserted");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::PostgresPartitionedStore;
    use crate::persistence::build_pool;
    use strata_domain::errors::PipelineError;
    use strata_domain::repositories::partitioned_store::PartitionedStore;
    use strata_domain::value_objects::partition::PartitionKey;

    #[test]
    fn invalid_table_name_is_rejected_before_connect() {
        let store = PostgresPartitionedStore::new(build_pool("postgres://invalid", 1).unwrap());
        let err = store.insert_ignore("stock_data;drop", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("invalid table name")));
        let err = store
            .ensure_partition("bad name", &PartitionKey::new(2024, 2).unwrap())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
