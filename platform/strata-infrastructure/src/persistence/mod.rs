pub mod postgres_audit;
pub mod postgres_store;

use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::time::Duration;
use strata_domain::errors::PipelineError;

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

pub fn build_pool(db_url: &str, pool_max_size: u32) -> Result<PgPool, PipelineError> {
    let mut config = db_url
        .parse::<postgres::Config>()
        .map_err(|err| PipelineError::Config(format!("invalid postgres db url: {err}")))?;
    if config.get_connect_timeout().is_none() {
        config.connect_timeout(Duration::from_secs(10));
    }
    let manager = PostgresConnectionManager::new(config, NoTls);
    // build_unchecked keeps construction offline; the first checkout reports
    // an unreachable server.
    Ok(Pool::builder()
        .max_size(pool_max_size.max(1))
        .connection_timeout(Duration::from_secs(15))
        .build_unchecked(manager))
}

pub(crate) fn checkout(
    pool: &PgPool,
    operation: &'static str,
) -> Result<r2d2::PooledConnection<PostgresConnectionManager<NoTls>>, PipelineError> {
    let start = std::time::Instant::now();
    match pool.get() {
        Ok(client) => {
            metrics::histogram!("strata.infra.postgres.pool.get_ms")
                .record(start.elapsed().as_secs_f64() * 1000.0);
            Ok(client)
        }
        Err(err) => {
            metrics::counter!("strata.infra.postgres.pool.get.errors_total", "operation" => operation)
                .increment(1);
            tracing::error!(error = %err, operation, "failed to checkout postgres connection");
            Err(PipelineError::Transient(format!(
                "failed to checkout postgres connection: {err}"
            )))
        }
    }
}

pub fn validate_table_name(table: &str) -> Result<(), String> {
    if table.is_empty() {
        return Err("table name is empty".to_string());
    }
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(format!("invalid table name: {table}"));
    }
    for part in parts {
        let mut chars = part.chars();
        let first = match chars.next() {
            Some(ch) => ch,
            None => return Err(format!("invalid table name: {table}")),
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(format!("invalid table name: {table}"));
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(format!("invalid table name: {table}"));
        }
    }
    Ok(())
}

pub(crate) fn checked_table(table: &str) -> Result<&str, PipelineError> {
    validate_table_name(table).map_err(PipelineError::Config)?;
    Ok(table)
}

/// Unqualified part of a possibly schema-qualified name, for index names.
pub(crate) fn bare_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

#[cfg(test)]
mod tests {
    use super::{bare_name, build_pool, validate_table_name};
    use strata_domain::errors::PipelineError;

    #[test]
    fn validate_table_name_accepts_schema() {
        assert!(validate_table_name("stock_data").is_ok());
        assert!(validate_table_name("public.stock_data").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("stock_data;drop").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("1data").is_err());
    }

    #[test]
    fn invalid_db_url_fails_fast() {
        let err = build_pool("not a url", 1).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("invalid postgres db url")));
    }

    #[test]
    fn bare_name_strips_schema() {
        assert_eq!(bare_name("public.stock_data_log"), "stock_data_log");
        assert_eq!(bare_name("stock_data_log"), "stock_data_log");
    }
}
