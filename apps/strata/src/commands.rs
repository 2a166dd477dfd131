use crate::wiring::Wiring;
use chrono::NaiveDate;
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use strata_application::cancel::CancelToken;
use strata_application::config::{load_config_with_source, to_toml_pretty, Config};
use strata_domain::errors::PipelineError;

pub enum Command {
    Validate,
    Migrate,
    Fetch {
        from: NaiveDate,
        to: NaiveDate,
        instruments: Vec<String>,
    },
    Convert {
        file: Option<PathBuf>,
        folder: Option<PathBuf>,
        delete_source: bool,
    },
    Load {
        file: Option<PathBuf>,
    },
    Run {
        from: NaiveDate,
        to: NaiveDate,
        instruments: Vec<String>,
        delete_source: bool,
    },
}

#[derive(Debug)]
pub enum CommandError {
    Setup(String),
    Pipeline(PipelineError),
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Pipeline(PipelineError::Cancelled) => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Setup(msg) => f.write_str(msg),
            CommandError::Pipeline(err) => write!(f, "{err} ({})", err.kind().as_str()),
        }
    }
}

impl From<String> for CommandError {
    fn from(msg: String) -> Self {
        CommandError::Setup(msg)
    }
}

impl From<PipelineError> for CommandError {
    fn from(err: PipelineError) -> Self {
        CommandError::Pipeline(err)
    }
}

pub fn run(config_path: &Path, command: Command, cancel: &CancelToken) -> Result<(), CommandError> {
    let (config, _source) = load_config_with_source(config_path)?;
    tracing::info!(config = %config_path.display(), "config loaded");

    if let Command::Validate = command {
        println!("{}", to_toml_pretty(&config)?);
        return Ok(());
    }

    let wiring = Wiring::new(&config)?;
    let outcome = dispatch(&config, &wiring, command, cancel);
    if let Err(err) = &outcome {
        let kind = match err {
            CommandError::Pipeline(err) => err.kind().as_str(),
            CommandError::Setup(_) => "setup",
        };
        metrics::counter!("strata.cli.failures_total", "kind" => kind).increment(1);
    }

    let audit = wiring.audit();
    if audit.degraded_count() > 0 {
        tracing::warn!(
            records = audit.degraded_count(),
            fallback = %config.audit.fallback_path.display(),
            "audit records were written to the fallback file"
        );
    }
    if audit.unpersisted_count() > 0 {
        tracing::error!(records = audit.unpersisted_count(), "audit records reached no sink");
    }
    outcome
}

fn dispatch(
    config: &Config,
    wiring: &Wiring<'_>,
    command: Command,
    cancel: &CancelToken,
) -> Result<(), CommandError> {
    match command {
        Command::Validate => Ok(()),
        Command::Migrate => {
            wiring.migrate()?;
            print_json(&json!({ "migrated": true, "table": config.db.table, "log_table": config.db.log_table }))
        }
        Command::Fetch {
            from,
            to,
            instruments,
        } => {
            let instruments = select_instruments(config, instruments);
            let summary = wiring.ingest()?.run(from, to, &instruments, cancel)?;
            print_json(&summary)
        }
        Command::Convert {
            file,
            folder,
            delete_source,
        } => {
            let converter = wiring.converter(delete_source);
            match (file, folder) {
                (Some(file), _) => {
                    let converted = converter.convert_file(&file)?;
                    print_json(&json!({
                        "source": file,
                        "destination": converted.destination,
                        "rows": converted.rows,
                        "source_deleted": converted.source_deleted,
                    }))
                }
                (None, Some(folder)) => print_json(&converter.convert_folder(&folder, cancel)?),
                (None, None) => print_json(&converter.run(cancel)?),
            }
        }
        Command::Load { file } => {
            let loader = wiring.loader()?;
            match file {
                Some(file) => print_json(&loader.load_file(&file)?),
                None => print_json(&loader.run(cancel)?),
            }
        }
        Command::Run {
            from,
            to,
            instruments,
            delete_source,
        } => {
            let instruments = select_instruments(config, instruments);
            let summary = wiring.pipeline(delete_source)?.run_full(from, to, &instruments, cancel)?;
            print_json(&summary)
        }
    }
}

/// Instruments named on the command line replace the configured list.
fn select_instruments(config: &Config, cli: Vec<String>) -> Vec<String> {
    if cli.is_empty() {
        config.pipeline.instruments.clone()
    } else {
        cli
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CommandError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| format!("failed to render summary: {err}"))?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::CommandError;
    use strata_domain::errors::PipelineError;

    #[test]
    fn cancellation_exits_with_interrupt_code() {
        assert_eq!(CommandError::from(PipelineError::Cancelled).exit_code(), 130);
        assert_eq!(
            CommandError::from(PipelineError::Config("bad".to_string())).exit_code(),
            1
        );
        assert_eq!(CommandError::from("nope".to_string()).exit_code(), 1);
    }
}
