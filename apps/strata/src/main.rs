mod commands;
mod obs;
mod signal;
mod wiring;

use chrono::{Days, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use commands::Command;
use std::path::PathBuf;
use strata_application::cancel::CancelToken;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Daily market snapshot pipeline", version, arg_required_else_help = true)]
#[command(
    after_help = "Examples:\n  strata --config configs/strata.toml migrate\n  strata --config configs/strata.toml run --from 2024-02-01 --to 2024-02-29\n  strata --config configs/strata.toml fetch --instrument AAPL --instrument MSFT\n  strata --config configs/strata.toml convert --folder data/csv/2024\n  strata --config configs/strata.toml load\n"
)]
struct Cli {
    /// Config file path (TOML).
    #[arg(long, global = true, env = "STRATA_CONFIG", default_value = "strata.toml")]
    config: PathBuf,

    /// Log filter, overridden by STRATA_LOG.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// text | json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Serve Prometheus metrics on host:port.
    #[arg(long, global = true, env = "STRATA_METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args)]
struct RangeArgs {
    /// First day, inclusive (default: yesterday).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day, inclusive (default: yesterday).
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Replaces pipeline.instruments; repeatable.
    #[arg(long = "instrument")]
    instruments: Vec<String>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Parse and validate the config, then print it.
    Validate,
    /// Create the price table and the audit log table.
    Migrate,
    /// Fetch snapshots for a date range and queue them for conversion.
    Fetch(RangeArgs),
    /// Convert queued snapshots (or one file / folder) to Parquet.
    Convert {
        #[arg(long, conflicts_with = "folder")]
        file: Option<PathBuf>,
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Delete each snapshot after it converts.
        #[arg(long)]
        delete_source: bool,
    },
    /// Load queued Parquet files (or one file) into the partitioned table.
    Load {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Fetch, convert and load in one pass.
    Run {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        delete_source: bool,
    },
}

fn resolve_range(args: &RangeArgs) -> (NaiveDate, NaiveDate) {
    let today = Local::now().date_naive();
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    (args.from.unwrap_or(yesterday), args.to.unwrap_or(yesterday))
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = obs::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = obs::init_metrics(cli.metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let command = match cli.command {
        CliCommand::Validate => Command::Validate,
        CliCommand::Migrate => Command::Migrate,
        CliCommand::Fetch(args) => {
            let (from, to) = resolve_range(&args);
            Command::Fetch {
                from,
                to,
                instruments: args.instruments,
            }
        }
        CliCommand::Convert {
            file,
            folder,
            delete_source,
        } => Command::Convert {
            file,
            folder,
            delete_source,
        },
        CliCommand::Load { file } => Command::Load { file },
        CliCommand::Run {
            range,
            delete_source,
        } => {
            let (from, to) = resolve_range(&range);
            Command::Run {
                from,
                to,
                instruments: range.instruments,
                delete_source,
            }
        }
    };

    let cancel = CancelToken::new();
    signal::cancel_on_ctrl_c(cancel.clone());

    if let Err(err) = commands::run(&cli.config, command, &cancel) {
        tracing::error!(error = %err, "command failed");
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
