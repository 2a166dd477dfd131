use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub queues: QueuesConfig,
    pub db: DbConfig,
    pub audit: AuditConfig,
    pub provider: Option<ProviderConfig>,
    pub calendar: Option<CalendarConfig>,
    pub bulk_load: Option<BulkLoadConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub instruments: Vec<String>,
    pub snapshot_root: PathBuf,
    pub columnar_root: PathBuf,
    #[serde(default)]
    pub delete_source: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueuesConfig {
    pub snapshot: PathBuf,
    pub columnar: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_log_table")]
    pub log_table: String,
    pub pool_max_size: Option<u32>,
}

fn default_table() -> String {
    "stock_data".to_string()
}

fn default_log_table() -> String {
    "stock_data_log".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    pub fallback_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalendarSource {
    Nyse,
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    pub source: CalendarSource,
    pub holidays_path: Option<PathBuf>,
    /// Unscheduled closures added to the rule-based calendar.
    #[serde(default)]
    pub extra_closures: Vec<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BulkLoadMode {
    Driver,
    External,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BulkLoadConfig {
    pub mode: BulkLoadMode,
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.pipeline.snapshot_root == self.pipeline.columnar_root {
            return Err("pipeline.snapshot_root and pipeline.columnar_root must differ".to_string());
        }
        if self.queues.snapshot == self.queues.columnar {
            return Err("queues.snapshot and queues.columnar must differ".to_string());
        }
        if self.db.pool_max_size == Some(0) {
            return Err("db.pool_max_size must be > 0".to_string());
        }
        if let Some(calendar) = &self.calendar {
            if calendar.source == CalendarSource::File && calendar.holidays_path.is_none() {
                return Err("calendar.holidays_path is required when source = \"file\"".to_string());
            }
        }
        if let Some(bulk) = &self.bulk_load {
            let has_program = bulk
                .program
                .as_deref()
                .map(|p| !p.trim().is_empty())
                .unwrap_or(false);
            if bulk.mode == BulkLoadMode::External && !has_program {
                return Err("bulk_load.program is required when mode = \"external\"".to_string());
            }
        }
        if self
            .pipeline
            .instruments
            .iter()
            .any(|id| id.trim().is_empty())
        {
            return Err("pipeline.instruments must not contain empty ids".to_string());
        }
        Ok(())
    }

    pub fn calendar_source(&self) -> CalendarSource {
        self.calendar
            .as_ref()
            .map(|c| c.source)
            .unwrap_or(CalendarSource::Nyse)
    }

    pub fn bulk_load_mode(&self) -> BulkLoadMode {
        self.bulk_load
            .as_ref()
            .map(|b| b.mode)
            .unwrap_or(BulkLoadMode::Driver)
    }
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    config
        .validate()
        .map_err(|err| format!("invalid config {}: {}", path.display(), err))?;
    Ok((config, contents))
}

pub fn to_toml_pretty(config: &Config) -> Result<String, String> {
    toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config as TOML: {err}"))
}
