use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DataQuality,
    Transient,
    ExternalToolFailure,
    Durability,
    Config,
    Io,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::DataQuality => "data_quality",
            ErrorKind::Transient => "transient",
            ErrorKind::ExternalToolFailure => "external_tool_failure",
            ErrorKind::Durability => "durability",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Failure taxonomy shared by every stage.
///
/// Failures scoped to one instrument, file or day are recorded and swallowed
/// by the stage that owns that scope; anything that escapes a stage aborts it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("data quality: {0}")]
    DataQuality(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("audit durability degraded: {0}")]
    Durability(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("cancelled before the batch completed")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::DataQuality(_) => ErrorKind::DataQuality,
            PipelineError::Transient(_) => ErrorKind::Transient,
            PipelineError::ExternalTool(_) => ErrorKind::ExternalToolFailure,
            PipelineError::Durability(_) => ErrorKind::Durability,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            PipelineError::NotFound(format!("{context}: {err}"))
        } else {
            PipelineError::Io(format!("{context}: {err}"))
        }
    }
}
