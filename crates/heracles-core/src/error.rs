use heracles_metrics::ParseError;
use thiserror::Error;

use crate::report::CheckReport;

#[derive(Debug, Error)]
pub enum HeraclesError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("docker compose error: {0}")]
    Compose(String),
    #[error("script `{command}` failed: {message}")]
    Script { command: String, message: String },
    #[error("exporter error: {0}")]
    Exporter(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<HeraclesError>,
    },
    #[error(
        "metrics check failed: {} of {} checks failed",
        .0.failed_count(),
        .0.results.len()
    )]
    CheckFailed(Box<CheckReport>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeraclesError {
    /// Wraps the error with the name of the pipeline stage it came from.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// True for the assertion-failure sentinel, false for infrastructure errors.
    pub fn is_check_failure(&self) -> bool {
        matches!(self, Self::CheckFailed(_))
    }

    pub fn report(&self) -> Option<&CheckReport> {
        match self {
            Self::CheckFailed(report) => Some(report),
            _ => None,
        }
    }

    /// The innermost error beneath any stage wrapping.
    pub fn root_cause(&self) -> &HeraclesError {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, HeraclesError>;
