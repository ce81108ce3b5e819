use serde_json::Value;

/// Error response from the Forward Networks API, carrying the HTTP status
/// when one was received.
#[derive(Debug, thiserror::Error)]
#[error("Forward API error: {message}")]
pub struct RemoteApiError {
    pub message: String,
    pub status: Option<u16>,
}

impl RemoteApiError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Failure affecting a single ingested record. Converted into an
/// `ingestion_issues` row by the runner; never aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{kind} `{reference}` not found in inventory")]
    ReferenceNotFound {
        kind: &'static str,
        reference: String,
        record: Value,
    },

    #[error("{model}: required field `{field}` is missing")]
    MissingField {
        model: &'static str,
        field: &'static str,
        record: Value,
    },

    #[error("Validation failed for {model}: {message}")]
    Validation { model: &'static str, message: String },

    #[error("Template error for {model}.{field}: {message}")]
    Template {
        model: &'static str,
        field: String,
        message: String,
    },
}

impl RecordError {
    /// Exception class name persisted on the ingestion issue.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound { .. } => "ReferenceNotFound",
            Self::MissingField { .. } => "MissingField",
            Self::Validation { .. } => "ValidationFailed",
            Self::Template { .. } => "TemplateError",
        }
    }

    /// The raw record that triggered the failure, when one was attached.
    #[must_use]
    pub fn raw_record(&self) -> Option<&Value> {
        match self {
            Self::ReferenceNotFound { record, .. } | Self::MissingField { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }
}

/// Error surface of the per-record pipeline (resolve + upsert): either a
/// record-level failure the runner converts into an issue, or a store
/// failure that aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Remote(#[from] RemoteApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Cannot initiate sync; {0}")]
    MutualExclusion(String),

    #[error("Branch provisioning failed: {0}")]
    Provisioning(String),

    #[error("Sync error: {0}")]
    Sync(String),
}

pub type AppResult<T> = Result<T, AppError>;
