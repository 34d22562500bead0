use crate::domain::NaturalKey;
use thiserror::Error;

/// A required canonical field could not be derived from a raw record.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot map {field}: {reason}")]
pub struct MappingError {
    pub field: &'static str,
    pub reason: String,
}

impl MappingError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "missing from source record")
    }
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Duplicate natural key: {0}")]
    DuplicateKey(NaturalKey),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl ScraperError {
    pub fn fetch(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        ScraperError::Fetch {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ScraperError::Storage {
            message: message.into(),
        }
    }

    /// Short label used in run summaries and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScraperError::Http(_) | ScraperError::Fetch { .. } => "fetch",
            ScraperError::Json(_) => "decode",
            ScraperError::Toml(_) | ScraperError::Config(_) => "config",
            ScraperError::Io(_) => "io",
            ScraperError::Mapping(_) => "mapping",
            ScraperError::DuplicateKey(_) => "duplicate_key",
            ScraperError::Database(_) | ScraperError::Storage { .. } => "storage",
            ScraperError::Cancelled => "cancelled",
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, ScraperError::DuplicateKey(_))
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
