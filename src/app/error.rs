use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeirError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed capture file: {0}")]
    Capture(String),

    #[error("HTTP trace error: {0}")]
    Trace(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, WeirError>;

impl From<crate::config::ConfigError> for WeirError {
    fn from(e: crate::config::ConfigError) -> Self {
        WeirError::Config(e.to_string())
    }
}
