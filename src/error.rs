use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema extraction error: {0}")]
    Schema(String),

    #[error("Query validation error: {0}")]
    Validation(String),

    #[error("Query generation error: {0}")]
    Generation(String),

    #[error("AI provider error: {0}")]
    Provider(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
