use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceLogError {
    #[error("Unknown level: {0:?}")]
    InvalidLevel(String),

    #[error("Invalid port in {key}: {value:?}")]
    InvalidPort { key: &'static str, value: String },

    #[error("Invalid settings: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to initialize tracer: {0}")]
    Tracer(#[from] opentelemetry::trace::TraceError),
}

pub type Result<T> = std::result::Result<T, TraceLogError>;
