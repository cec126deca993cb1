use std::io;

/// Errors raised while loading, registering or running script commands
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

impl From<Box<rhai::EvalAltResult>> for Error {
    fn from(e: Box<rhai::EvalAltResult>) -> Self {
        Error::Script(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Script(format!("script task failed: {}", e))
    }
}

impl From<rhai::ParseError> for Error {
    fn from(e: rhai::ParseError) -> Self {
        Error::Script(format!("parse error: {}", e))
    }
}

/// Result type alias for script command operations
pub type Result<T> = std::result::Result<T, Error>;
