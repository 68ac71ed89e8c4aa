//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Live(#[from] bili_live::LiveError),

    #[error("Message sink {sink} failed: {reason}")]
    Sink { sink: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn sink(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}
