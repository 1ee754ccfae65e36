use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal fault: {0}")]
    Fault(String),
    #[error("engine state lock poisoned")]
    StateLock,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("delivery history capacity must be >= 1")]
    InvalidHistoryCapacity,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
