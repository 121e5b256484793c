use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] crate::network::NetworkError),

    #[error("Report error: {0}")]
    Report(#[from] crate::report::ReportError),

    #[error("Invalid round transition: {0}")]
    InvalidRoundTransition(String),

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("Run cancelled after {completed} rounds")]
    Cancelled { completed: usize },
}

pub type SyncResult<T> = Result<T, SyncError>;
