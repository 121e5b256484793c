use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] crate::network::NetworkError),

    #[error("Synchronization error: {0}")]
    Sync(#[from] crate::client::SyncError),

    #[error("Report error: {0}")]
    Report(#[from] crate::report::ReportError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
