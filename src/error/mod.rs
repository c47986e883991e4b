use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No connections could be established")]
    NoConnections,
}

pub type Result<T> = std::result::Result<T, AppError>;
