use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommonError>;
