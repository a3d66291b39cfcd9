use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoostError>;

#[derive(Error, Debug)]
pub enum RoostError {
    #[error("Configuration error: {0}")]
    Config(String),
}
