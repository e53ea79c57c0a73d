use shared::models::ChainId;
use std::fmt;

#[derive(Debug)]
pub enum ClaimerError {
    InvalidPolicy(String),
    MissingAdapter(ChainId),
    Config(String),
    Redis(redis::RedisError),
    Io(std::io::Error),
}

impl fmt::Display for ClaimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimerError::InvalidPolicy(msg) => write!(f, "Invalid policy: {msg}"),
            ClaimerError::MissingAdapter(chain) => {
                write!(f, "No chain adapter configured for chain: {chain}")
            }
            ClaimerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ClaimerError::Redis(e) => write!(f, "Redis error: {e}"),
            ClaimerError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for ClaimerError {}

impl From<redis::RedisError> for ClaimerError {
    fn from(err: redis::RedisError) -> Self {
        ClaimerError::Redis(err)
    }
}

impl From<std::io::Error> for ClaimerError {
    fn from(err: std::io::Error) -> Self {
        ClaimerError::Io(err)
    }
}
