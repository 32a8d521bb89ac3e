use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("invalid {method} response: {reason}")]
    InvalidResponse { method: String, reason: String },
}

pub type ChatResult<T> = Result<T, ChatError>;
