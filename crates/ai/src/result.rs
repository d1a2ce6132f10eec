use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AiError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
