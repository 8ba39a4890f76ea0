//! Error types for cohort models

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid field value: {0}")]
    InvalidFieldValue(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
