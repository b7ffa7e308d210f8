//! Shared error types for the cluster configurator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid UUID: {input}")]
    InvalidUuid { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Invalid inventory: {message}")]
    InvalidInventory { message: String },

    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SharedError {
    pub fn inventory(message: impl Into<String>) -> Self {
        SharedError::InvalidInventory {
            message: message.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
