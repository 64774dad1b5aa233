use thiserror::Error;

use crate::schemas::{ItemId, PersonId};

/// Rejected add/edit/delete input. The session is left untouched.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("price must be a non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("an item needs at least one participant")]
    NoParticipants,
    #[error("no person with id {0}")]
    PersonNotFound(PersonId),
    #[error("no item with id {0}")]
    ItemNotFound(ItemId),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt value under key {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
    #[error("could not encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid port: {value}")]
    InvalidPort { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("background task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}
