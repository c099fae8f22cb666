//! Error types for wheres-my-device

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Phone number already whitelisted: {0}")]
    DuplicateNumber(String),

    #[error("Whitelist entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
