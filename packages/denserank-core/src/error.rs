use thiserror::Error;

use crate::row::RowId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("row not found: {0}")]
    RowNotFound(RowId),
    #[error("row already exists: {0}")]
    DuplicateRow(RowId),
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}
