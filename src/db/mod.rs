pub mod sqlite;
pub mod source;

pub use sqlite::*;
pub use source::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Table {table} is missing required column {column}")]
    MissingColumn { table: String, column: String },

    #[error("Invalid value in {table}.{column} at row {row_index}: {reason}")]
    InvalidValue {
        table: String,
        column: String,
        row_index: usize,
        reason: String,
    },
}
