use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty file: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("Metadata extraction panicked for {}", .0.display())]
    ExtractionPanic(PathBuf),

    #[error("Path Error: {0}")]
    Path(String),

    #[error("A tagging run is already active for {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("Initialization Failed: {0}")]
    Init(String),
}
