use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid difficulty {0:?} (expected again, hard, medium or easy)")]
    InvalidDifficulty(String),

    #[error("{path} row {row}: {message}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("expected a JSON array of vocabulary entries")]
    NotAnArray,

    #[error("no vocabulary item with id {0}")]
    UnknownItem(String),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("a quiz needs at least {needed} words, found {found}")]
    NotEnoughWords { needed: usize, found: usize },

    #[error("no CSV files found")]
    NoFiles,

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }
}
