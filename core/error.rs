use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("TOML Parsing Error: {0}")]
    TomlParse(String),

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid Repository Path: '{path}': {reason}")]
    InvalidRepository { path: PathBuf, reason: String },

    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File Read Error: Path '{path}', Error: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output Write Error: Path '{path}', Error: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode Error: Path '{path}' is not valid UTF-8 (near byte {offset})")]
    Decode { path: PathBuf, offset: u64 },

    #[error("WalkDir Error: {0}")]
    WalkDir(String),

    #[error("Ignore Error: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("Glob Pattern Error: {0}")]
    Glob(String),

    #[error("TikToken Error: {0}")]
    TikToken(String),
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::Glob(format!("Globset error: {}", err))
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        AppError::WalkDir(err.to_string())
    }
}

impl AppError {
    /// True for conditions detected before any file of the repository is read.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::TomlParse(_)
                | AppError::InvalidArgument(_)
                | AppError::Glob(_)
        )
    }
}
