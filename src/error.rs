use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the remote directory listing.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid URL '{0}'")]
    Url(String),

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

/// Failures opening or unpacking a downloaded archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive expands to {declared} bytes, above the {limit} byte limit")]
    TooLarge { declared: u64, limit: u64 },
}

/// Failures decoding a single tabular file.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV decode failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet decode failed: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("workbook has no worksheet")]
    NoWorksheet,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("another run holds the lock at {}", .0.display())]
    LockHeld(PathBuf),

    #[error("canonical artifact not found at {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("no source file produced a normalized table; nothing was written")]
    NothingToConsolidate,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
