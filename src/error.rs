use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EdgesetError {
    #[error("request to {url} failed after {attempts} attempt(s): {cause}")]
    Transport {
        url: String,
        attempts: usize,
        cause: String,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to decode image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing required config key: {0}")]
    MissingConfigKey(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("malformed metadata: {0}")]
    Metadata(String),

    #[error("download worker {shard} panicked")]
    WorkerPanic { shard: usize },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
