use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read config file '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config line {line}: {message}")]
    Config { line: usize, message: String },

    #[error("history storage: {0}")]
    Storage(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{name}: failed to start: {reason}")]
    ProcessStart { name: String, reason: String },

    #[error("cannot read script '{path}': {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown key '{0}'")]
    UnknownKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;
