use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChartError>;

#[derive(Debug, Error)]
pub enum ChartError {
    /// Bad flag combination or value that clap cannot catch on its own.
    #[error("usage: {0}")]
    Usage(String),

    #[error("schema error in {path}: {msg}")]
    Schema { path: PathBuf, msg: String },

    #[error("parse error in {path} line {line} column \"{column}\": {msg}")]
    Parse {
        path: PathBuf,
        line: u64,
        column: &'static str,
        msg: String,
    },

    #[error("no data rows found in {0}")]
    Empty(PathBuf),

    /// Input parsed fine but the numbers do not fit together.
    #[error("inconsistent data: {0}")]
    Consistency(String),

    #[error("unable to render chart: {0}")]
    Plot(String),

    #[error("unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ChartError {
    pub fn usage(msg: impl Into<String>) -> Self {
        ChartError::Usage(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        ChartError::Consistency(msg.into())
    }
}
