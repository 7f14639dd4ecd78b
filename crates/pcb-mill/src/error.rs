use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MillError {
    #[error("{file}:{line}: {detail}")]
    Parse {
        file: String,
        line: usize,
        detail: String,
    },

    #[error("missing input file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("impossible drill plan: {0}")]
    ImpossibleDrillPlan(String),

    #[error("geometry operation failed: {0}")]
    Geometry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MillError {
    /// Build a parse error carrying the source location of the offending line.
    pub fn parse(file: &str, line: usize, detail: impl Into<String>) -> Self {
        MillError::Parse {
            file: file.to_string(),
            line,
            detail: detail.into(),
        }
    }
}
