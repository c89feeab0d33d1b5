use thiserror::Error;

/// Everything that can stop a run. None of these are recovered from locally,
/// they all travel back up to `main`.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty or malformed samplesheet, missing paths, bad project names.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-positive node capacity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A batch would be produced with zero items. Unreachable unless the planner is broken.
    #[error("planning invariant violated: {0}")]
    PlanningInvariantViolation(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read samplesheet: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not parse node profile: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("could not copy files: {0}")]
    FsExtra(#[from] fs_extra::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
