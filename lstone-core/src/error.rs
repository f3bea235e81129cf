use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Link not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Archive lookup failed: {0}")]
    ArchiveLookup(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and are used as metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Repository(_) => "REPOSITORY_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Probe(_) => "PROBE_FAILED",
            Error::ArchiveLookup(_) => "ARCHIVE_LOOKUP_FAILED",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Cancelled => "CANCELLED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the next scheduled pass may succeed where this one failed.
    ///
    /// Nothing in the checker retries inside a pass; this only tells callers
    /// whether waiting for the next tick is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Repository(_) => true,
            Error::Probe(_) => true,
            Error::ArchiveLookup(_) => true,
            Error::Cancelled => true,

            Error::NotFound(_) => false,
            Error::InvalidConfig(_) => false,
            Error::Serialization(_) => false,
            Error::Internal(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
