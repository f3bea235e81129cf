pub mod error;
pub mod types;
pub mod config;
pub mod policy;
pub mod classify; // alive / gone / archived state machine
pub mod repository;
pub mod memory_repo;

pub use error::{Error, Result};
pub use types::*;
pub use config::CheckerConfig;
pub use policy::{DefaultGonePolicy, GonePolicy, StatusSetPolicy};
pub use classify::{apply_archive_result, ArchiveAction, Classifier, Verdict};
pub use repository::StatusRepository;
pub use memory_repo::{LinkRecord, MemoryRepository, RepositorySnapshot};
