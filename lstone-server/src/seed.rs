/// Links file handling
///
/// The server keeps its links in memory. On startup they are loaded from a
/// JSON snapshot file, and on shutdown the table (states included) is
/// written back so the next run resumes where this one stopped.

use anyhow::{Context, Result};
use lstone_core::MemoryRepository;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Load the repository from `path`. A missing file yields an empty repository.
pub fn load_repository(path: &Path) -> Result<MemoryRepository> {
    if !path.exists() {
        warn!(path = %path.display(), "Links file not found, starting with no tracked links");
        return Ok(MemoryRepository::new());
    }

    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read links file {}", path.display()))?;
    let repository = MemoryRepository::from_json(&json)
        .with_context(|| format!("failed to parse links file {}", path.display()))?;

    info!(path = %path.display(), links = repository.len(), "Loaded tracked links");
    Ok(repository)
}

/// Write the repository to `path`, replacing the file atomically
pub fn save_repository(repository: &MemoryRepository, path: &Path) -> Result<()> {
    let json = repository.to_json()?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace links file {}", path.display()))?;

    info!(path = %path.display(), links = repository.len(), "Saved tracked links");
    Ok(())
}
