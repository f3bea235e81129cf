use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for every persisted instant
pub type Timestamp = DateTime<Utc>;

/// Opaque identifier of a tracked link (the owning short URL's id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Persisted health state of a tracked link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedLinkState {
    pub entity_id: EntityId,
    /// Most recent probe attempt, stamped even when the probe failed
    pub last_checked_at: Option<Timestamp>,
    /// Status of the most recent probe that produced a response
    pub last_status_code: Option<u16>,
    /// First time the link was classified gone
    pub gone_since: Option<Timestamp>,
    pub archive_url: Option<String>,
    /// Most recent archive lookup attempt, found or not
    pub archive_checked_at: Option<Timestamp>,
}

impl TrackedLinkState {
    /// A state for a link that has never been probed
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            last_checked_at: None,
            last_status_code: None,
            gone_since: None,
            archive_url: None,
            archive_checked_at: None,
        }
    }

    pub fn is_gone(&self) -> bool {
        self.gone_since.is_some()
    }

    pub fn has_archive(&self) -> bool {
        self.archive_url.is_some()
    }
}

/// A link whose last check is stale enough to probe in this pass.
///
/// Carries the prior gone/archive fields so classification can preserve
/// whatever the current pass does not recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueCandidate {
    pub entity_id: EntityId,
    pub destination_url: String,
    pub gone_since: Option<Timestamp>,
    pub archive_url: Option<String>,
    pub archive_checked_at: Option<Timestamp>,
}

impl DueCandidate {
    /// Candidate for a link that has no recorded state yet
    pub fn fresh(entity_id: EntityId, destination_url: impl Into<String>) -> Self {
        Self {
            entity_id,
            destination_url: destination_url.into(),
            gone_since: None,
            archive_url: None,
            archive_checked_at: None,
        }
    }

    /// Project a persisted state into a candidate
    pub fn from_state(state: &TrackedLinkState, destination_url: impl Into<String>) -> Self {
        Self {
            entity_id: state.entity_id.clone(),
            destination_url: destination_url.into(),
            gone_since: state.gone_since,
            archive_url: state.archive_url.clone(),
            archive_checked_at: state.archive_checked_at,
        }
    }
}

/// Result of probing a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// DNS, connect, timeout or malformed response; no status observed
    Failed,
    /// The destination answered with this status code
    Responded(u16),
}

impl ProbeOutcome {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Failed => None,
            ProbeOutcome::Responded(code) => Some(*code),
        }
    }
}

/// Classification of a probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Probe did not complete
    Unknown,
    /// Explicit not-found / removed response
    Gone,
    /// 5xx, treated as transient
    ServerError,
    /// Anything else: the destination is reachable
    Alive,
}

impl Classification {
    /// Stable lowercase name, used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unknown => "unknown",
            Classification::Gone => "gone",
            Classification::ServerError => "server_error",
            Classification::Alive => "alive",
        }
    }
}
