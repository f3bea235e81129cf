/// Status classification
///
/// Turns a candidate's prior state and a probe outcome into the next
/// persisted `TrackedLinkState`, and decides whether an archive lookup is
/// due. Everything here is pure: the caller supplies `now` and performs any
/// archive lookup itself, feeding the result back through
/// [`apply_archive_result`].

use crate::config::CheckerConfig;
use crate::policy::{DefaultGonePolicy, GonePolicy};
use crate::types::{Classification, DueCandidate, ProbeOutcome, Timestamp, TrackedLinkState};
use std::sync::Arc;
use std::time::Duration;

/// What to do about the archive fields after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveAction {
    /// Archive fields are already final
    Keep,
    /// Perform a lookup and pass its result to `apply_archive_result`
    Lookup,
}

/// Outcome of classifying one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub state: TrackedLinkState,
    pub archive: ArchiveAction,
}

/// Pure decision logic for the alive / gone / archived state machine
#[derive(Debug, Clone)]
pub struct Classifier {
    policy: Arc<dyn GonePolicy>,
    archive_lookup_enabled: bool,
    archive_recheck_interval: Duration,
}

impl Classifier {
    pub fn new(archive_lookup_enabled: bool, archive_recheck_interval: Duration) -> Self {
        Self {
            policy: Arc::new(DefaultGonePolicy),
            archive_lookup_enabled,
            archive_recheck_interval,
        }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(config.archive_lookup_enabled, config.archive_recheck_interval)
    }

    /// Replace the gone-status policy
    pub fn with_policy(mut self, policy: Arc<dyn GonePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &dyn GonePolicy {
        self.policy.as_ref()
    }

    /// Compute the next state for `candidate` given the probe outcome at `now`
    pub fn classify(&self, candidate: &DueCandidate, outcome: ProbeOutcome, now: Timestamp) -> Verdict {
        let classification = self.policy.classify(outcome);

        let mut state = TrackedLinkState {
            entity_id: candidate.entity_id.clone(),
            last_checked_at: Some(now),
            last_status_code: outcome.status_code(),
            gone_since: candidate.gone_since,
            archive_url: candidate.archive_url.clone(),
            archive_checked_at: candidate.archive_checked_at,
        };

        let archive = match classification {
            Classification::Unknown | Classification::ServerError => ArchiveAction::Keep,
            Classification::Alive => {
                state.gone_since = None;
                state.archive_url = None;
                state.archive_checked_at = None;
                ArchiveAction::Keep
            }
            Classification::Gone => {
                // First observation wins
                state.gone_since = Some(candidate.gone_since.unwrap_or(now));
                if self.archive_lookup_due(candidate.archive_checked_at, now) {
                    ArchiveAction::Lookup
                } else {
                    ArchiveAction::Keep
                }
            }
        };

        Verdict {
            classification,
            state,
            archive,
        }
    }

    /// True when archive lookups are on and the last lookup is old enough
    pub fn archive_lookup_due(&self, archive_checked_at: Option<Timestamp>, now: Timestamp) -> bool {
        if !self.archive_lookup_enabled {
            return false;
        }

        match archive_checked_at {
            None => true,
            // A lookup stamped in the future is treated as fresh
            Some(checked) => match (now - checked).to_std() {
                Ok(age) => age >= self.archive_recheck_interval,
                Err(_) => false,
            },
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&CheckerConfig::default())
    }
}

/// Record a completed archive lookup.
///
/// `snapshot` is the snapshot URL when one is available. A missing snapshot
/// clears any previously stored URL; either way the lookup time is stamped.
pub fn apply_archive_result(state: &mut TrackedLinkState, snapshot: Option<String>, now: Timestamp) {
    state.archive_url = snapshot.filter(|url| !url.is_empty());
    state.archive_checked_at = Some(now);
}
