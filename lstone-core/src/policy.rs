/// Gone-status policy
///
/// Decides which HTTP status codes mark a destination as gone. The default
/// treats 404 Not Found and 410 Gone as gone; deployments that also want to
/// retire links on other codes can supply their own set.

use crate::types::{Classification, ProbeOutcome};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Predicate deciding whether a status code means "gone"
pub trait GonePolicy: Send + Sync + Debug {
    fn is_gone(&self, status: u16) -> bool;

    /// Map a probe outcome onto the closed classification set
    fn classify(&self, outcome: ProbeOutcome) -> Classification {
        match outcome {
            ProbeOutcome::Failed => Classification::Unknown,
            ProbeOutcome::Responded(code) if self.is_gone(code) => Classification::Gone,
            ProbeOutcome::Responded(code) if (500..=599).contains(&code) => {
                Classification::ServerError
            }
            ProbeOutcome::Responded(_) => Classification::Alive,
        }
    }
}

/// 404 and 410
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGonePolicy;

impl GonePolicy for DefaultGonePolicy {
    fn is_gone(&self, status: u16) -> bool {
        matches!(status, 404 | 410)
    }
}

/// Explicit set of gone codes
#[derive(Debug, Clone)]
pub struct StatusSetPolicy {
    codes: BTreeSet<u16>,
}

impl StatusSetPolicy {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.codes.iter().copied()
    }
}

impl GonePolicy for StatusSetPolicy {
    fn is_gone(&self, status: u16) -> bool {
        self.codes.contains(&status)
    }
}
