/// Deterministic fakes for checker unit tests

use crate::archive::ArchiveLookup;
use crate::clock::ManualClock;
use crate::prober::DestinationProber;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lstone_core::{DueCandidate, EntityId, Error, Result, StatusRepository, Timestamp, TrackedLinkState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn fixed_now() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn fixed_clock() -> ManualClock {
    ManualClock::new(fixed_now())
}

/// Prober answering from a fixed URL -> status table; unknown URLs fail
#[derive(Default)]
pub struct StaticProber {
    responses: HashMap<String, u16>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl StaticProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), status);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationProber for StaticProber {
    async fn probe(&self, url: &str) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .get(url)
            .copied()
            .ok_or_else(|| Error::Probe(format!("connection refused: {}", url)))
    }
}

pub enum ArchiveBehavior {
    Found(String),
    Missing,
    Failing,
}

pub struct StaticArchive {
    behavior: ArchiveBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticArchive {
    pub fn found(url: &str) -> Self {
        Self::with(ArchiveBehavior::Found(url.to_string()))
    }

    pub fn missing() -> Self {
        Self::with(ArchiveBehavior::Missing)
    }

    pub fn failing() -> Self {
        Self::with(ArchiveBehavior::Failing)
    }

    fn with(behavior: ArchiveBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveLookup for StaticArchive {
    async fn lookup(&self, _url: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            ArchiveBehavior::Found(url) => Ok(Some(url.clone())),
            ArchiveBehavior::Missing => Ok(None),
            ArchiveBehavior::Failing => Err(Error::ArchiveLookup("availability API returned 503".into())),
        }
    }
}

/// Repository whose every call fails
pub struct FailingRepository;

#[async_trait]
impl StatusRepository for FailingRepository {
    async fn get_by_id(&self, _entity_id: &EntityId) -> Result<Option<TrackedLinkState>> {
        Err(Error::Repository("database unavailable".into()))
    }

    async fn upsert(&self, _state: &TrackedLinkState) -> Result<()> {
        Err(Error::Repository("database unavailable".into()))
    }

    async fn list_due_for_check(
        &self,
        _alive_cutoff: Timestamp,
        _gone_cutoff: Timestamp,
        _limit: usize,
    ) -> Result<Vec<DueCandidate>> {
        Err(Error::Repository("database unavailable".into()))
    }
}
