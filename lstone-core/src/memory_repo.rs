/// In-memory status repository
///
/// Keeps tracked links and their health state in a `HashMap` behind a
/// `parking_lot::RwLock`. Used by the server binary and by tests; the whole
/// table can be exported to and restored from a JSON snapshot.

use crate::repository::StatusRepository;
use crate::types::{DueCandidate, EntityId, Timestamp, TrackedLinkState};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A tracked link and its health state, if it has been checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub entity_id: EntityId,
    pub destination_url: String,
    #[serde(default)]
    pub state: Option<TrackedLinkState>,
}

/// Serializable copy of every record in the repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    links: RwLock<HashMap<EntityId, LinkRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a link. Replaces the destination of an existing link
    /// but keeps its state.
    pub fn insert_link(&self, entity_id: EntityId, destination_url: impl Into<String>) {
        let destination_url = destination_url.into();
        let mut links = self.links.write();
        links
            .entry(entity_id.clone())
            .and_modify(|record| record.destination_url = destination_url.clone())
            .or_insert(LinkRecord {
                entity_id,
                destination_url,
                state: None,
            });
    }

    /// Stop tracking a link, dropping its state with it
    pub fn remove_link(&self, entity_id: &EntityId) -> bool {
        self.links.write().remove(entity_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    /// Export every record, ordered by entity id
    pub fn snapshot(&self) -> RepositorySnapshot {
        let mut links: Vec<LinkRecord> = self.links.read().values().cloned().collect();
        links.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        RepositorySnapshot { links }
    }

    pub fn from_snapshot(snapshot: RepositorySnapshot) -> Result<Self> {
        let mut links = HashMap::with_capacity(snapshot.links.len());
        for record in snapshot.links {
            if let Some(state) = &record.state {
                if state.entity_id != record.entity_id {
                    return Err(Error::Repository(format!(
                        "state for {} stored under {}",
                        state.entity_id, record.entity_id
                    )));
                }
            }
            links.insert(record.entity_id.clone(), record);
        }
        Ok(Self {
            links: RwLock::new(links),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    fn is_due(state: Option<&TrackedLinkState>, alive_cutoff: Timestamp, gone_cutoff: Timestamp) -> bool {
        let Some(state) = state else {
            return true;
        };
        match state.last_checked_at {
            None => true,
            Some(checked) if state.is_gone() => checked < gone_cutoff,
            Some(checked) => checked < alive_cutoff,
        }
    }
}

#[async_trait]
impl StatusRepository for MemoryRepository {
    async fn get_by_id(&self, entity_id: &EntityId) -> Result<Option<TrackedLinkState>> {
        Ok(self
            .links
            .read()
            .get(entity_id)
            .and_then(|record| record.state.clone()))
    }

    async fn upsert(&self, state: &TrackedLinkState) -> Result<()> {
        let mut links = self.links.write();
        let record = links
            .get_mut(&state.entity_id)
            .ok_or_else(|| Error::NotFound(state.entity_id.to_string()))?;
        record.state = Some(state.clone());
        debug!(entity_id = %state.entity_id, "Upserted link state");
        Ok(())
    }

    async fn list_due_for_check(
        &self,
        alive_cutoff: Timestamp,
        gone_cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<DueCandidate>> {
        let links = self.links.read();

        let mut due: Vec<&LinkRecord> = links
            .values()
            .filter(|record| Self::is_due(record.state.as_ref(), alive_cutoff, gone_cutoff))
            .collect();

        // Never-checked first, then oldest check first
        due.sort_by(|a, b| {
            let a_checked = a.state.as_ref().and_then(|s| s.last_checked_at);
            let b_checked = b.state.as_ref().and_then(|s| s.last_checked_at);
            a_checked
                .cmp(&b_checked)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        Ok(due
            .into_iter()
            .take(limit)
            .map(|record| match &record.state {
                Some(state) => DueCandidate::from_state(state, record.destination_url.clone()),
                None => DueCandidate::fresh(record.entity_id.clone(), record.destination_url.clone()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn checked_state(id: &str, checked: Timestamp, gone: bool) -> TrackedLinkState {
        let mut state = TrackedLinkState::new(EntityId::new(id));
        state.last_checked_at = Some(checked);
        state.last_status_code = Some(if gone { 404 } else { 200 });
        state.gone_since = gone.then_some(checked);
        state
    }

    #[tokio::test]
    async fn test_unchecked_links_are_due() {
        let repo = MemoryRepository::new();
        repo.insert_link(EntityId::new("a"), "https://a.example");
        repo.insert_link(EntityId::new("b"), "https://b.example");

        let due = repo.list_due_for_check(now(), now(), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].entity_id, EntityId::new("a"));
        assert_eq!(due[0].destination_url, "https://a.example");
    }

    #[tokio::test]
    async fn test_cutoffs_follow_alive_and_gone_cadence() {
        let repo = MemoryRepository::new();
        let t = now();
        for id in ["alive-old", "alive-new", "gone-old", "gone-new"] {
            repo.insert_link(EntityId::new(id), format!("https://{}.example", id));
        }
        repo.upsert(&checked_state("alive-old", t - Duration::hours(7), false)).await.unwrap();
        repo.upsert(&checked_state("alive-new", t - Duration::hours(1), false)).await.unwrap();
        repo.upsert(&checked_state("gone-old", t - Duration::hours(25), true)).await.unwrap();
        repo.upsert(&checked_state("gone-new", t - Duration::hours(7), true)).await.unwrap();

        let alive_cutoff = t - Duration::hours(6);
        let gone_cutoff = t - Duration::hours(24);
        let due = repo.list_due_for_check(alive_cutoff, gone_cutoff, 10).await.unwrap();

        let ids: Vec<_> = due.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["gone-old", "alive-old"]);
        assert!(due[0].gone_since.is_some());
    }

    #[tokio::test]
    async fn test_limit_prefers_never_checked() {
        let repo = MemoryRepository::new();
        let t = now();
        repo.insert_link(EntityId::new("checked"), "https://c.example");
        repo.insert_link(EntityId::new("fresh"), "https://f.example");
        repo.upsert(&checked_state("checked", t - Duration::days(30), false)).await.unwrap();

        let due = repo.list_due_for_check(t, t, 1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].entity_id, EntityId::new("fresh"));
    }

    #[tokio::test]
    async fn test_upsert_unknown_link_fails() {
        let repo = MemoryRepository::new();
        let state = TrackedLinkState::new(EntityId::new("ghost"));
        let err = repo.upsert(&state).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_remove_link_drops_state() {
        let repo = MemoryRepository::new();
        let id = EntityId::new("a");
        repo.insert_link(id.clone(), "https://a.example");
        repo.upsert(&checked_state("a", now(), false)).await.unwrap();
        assert!(repo.get_by_id(&id).await.unwrap().is_some());

        assert!(repo.remove_link(&id));
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_json_snapshot_roundtrip() {
        let repo = MemoryRepository::new();
        repo.insert_link(EntityId::new("a"), "https://a.example");
        repo.insert_link(EntityId::new("b"), "https://b.example");
        repo.upsert(&checked_state("b", now(), true)).await.unwrap();

        let restored = MemoryRepository::from_json(&repo.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get_by_id(&EntityId::new("b")).await.unwrap(),
            repo.get_by_id(&EntityId::new("b")).await.unwrap()
        );
    }

    #[test]
    fn test_seed_without_state() {
        let json = r#"{"links":[{"entity_id":"x1","destination_url":"https://x.example"}]}"#;
        let repo = MemoryRepository::from_json(json).unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_snapshot_rejects_mismatched_state() {
        let json = r#"{"links":[{"entity_id":"x1","destination_url":"https://x.example",
            "state":{"entity_id":"other","last_checked_at":null,"last_status_code":null,
            "gone_since":null,"archive_url":null,"archive_checked_at":null}}]}"#;
        assert!(MemoryRepository::from_json(json).is_err());
    }
}
