/// Persistence port for link health state
///
/// Storage adapters implement [`StatusRepository`]; the checker only ever
/// talks to this trait. Each `upsert` must be atomic for its entity.

use crate::types::{DueCandidate, EntityId, Timestamp, TrackedLinkState};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Point lookup; `Ok(None)` when the link has never been checked
    async fn get_by_id(&self, entity_id: &EntityId) -> Result<Option<TrackedLinkState>>;

    /// Insert or replace the state for `state.entity_id`
    async fn upsert(&self, state: &TrackedLinkState) -> Result<()>;

    /// Links whose last check is unset, or older than `alive_cutoff` while
    /// alive, or older than `gone_cutoff` while gone. At most `limit` rows.
    async fn list_due_for_check(
        &self,
        alive_cutoff: Timestamp,
        gone_cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<DueCandidate>>;
}
