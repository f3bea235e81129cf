/// Test utilities and helpers for Linkstone testing
///
/// Provides stub destination and Wayback servers on ephemeral ports, plus a
/// repository wrapper that records every upsert.

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use lstone_core::{
    DueCandidate, EntityId, Error, MemoryRepository, Result, StatusRepository, Timestamp,
    TrackedLinkState,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fixed instant used as "now" across tests
pub fn test_now() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

async fn serve(app: Router) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

/// An address nothing is listening on
pub async fn closed_addr() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

#[derive(Default)]
struct DestinationState {
    statuses: RwLock<HashMap<String, u16>>,
    delay: RwLock<Option<Duration>>,
    hits: AtomicUsize,
}

/// Destination server answering each path with a configurable status.
/// Unknown paths get 404.
#[derive(Clone)]
pub struct StubDestination {
    addr: SocketAddr,
    state: Arc<DestinationState>,
}

impl StubDestination {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(DestinationState::default());
        let app = Router::new()
            .fallback(destination_handler)
            .with_state(Arc::clone(&state));
        let addr = serve(app).await?;
        Ok(Self { addr, state })
    }

    /// Set the status returned for `path`
    pub fn set_status(&self, path: &str, status: u16) {
        self.state.statuses.write().insert(path.to_string(), status);
    }

    /// Delay every response
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.write() = delay;
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

async fn destination_handler(State(state): State<Arc<DestinationState>>, uri: Uri) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let delay = *state.delay.read();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = state
        .statuses
        .read()
        .get(uri.path())
        .copied()
        .unwrap_or(404);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "stub destination").into_response()
}

#[derive(Default)]
struct WaybackState {
    snapshots: RwLock<HashMap<String, String>>,
    failing: RwLock<bool>,
    lookups: AtomicUsize,
}

/// Wayback availability API stub. URLs without a registered snapshot get an
/// empty `archived_snapshots` object.
#[derive(Clone)]
pub struct StubWayback {
    addr: SocketAddr,
    state: Arc<WaybackState>,
}

impl StubWayback {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(WaybackState::default());
        let app = Router::new()
            .route("/wayback/available", get(wayback_handler))
            .with_state(Arc::clone(&state));
        let addr = serve(app).await?;
        Ok(Self { addr, state })
    }

    pub fn set_snapshot(&self, url: &str, snapshot: &str) {
        self.state
            .snapshots
            .write()
            .insert(url.to_string(), snapshot.to_string());
    }

    pub fn clear_snapshot(&self, url: &str) {
        self.state.snapshots.write().remove(url);
    }

    /// Make every lookup fail with 503
    pub fn set_failing(&self, failing: bool) {
        *self.state.failing.write() = failing;
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/wayback/available", self.addr)
    }

    pub fn lookups(&self) -> usize {
        self.state.lookups.load(Ordering::SeqCst)
    }
}

async fn wayback_handler(
    State(state): State<Arc<WaybackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.lookups.fetch_add(1, Ordering::SeqCst);

    if *state.failing.read() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let url = params.get("url").cloned().unwrap_or_default();
    let snapshot = state.snapshots.read().get(&url).cloned();
    match snapshot {
        Some(snapshot) => Json(json!({
            "url": url,
            "archived_snapshots": {
                "closest": {
                    "status": "200",
                    "available": true,
                    "url": snapshot,
                    "timestamp": "20240101000000"
                }
            }
        }))
        .into_response(),
        None => Json(json!({ "url": url, "archived_snapshots": {} })).into_response(),
    }
}

/// Memory repository that counts upserts per link and can be told to fail
/// upserts for chosen links
#[derive(Default)]
pub struct RecordingRepository {
    inner: MemoryRepository,
    upserts: Mutex<HashMap<EntityId, usize>>,
    fail_upserts: Mutex<HashSet<EntityId>>,
    fail_listing: Mutex<bool>,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_link(&self, id: &str, destination_url: impl Into<String>) {
        self.inner.insert_link(EntityId::new(id), destination_url);
    }

    /// Seed a prior state without counting it as an upsert
    pub async fn seed_state(&self, state: TrackedLinkState) -> Result<()> {
        self.inner.upsert(&state).await
    }

    pub fn fail_upserts_for(&self, id: &str) {
        self.fail_upserts.lock().insert(EntityId::new(id));
    }

    pub fn set_fail_listing(&self, fail: bool) {
        *self.fail_listing.lock() = fail;
    }

    pub fn upsert_count(&self, id: &str) -> usize {
        self.upserts
            .lock()
            .get(&EntityId::new(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_upserts(&self) -> usize {
        self.upserts.lock().values().sum()
    }

    pub async fn state(&self, id: &str) -> Option<TrackedLinkState> {
        self.inner.get_by_id(&EntityId::new(id)).await.ok().flatten()
    }
}

#[async_trait]
impl StatusRepository for RecordingRepository {
    async fn get_by_id(&self, entity_id: &EntityId) -> Result<Option<TrackedLinkState>> {
        self.inner.get_by_id(entity_id).await
    }

    async fn upsert(&self, state: &TrackedLinkState) -> Result<()> {
        *self
            .upserts
            .lock()
            .entry(state.entity_id.clone())
            .or_insert(0) += 1;

        if self.fail_upserts.lock().contains(&state.entity_id) {
            return Err(Error::Repository(format!(
                "write conflict on {}",
                state.entity_id
            )));
        }
        self.inner.upsert(state).await
    }

    async fn list_due_for_check(
        &self,
        alive_cutoff: Timestamp,
        gone_cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<DueCandidate>> {
        if *self.fail_listing.lock() {
            return Err(Error::Repository("connection refused".into()));
        }
        self.inner
            .list_due_for_check(alive_cutoff, gone_cutoff, limit)
            .await
    }
}
