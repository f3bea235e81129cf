/// End-to-end pass tests
///
/// Drives full passes through the real HTTP prober and Wayback client
/// against local stub servers, with a manual clock.

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use lstone_checker::{CancellationToken, ManualClock, StatusChecker};
use lstone_core::{CheckerConfig, EntityId, StatusSetPolicy, TrackedLinkState};
use lstone_test_utils::{closed_addr, test_now, RecordingRepository, StubDestination, StubWayback};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    repo: Arc<RecordingRepository>,
    destination: StubDestination,
    wayback: StubWayback,
    clock: ManualClock,
}

impl Harness {
    async fn new() -> Result<Self> {
        Ok(Self {
            repo: Arc::new(RecordingRepository::new()),
            destination: StubDestination::start().await?,
            wayback: StubWayback::start().await?,
            clock: ManualClock::new(test_now()),
        })
    }

    fn config(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_archive_endpoint(self.wayback.endpoint())
            .with_probe_timeout(Duration::from_secs(2))
            .with_archive_timeout(Duration::from_secs(2))
            .with_concurrency(3)
    }

    fn checker(&self, config: CheckerConfig) -> Result<StatusChecker> {
        Ok(StatusChecker::builder(config)
            .with_repository(self.repo.clone())
            .with_clock(Arc::new(self.clock.clone()))
            .build()?)
    }
}

#[tokio::test]
async fn test_recovered_link_clears_gone_and_archive() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    h.destination.set_status("/alive", 200);
    h.repo.insert_link("alive", h.destination.url("/alive"));
    h.repo
        .seed_state(TrackedLinkState {
            entity_id: EntityId::new("alive"),
            last_checked_at: Some(t - ChronoDuration::hours(30)),
            last_status_code: Some(404),
            gone_since: Some(t - ChronoDuration::hours(48)),
            archive_url: Some("https://web.archive.org/web/2024/https://example.com/alive".into()),
            archive_checked_at: Some(t - ChronoDuration::hours(24)),
        })
        .await?;

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.alive, 1);

    assert_eq!(
        h.repo.state("alive").await,
        Some(TrackedLinkState {
            entity_id: EntityId::new("alive"),
            last_checked_at: Some(t),
            last_status_code: Some(200),
            gone_since: None,
            archive_url: None,
            archive_checked_at: None,
        })
    );
    assert_eq!(h.wayback.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_new_gone_link_gets_archive_snapshot() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    let url = h.destination.url("/deleted");
    h.destination.set_status("/deleted", 404);
    h.repo.insert_link("gone", url.clone());
    let snapshot = format!("http://web.archive.org/web/20240101000000/{}", url);
    h.wayback.set_snapshot(&url, &snapshot);

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.gone, 1);
    assert_eq!(report.archive_found, 1);

    assert_eq!(
        h.repo.state("gone").await,
        Some(TrackedLinkState {
            entity_id: EntityId::new("gone"),
            last_checked_at: Some(t),
            last_status_code: Some(404),
            gone_since: Some(t),
            archive_url: Some(snapshot),
            archive_checked_at: Some(t),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_gone_since_survives_later_passes() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    h.destination.set_status("/removed", 410);
    h.repo.insert_link("gone", h.destination.url("/removed"));

    let checker = h.checker(h.config())?;
    checker.run_once(CancellationToken::new()).await?;
    assert_eq!(h.repo.state("gone").await.and_then(|s| s.gone_since), Some(t));

    // Past the gone recheck interval, still 410
    h.clock.advance(ChronoDuration::hours(25));
    let report = checker.run_once(CancellationToken::new()).await?;
    assert_eq!(report.due, 1);

    let state = h.repo.state("gone").await.expect("state recorded");
    assert_eq!(state.gone_since, Some(t));
    assert_eq!(state.last_checked_at, Some(t + ChronoDuration::hours(25)));
    // Archive was checked 25 hours ago; weekly recheck not due yet
    assert_eq!(state.archive_checked_at, Some(t));
    assert_eq!(h.wayback.lookups(), 1);
    Ok(())
}

#[tokio::test]
async fn test_gone_link_not_rechecked_before_gone_interval() -> Result<()> {
    let h = Harness::new().await?;
    h.destination.set_status("/removed", 404);
    h.repo.insert_link("gone", h.destination.url("/removed"));

    let checker = h.checker(h.config())?;
    checker.run_once(CancellationToken::new()).await?;

    // Beyond the alive interval but inside the gone interval
    h.clock.advance(ChronoDuration::hours(7));
    let report = checker.run_once(CancellationToken::new()).await?;
    assert_eq!(report.due, 0);
    assert_eq!(h.destination.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_server_error_does_not_flip_state() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    let first_seen = t - ChronoDuration::days(3);
    h.destination.set_status("/flaky", 503);
    h.repo.insert_link("flaky", h.destination.url("/flaky"));
    h.repo
        .seed_state(TrackedLinkState {
            entity_id: EntityId::new("flaky"),
            last_checked_at: Some(t - ChronoDuration::days(2)),
            last_status_code: Some(404),
            gone_since: Some(first_seen),
            archive_url: None,
            archive_checked_at: Some(t - ChronoDuration::days(30)),
        })
        .await?;

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.server_error, 1);

    let state = h.repo.state("flaky").await.expect("state recorded");
    assert_eq!(state.gone_since, Some(first_seen));
    assert_eq!(state.last_status_code, Some(503));
    assert_eq!(state.archive_checked_at, Some(t - ChronoDuration::days(30)));
    assert_eq!(h.wayback.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_network_failure_preserves_state() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    let first_seen = t - ChronoDuration::days(3);
    let dead = closed_addr().await?;
    h.repo.insert_link("offline", format!("http://{}/page", dead));
    h.repo
        .seed_state(TrackedLinkState {
            entity_id: EntityId::new("offline"),
            last_checked_at: Some(t - ChronoDuration::days(2)),
            last_status_code: Some(404),
            gone_since: Some(first_seen),
            archive_url: Some("https://web.archive.org/web/1/page".into()),
            archive_checked_at: Some(t - ChronoDuration::days(2)),
        })
        .await?;

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.probe_failed, 1);
    assert_eq!(report.persisted, 1);

    let state = h.repo.state("offline").await.expect("state recorded");
    assert_eq!(state.last_checked_at, Some(t));
    assert_eq!(state.last_status_code, None);
    assert_eq!(state.gone_since, Some(first_seen));
    assert_eq!(state.archive_url.as_deref(), Some("https://web.archive.org/web/1/page"));
    Ok(())
}

#[tokio::test]
async fn test_due_archive_lookup_clears_stale_snapshot() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    h.destination.set_status("/gone", 404);
    h.repo.insert_link("stale", h.destination.url("/gone"));
    h.repo
        .seed_state(TrackedLinkState {
            entity_id: EntityId::new("stale"),
            last_checked_at: Some(t - ChronoDuration::days(2)),
            last_status_code: Some(404),
            gone_since: Some(t - ChronoDuration::days(20)),
            archive_url: Some("https://web.archive.org/web/old/snapshot".into()),
            archive_checked_at: Some(t - ChronoDuration::days(8)),
        })
        .await?;

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.archive_missing, 1);

    let state = h.repo.state("stale").await.expect("state recorded");
    assert_eq!(state.archive_url, None);
    assert_eq!(state.archive_checked_at, Some(t));
    assert_eq!(state.gone_since, Some(t - ChronoDuration::days(20)));
    Ok(())
}

#[tokio::test]
async fn test_disabled_archive_keeps_prior_snapshot() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    h.destination.set_status("/now-gone", 404);
    h.repo.insert_link("was-alive", h.destination.url("/now-gone"));
    h.repo
        .seed_state(TrackedLinkState {
            entity_id: EntityId::new("was-alive"),
            last_checked_at: Some(t - ChronoDuration::days(1)),
            last_status_code: Some(200),
            gone_since: None,
            archive_url: Some("https://web.archive.org/web/kept".into()),
            archive_checked_at: Some(t - ChronoDuration::days(100)),
        })
        .await?;

    let config = h.config().with_archive_lookup(false);
    h.checker(config)?.run_once(CancellationToken::new()).await?;

    let state = h.repo.state("was-alive").await.expect("state recorded");
    assert_eq!(state.gone_since, Some(t));
    assert_eq!(state.archive_url.as_deref(), Some("https://web.archive.org/web/kept"));
    assert_eq!(state.archive_checked_at, Some(t - ChronoDuration::days(100)));
    assert_eq!(h.wayback.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn test_archive_outage_still_persists_status() -> Result<()> {
    let h = Harness::new().await?;
    let t = test_now();
    h.destination.set_status("/gone", 410);
    h.repo.insert_link("gone", h.destination.url("/gone"));
    h.wayback.set_failing(true);

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.archive_failed, 1);

    let state = h.repo.state("gone").await.expect("state recorded");
    assert_eq!(state.gone_since, Some(t));
    assert_eq!(state.archive_url, None);
    assert_eq!(state.archive_checked_at, None);

    // The next pass past the gone interval retries the lookup
    h.wayback.set_failing(false);
    h.wayback.set_snapshot(&h.destination.url("/gone"), "http://web.archive.org/web/2/gone");
    h.clock.advance(ChronoDuration::hours(25));
    h.checker(h.config())?.run_once(CancellationToken::new()).await?;

    let state = h.repo.state("gone").await.expect("state recorded");
    assert_eq!(state.archive_url.as_deref(), Some("http://web.archive.org/web/2/gone"));
    assert_eq!(state.archive_checked_at, Some(t + ChronoDuration::hours(25)));
    Ok(())
}

#[tokio::test]
async fn test_every_due_link_upserted_exactly_once() -> Result<()> {
    let h = Harness::new().await?;
    let dead = closed_addr().await?;
    let plan = [
        ("ok", 200u16),
        ("redirect", 302),
        ("missing", 404),
        ("removed", 410),
        ("broken", 500),
        ("forbidden", 403),
    ];
    for (id, status) in plan {
        let path = format!("/{}", id);
        h.destination.set_status(&path, status);
        h.repo.insert_link(id, h.destination.url(&path));
    }
    h.repo.insert_link("offline", format!("http://{}/", dead));
    h.repo.insert_link("conflict", h.destination.url("/ok"));
    h.repo.fail_upserts_for("conflict");

    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;

    assert_eq!(report.due, 8);
    assert_eq!(report.completed(), 8);
    assert_eq!(report.persisted, 7);
    assert_eq!(report.persist_failed, 1);
    assert_eq!(report.alive, 4);
    assert_eq!(report.gone, 2);
    assert_eq!(report.server_error, 1);
    assert_eq!(report.probe_failed, 1);

    for id in ["ok", "redirect", "missing", "removed", "broken", "forbidden", "offline", "conflict"] {
        assert_eq!(h.repo.upsert_count(id), 1, "upserts for {}", id);
    }
    assert_eq!(h.repo.total_upserts(), 8);

    // The failed write leaves the link due for the next pass
    let report = h.checker(h.config())?.run_once(CancellationToken::new()).await?;
    assert_eq!(report.due, 1);
    assert_eq!(h.repo.upsert_count("conflict"), 2);
    Ok(())
}

#[tokio::test]
async fn test_batch_size_limits_pass() -> Result<()> {
    let h = Harness::new().await?;
    h.destination.set_status("/ok", 200);
    for i in 0..7 {
        h.repo.insert_link(&format!("l{}", i), h.destination.url("/ok"));
    }

    let checker = h.checker(h.config().with_batch_size(3))?;
    assert_eq!(checker.run_once(CancellationToken::new()).await?.due, 3);
    assert_eq!(checker.run_once(CancellationToken::new()).await?.due, 3);
    assert_eq!(checker.run_once(CancellationToken::new()).await?.due, 1);
    assert_eq!(checker.run_once(CancellationToken::new()).await?.due, 0);
    assert_eq!(h.repo.total_upserts(), 7);
    Ok(())
}

#[tokio::test]
async fn test_listing_failure_fails_pass_only() -> Result<()> {
    let h = Harness::new().await?;
    h.destination.set_status("/ok", 200);
    h.repo.insert_link("a", h.destination.url("/ok"));
    h.repo.set_fail_listing(true);

    let checker = h.checker(h.config())?;
    let err = checker.run_once(CancellationToken::new()).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.destination.hits(), 0);

    h.repo.set_fail_listing(false);
    let report = checker.run_once(CancellationToken::new()).await?;
    assert_eq!(report.persisted, 1);
    Ok(())
}

#[tokio::test]
async fn test_custom_gone_policy() -> Result<()> {
    let h = Harness::new().await?;
    h.destination.set_status("/moved", 308);
    h.repo.insert_link("moved", h.destination.url("/moved"));

    let checker = StatusChecker::builder(h.config().with_archive_lookup(false))
        .with_repository(h.repo.clone())
        .with_clock(Arc::new(h.clock.clone()))
        .with_gone_policy(Arc::new(StatusSetPolicy::new([404, 410, 308])))
        .build()?;

    let report = checker.run_once(CancellationToken::new()).await?;
    assert_eq!(report.gone, 1);
    assert_eq!(h.repo.state("moved").await.and_then(|s| s.last_status_code), Some(308));
    Ok(())
}
