/// Link-health scheduler
///
/// Owns the run loop: one pass immediately on start, then one pass per poll
/// tick. Every pass, scheduled or manual, holds the pass lock, so passes never
/// overlap and a shutdown requested mid-pass waits for that pass to drain.

use crate::archive::{ArchiveLookup, NoArchive, WaybackClient};
use crate::clock::{Clock, IntervalTickerFactory, SystemClock, TickerFactory};
use crate::executor::{self, CheckContext, PassReport};
use crate::metrics::{DUE_CANDIDATES, PASSES_TOTAL, PASS_DURATION_SECONDS};
use crate::prober::{DestinationProber, HttpProber};
use lstone_core::{CheckerConfig, Classifier, Error, GonePolicy, Result, StatusRepository, Timestamp};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`StatusChecker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not started
    Idle,
    /// Loop is ticking
    Running,
    /// Shutdown requested, waiting for the loop to return
    Stopping,
    /// Terminal
    Stopped,
}

/// Shared by the handle and the loop task
struct CheckerInner {
    config: CheckerConfig,
    context: Arc<CheckContext>,
    ticker_factory: Arc<dyn TickerFactory>,
    state: RwLock<SchedulerState>,
    /// Held for the whole of a pass
    pass_lock: Mutex<()>,
}

/// Periodic link-health checker
pub struct StatusChecker {
    inner: Arc<CheckerInner>,
    /// Stops the loop after the current pass
    stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusChecker {
    /// Checker with HTTP prober, Wayback client, system clock and interval ticker
    pub fn new(config: CheckerConfig, repository: Arc<dyn StatusRepository>) -> Result<Self> {
        StatusCheckerBuilder::new(config).with_repository(repository).build()
    }

    pub fn builder(config: CheckerConfig) -> StatusCheckerBuilder {
        StatusCheckerBuilder::new(config)
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Start the loop in a background task.
    ///
    /// Does nothing when the checker is disabled or has already been started.
    /// The loop exits when `cancel` is cancelled or [`shutdown`](Self::shutdown)
    /// is called. Cancelling `cancel` also aborts in-flight probes.
    pub async fn start(&self, cancel: CancellationToken) {
        if !self.inner.config.enabled {
            info!("Link status checker disabled, not starting");
            return;
        }

        let mut handle = self.handle.lock().await;
        {
            let mut state = self.inner.state.write();
            let current = *state;
            if current != SchedulerState::Idle {
                warn!(state = ?current, "Link status checker already started");
                return;
            }
            *state = SchedulerState::Running;
        }

        info!(
            poll_interval_secs = self.inner.config.poll_interval.as_secs(),
            batch_size = self.inner.config.batch_size,
            concurrency = self.inner.config.concurrency,
            archive_lookup = self.inner.config.archive_lookup_enabled,
            "Starting link status checker"
        );

        let inner = Arc::clone(&self.inner);
        let stop = self.stop.clone();
        *handle = Some(tokio::spawn(async move {
            Self::run_loop(inner, stop, cancel).await;
        }));
    }

    async fn run_loop(inner: Arc<CheckerInner>, stop: CancellationToken, cancel: CancellationToken) {
        debug!("Link status checker loop started");
        let mut ticker = inner.ticker_factory.ticker(inner.config.poll_interval);

        loop {
            if stop.is_cancelled() || cancel.is_cancelled() {
                break;
            }

            if let Err(e) = inner.run_pass(&cancel).await {
                debug!(error = %e, "Pass failed, retrying on next tick");
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = cancel.cancelled() => {
                    info!("Link status checker cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }
        }

        *inner.state.write() = SchedulerState::Stopped;
        info!("Link status checker loop exited");
    }

    /// Stop scheduling passes and wait for the loop to return.
    ///
    /// Idempotent and safe to call concurrently; every caller returns only
    /// after the loop has exited. In-flight probes are not interrupted.
    pub async fn shutdown(&self) {
        let mut handle = self.handle.lock().await;

        {
            let mut state = self.inner.state.write();
            match *state {
                SchedulerState::Stopped => return,
                SchedulerState::Idle => {
                    *state = SchedulerState::Stopped;
                    return;
                }
                SchedulerState::Running | SchedulerState::Stopping => {
                    *state = SchedulerState::Stopping;
                }
            }
        }

        info!("Initiating link status checker shutdown");
        self.stop.cancel();

        if let Some(task) = handle.take() {
            debug!("Waiting for link status checker loop to exit");
            if let Err(e) = task.await {
                warn!(error = %e, "Error joining link status checker loop");
            }
        }

        *self.inner.state.write() = SchedulerState::Stopped;
        info!("Link status checker shutdown complete");
    }

    /// Run exactly one pass on the caller's task.
    ///
    /// Waits for a scheduled pass that is already in flight. Fails with
    /// `Error::Cancelled` if `cancel` is already cancelled.
    pub async fn run_once(&self, cancel: CancellationToken) -> Result<PassReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.inner.run_pass(&cancel).await
    }
}

impl Drop for StatusChecker {
    fn drop(&mut self) {
        // The loop cannot be awaited here; signal it so it exits after the current pass
        self.stop.cancel();
    }
}

impl CheckerInner {
    async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;

        let started = Instant::now();
        let now = self.context.clock.now();
        let alive_cutoff = cutoff(now, self.config.alive_recheck_interval);
        let gone_cutoff = cutoff(now, self.config.gone_recheck_interval);

        let candidates = match self
            .context
            .repository
            .list_due_for_check(alive_cutoff, gone_cutoff, self.config.batch_size)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                PASSES_TOTAL.with_label_values(&["error"]).inc();
                error!(error = %e, code = e.code(), "Failed to list links due for status check");
                return Err(e);
            }
        };

        DUE_CANDIDATES.set(candidates.len() as i64);

        if candidates.is_empty() {
            PASSES_TOTAL.with_label_values(&["empty"]).inc();
            debug!("No links due for status check");
            return Ok(PassReport {
                duration: started.elapsed(),
                ..PassReport::default()
            });
        }

        debug!(due = candidates.len(), "Checking links");
        let mut report = executor::run_bounded(
            Arc::clone(&self.context),
            candidates,
            self.config.concurrency,
            cancel.clone(),
        )
        .await;
        report.duration = started.elapsed();

        PASSES_TOTAL.with_label_values(&["ok"]).inc();
        PASS_DURATION_SECONDS.observe(report.duration.as_secs_f64());

        info!(
            due = report.due,
            alive = report.alive,
            gone = report.gone,
            server_error = report.server_error,
            probe_failed = report.probe_failed,
            archived = report.archive_found,
            persist_failed = report.persist_failed,
            cancelled = report.cancelled,
            duration_ms = report.duration.as_millis() as u64,
            "Link status pass complete"
        );

        Ok(report)
    }
}

/// `now - interval`, saturating at the earliest representable instant
fn cutoff(now: Timestamp, interval: Duration) -> Timestamp {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
}

/// Builder for a [`StatusChecker`] with injectable collaborators
pub struct StatusCheckerBuilder {
    config: CheckerConfig,
    repository: Option<Arc<dyn StatusRepository>>,
    prober: Option<Arc<dyn DestinationProber>>,
    archive: Option<Arc<dyn ArchiveLookup>>,
    clock: Option<Arc<dyn Clock>>,
    ticker_factory: Option<Arc<dyn TickerFactory>>,
    gone_policy: Option<Arc<dyn GonePolicy>>,
}

impl StatusCheckerBuilder {
    pub fn new(config: CheckerConfig) -> Self {
        Self {
            config,
            repository: None,
            prober: None,
            archive: None,
            clock: None,
            ticker_factory: None,
            gone_policy: None,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn StatusRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn DestinationProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveLookup>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_ticker_factory(mut self, factory: Arc<dyn TickerFactory>) -> Self {
        self.ticker_factory = Some(factory);
        self
    }

    pub fn with_gone_policy(mut self, policy: Arc<dyn GonePolicy>) -> Self {
        self.gone_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<StatusChecker> {
        self.config.validate()?;

        let repository = self
            .repository
            .ok_or_else(|| Error::InvalidConfig("a status repository is required".to_string()))?;

        let prober: Arc<dyn DestinationProber> = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new(&self.config)?),
        };

        let archive: Arc<dyn ArchiveLookup> = match self.archive {
            Some(archive) => archive,
            None if self.config.archive_lookup_enabled => Arc::new(WaybackClient::new(&self.config)?),
            None => Arc::new(NoArchive),
        };

        let mut classifier = Classifier::from_config(&self.config);
        if let Some(policy) = self.gone_policy {
            classifier = classifier.with_policy(policy);
        }

        let context = CheckContext {
            repository,
            prober,
            archive,
            classifier,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        Ok(StatusChecker {
            inner: Arc::new(CheckerInner {
                config: self.config,
                context: Arc::new(context),
                ticker_factory: self
                    .ticker_factory
                    .unwrap_or_else(|| Arc::new(IntervalTickerFactory)),
                state: RwLock::new(SchedulerState::Idle),
                pass_lock: Mutex::new(()),
            }),
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }
}
