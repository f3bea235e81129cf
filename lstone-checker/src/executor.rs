/// Concurrency-bounded pass executor
///
/// Spawns one task per due candidate, gated by a semaphore sized to the
/// configured concurrency, and waits for every task before returning. Each
/// task runs probe, classify, optional archive lookup, then upsert. Tasks
/// share nothing mutable; one candidate failing (or panicking) leaves the
/// rest of the pass untouched.

use crate::archive::ArchiveLookup;
use crate::clock::Clock;
use crate::metrics::{ARCHIVE_LOOKUPS_TOTAL, CHECKS_TOTAL, PROBE_DURATION_SECONDS, UPSERT_FAILURES_TOTAL};
use crate::prober::DestinationProber;
use lstone_core::{
    apply_archive_result, ArchiveAction, Classification, Classifier, DueCandidate, ProbeOutcome,
    StatusRepository,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Everything a per-candidate task needs
pub struct CheckContext {
    pub repository: Arc<dyn StatusRepository>,
    pub prober: Arc<dyn DestinationProber>,
    pub archive: Arc<dyn ArchiveLookup>,
    pub classifier: Classifier,
    pub clock: Arc<dyn Clock>,
}

/// What happened to the archive fields of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveResult {
    /// No lookup was due (or the link is not gone)
    Skipped,
    Found,
    Missing,
    /// Lookup errored; prior archive fields kept
    Failed,
}

/// Result of checking one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Persisted {
        classification: Classification,
        archive: ArchiveResult,
    },
    PersistFailed {
        classification: Classification,
    },
    /// The external token was cancelled before the check finished; nothing
    /// was written, so the link stays due
    Cancelled,
}

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub due: usize,
    pub alive: usize,
    pub gone: usize,
    pub server_error: usize,
    pub probe_failed: usize,
    pub archive_found: usize,
    pub archive_missing: usize,
    pub archive_failed: usize,
    pub persisted: usize,
    pub persist_failed: usize,
    pub cancelled: usize,
    pub panicked: usize,
    pub duration: Duration,
}

impl PassReport {
    fn record(&mut self, outcome: CandidateOutcome) {
        let classification = match outcome {
            CandidateOutcome::Persisted { classification, archive } => {
                self.persisted += 1;
                match archive {
                    ArchiveResult::Skipped => {}
                    ArchiveResult::Found => self.archive_found += 1,
                    ArchiveResult::Missing => self.archive_missing += 1,
                    ArchiveResult::Failed => self.archive_failed += 1,
                }
                classification
            }
            CandidateOutcome::PersistFailed { classification } => {
                self.persist_failed += 1;
                classification
            }
            CandidateOutcome::Cancelled => {
                self.cancelled += 1;
                return;
            }
        };

        match classification {
            Classification::Alive => self.alive += 1,
            Classification::Gone => self.gone += 1,
            Classification::ServerError => self.server_error += 1,
            Classification::Unknown => self.probe_failed += 1,
        }
    }

    /// Number of candidates that reached a final outcome
    pub fn completed(&self) -> usize {
        self.persisted + self.persist_failed + self.cancelled + self.panicked
    }
}

/// Probe, classify, look up the archive if due, and persist one candidate
pub async fn check_candidate(
    ctx: &CheckContext,
    candidate: DueCandidate,
    cancel: &CancellationToken,
) -> CandidateOutcome {
    let now = ctx.clock.now();

    let started = Instant::now();
    let probed = tokio::select! {
        result = ctx.prober.probe(&candidate.destination_url) => result,
        _ = cancel.cancelled() => {
            debug!(entity_id = %candidate.entity_id, "Check cancelled during probe, link stays due");
            return CandidateOutcome::Cancelled;
        }
    };

    let outcome = match probed {
        Ok(status) => {
            PROBE_DURATION_SECONDS
                .with_label_values(&["responded"])
                .observe(started.elapsed().as_secs_f64());
            ProbeOutcome::Responded(status)
        }
        Err(e) => {
            PROBE_DURATION_SECONDS
                .with_label_values(&["failed"])
                .observe(started.elapsed().as_secs_f64());
            debug!(
                entity_id = %candidate.entity_id,
                url = %candidate.destination_url,
                error = %e,
                "Probe failed"
            );
            ProbeOutcome::Failed
        }
    };

    let verdict = ctx.classifier.classify(&candidate, outcome, now);
    let classification = verdict.classification;
    CHECKS_TOTAL.with_label_values(&[classification.as_str()]).inc();

    let mut state = verdict.state;
    let archive = match verdict.archive {
        ArchiveAction::Keep => ArchiveResult::Skipped,
        ArchiveAction::Lookup => {
            let looked_up = tokio::select! {
                result = ctx.archive.lookup(&candidate.destination_url) => result,
                _ = cancel.cancelled() => {
                    debug!(
                        entity_id = %candidate.entity_id,
                        "Check cancelled during archive lookup, link stays due"
                    );
                    return CandidateOutcome::Cancelled;
                }
            };
            match looked_up {
                Ok(Some(snapshot)) => {
                    ARCHIVE_LOOKUPS_TOTAL.with_label_values(&["found"]).inc();
                    apply_archive_result(&mut state, Some(snapshot), now);
                    ArchiveResult::Found
                }
                Ok(None) => {
                    ARCHIVE_LOOKUPS_TOTAL.with_label_values(&["missing"]).inc();
                    apply_archive_result(&mut state, None, now);
                    ArchiveResult::Missing
                }
                Err(e) => {
                    ARCHIVE_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
                    warn!(
                        entity_id = %candidate.entity_id,
                        url = %candidate.destination_url,
                        error = %e,
                        "Archive lookup failed, keeping previous archive state"
                    );
                    ArchiveResult::Failed
                }
            }
        }
    };

    if let Err(e) = ctx.repository.upsert(&state).await {
        UPSERT_FAILURES_TOTAL.inc();
        error!(
            entity_id = %candidate.entity_id,
            error = %e,
            code = e.code(),
            "Failed to persist link state"
        );
        return CandidateOutcome::PersistFailed { classification };
    }

    debug!(
        entity_id = %candidate.entity_id,
        classification = classification.as_str(),
        status = ?state.last_status_code,
        "Link checked"
    );

    CandidateOutcome::Persisted {
        classification,
        archive,
    }
}

/// Check every candidate with at most `concurrency` checks in flight.
/// Returns once all of them have finished.
pub async fn run_bounded(
    ctx: Arc<CheckContext>,
    candidates: Vec<DueCandidate>,
    concurrency: usize,
    cancel: CancellationToken,
) -> PassReport {
    let started = Instant::now();
    let mut report = PassReport {
        due: candidates.len(),
        ..PassReport::default()
    };

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for candidate in candidates {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                // The semaphore is never closed; treat it as a bug and stop spawning
                error!(error = %e, "Check semaphore closed, abandoning remaining candidates");
                break;
            }
        };

        let ctx = Arc::clone(&ctx);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            check_candidate(&ctx, candidate, &cancel).await
        });

        // Reap finished tasks as we go
        while let Some(joined) = tasks.try_join_next() {
            collect(&mut report, joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        collect(&mut report, joined);
    }

    report.duration = started.elapsed();
    report
}

fn collect(report: &mut PassReport, joined: Result<CandidateOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => report.record(outcome),
        Err(e) => {
            report.panicked += 1;
            error!(error = %e, "Link check task failed");
        }
    }
}
