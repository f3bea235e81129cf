/// Prometheus metrics for the link-health checker
///
/// Metrics are updated by the executor and scheduler as passes run, and
/// exposed by the server at the /metrics endpoint in Prometheus format.

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Registry, TextEncoder,
};

lazy_static! {
    /// Registry exposed by the server
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total number of passes by result
    ///
    /// Labels:
    /// - result: ok, empty or error
    pub static ref PASSES_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "lstone_checker_passes_total",
            "Total number of link-check passes"
        ),
        &["result"]
    )
    .expect("valid metric definition");

    /// Wall time of a full pass, including every probe and upsert
    pub static ref PASS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        histogram_opts!(
            "lstone_checker_pass_duration_seconds",
            "Link-check pass duration in seconds",
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
        )
    )
    .expect("valid metric definition");

    /// Size of the most recent due-set
    pub static ref DUE_CANDIDATES: IntGauge = IntGauge::with_opts(
        opts!(
            "lstone_checker_due_candidates",
            "Number of links selected in the most recent pass"
        )
    )
    .expect("valid metric definition");

    /// Total number of link checks by classification
    ///
    /// Labels:
    /// - classification: alive, gone, server_error or unknown
    pub static ref CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "lstone_checker_checks_total",
            "Total number of destination checks"
        ),
        &["classification"]
    )
    .expect("valid metric definition");

    /// Probe duration in seconds
    ///
    /// Labels:
    /// - outcome: responded or failed
    pub static ref PROBE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "lstone_checker_probe_duration_seconds",
            "Destination probe duration in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        ),
        &["outcome"]
    )
    .expect("valid metric definition");

    /// Total number of archive lookups by result
    ///
    /// Labels:
    /// - result: found, missing or error
    pub static ref ARCHIVE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "lstone_checker_archive_lookups_total",
            "Total number of archive snapshot lookups"
        ),
        &["result"]
    )
    .expect("valid metric definition");

    /// Total number of failed state upserts
    pub static ref UPSERT_FAILURES_TOTAL: IntCounter = IntCounter::with_opts(
        opts!(
            "lstone_checker_upsert_failures_total",
            "Total number of link state upserts that failed"
        )
    )
    .expect("valid metric definition");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PASSES_TOTAL.clone()),
        Box::new(PASS_DURATION_SECONDS.clone()),
        Box::new(DUE_CANDIDATES.clone()),
        Box::new(CHECKS_TOTAL.clone()),
        Box::new(PROBE_DURATION_SECONDS.clone()),
        Box::new(ARCHIVE_LOOKUPS_TOTAL.clone()),
        Box::new(UPSERT_FAILURES_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Encode metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
