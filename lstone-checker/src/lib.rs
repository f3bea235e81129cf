/// Linkstone link-health checker
///
/// Periodically re-probes the destinations behind short links, records
/// their HTTP status, and looks up web-archive snapshots for links that
/// have gone away.

pub mod archive;
pub mod clock;
pub mod executor;
pub mod metrics;
pub mod prober;
pub mod scheduler;

#[cfg(test)]
mod test_support;

// Re-export key types
pub use archive::{ArchiveLookup, NoArchive, WaybackClient};
pub use clock::{Clock, IntervalTickerFactory, ManualClock, ManualTickerFactory, ManualTicks, SystemClock, Ticker, TickerFactory};
pub use executor::{CandidateOutcome, CheckContext, PassReport};
pub use prober::{DestinationProber, HttpProber};
pub use scheduler::{SchedulerState, StatusChecker, StatusCheckerBuilder};
pub use tokio_util::sync::CancellationToken;
