/// Linkstone status-checker server
///
/// Hosts the link-health checker over an in-memory repository loaded from a
/// links file, and exposes metrics, health and per-link status over HTTP.

pub mod routes;
pub mod seed;

// Re-export key types
pub use routes::{router, AppState};
pub use seed::{load_repository, save_repository};
