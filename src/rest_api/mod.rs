//! Probe and metrics HTTP endpoints
//!
//! Serves `/health` for liveness probes and, with the `metrics` feature,
//! `/metrics` for Prometheus scraping.

mod handlers;
mod server;

pub use handlers::HealthResponse;
pub use server::{router, run_server};
