//! # Tower Middleware
//!
//! - `rate_limit` — per-source-address limiting on registration.
//! - `metrics` — request counters and latency histograms.

pub mod metrics;
pub mod rate_limit;
