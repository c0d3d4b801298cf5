//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, engines, hook registry produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (dispatch counters and latency histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID is attached to every dispatch span
//! - Metrics are cheap (atomic increments); no recorder means no cost
//! - Application `log` calls go through the logger engine, not directly here

pub mod logging;
pub mod metrics;
