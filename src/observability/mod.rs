//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Hub and registrant produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the forwarding endpoint
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
