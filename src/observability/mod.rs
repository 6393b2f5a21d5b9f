//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request middleware and background tasks produce:
//!     → logging.rs (structured JSON records via tracing)
//!     → metrics.rs (request counters and latency histograms)
//!
//! Consumers:
//!     → Log sink (rolling file or stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{LogSink, LoggingError, StructuredLogger};
