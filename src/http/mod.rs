//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup)
//!     → middleware/observer.rs (start clock, capture request line)
//!     → middleware/recovery.rs (contain faults)
//!     → handlers.rs
//!     → back out through recovery (status finalized) and observer (log)
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use middleware::{Fault, RequestErrors};
pub use server::HttpServer;
