//! Request middleware.
//!
//! ```text
//! request → observer.rs → recovery.rs → timeout → handler
//! ```
//!
//! The observer is outermost so that the status it logs is the one the
//! recovery guard settled on.

pub mod observer;
pub mod recovery;

use std::fmt;

use axum::response::Response;

pub use observer::{client_ip, request_observer};
pub use recovery::{install_panic_hook, recovery_guard, ConnectionLost, Fault, FaultKind};

/// Private error summary carried on a response for the access log.
///
/// Never rendered to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestErrors(Vec<String>);

impl RequestErrors {
    pub fn push(&mut self, error: impl Into<String>) {
        self.0.push(error.into());
    }

    /// Append `error` to the summary attached to `response`.
    pub fn attach(response: &mut Response, error: impl Into<String>) {
        let extensions = response.extensions_mut();
        match extensions.get_mut::<RequestErrors>() {
            Some(errors) => errors.push(error),
            None => {
                let mut errors = RequestErrors::default();
                errors.push(error);
                extensions.insert(errors);
            }
        }
    }
}

impl fmt::Display for RequestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            writeln!(f, "Error #{:02}: {}", i + 1, error)?;
        }
        Ok(())
    }
}
