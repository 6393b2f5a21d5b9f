//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Contain panics and explicit [`Fault`]s raised by the handler chain
//! - Dump the request (without its body) and, in verbose mode, the stack
//! - Tell a dead peer apart from an application fault
//!
//! # Policy
//! - Broken connection: log, attach the error to the access record, and
//!   answer with a `ConnectionLost` marker (status 499, empty body). No 500
//!   is produced since the peer is gone.
//! - Anything else: log with request dump and answer 500 with an empty body.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use crate::config::ConfigStore;
use crate::http::middleware::RequestErrors;

/// Non-standard status recorded when the client went away mid-request.
pub const STATUS_CLIENT_CLOSED: u16 = 499;

const REDACTED_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie"];

/// Whether the panic hook records a backtrace. Follows `log.verbose`.
static CAPTURE_STACKS: AtomicBool = AtomicBool::new(true);

thread_local! {
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record a backtrace at the panic site for the recovery guard to pick up.
///
/// The hook runs on the panicking thread before unwinding starts, and the
/// guard's `catch_unwind` completes on that same thread within the same
/// poll, so a thread-local hands the text over. The previous hook still runs.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_STACKS.load(Ordering::Relaxed) {
                let stack = Backtrace::force_capture().to_string();
                PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            }
            previous(info);
        }));
    });
}

/// Turn backtrace capture in the panic hook on or off.
pub fn capture_stacks(enabled: bool) {
    if CAPTURE_STACKS.load(Ordering::Relaxed) != enabled {
        CAPTURE_STACKS.store(enabled, Ordering::Relaxed);
    }
}

fn take_panic_stack() -> Option<String> {
    PANIC_STACK.with(|slot| slot.borrow_mut().take())
}

/// A failure a handler reports instead of panicking.
///
/// Returning it (e.g. as the `Err` of a handler result) routes the request
/// through the same classification as a panic.
#[derive(Debug, Clone)]
pub struct Fault(Arc<dyn StdError + Send + Sync>);

impl Fault {
    pub fn new(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Fault(Arc::from(error.into()))
    }
}

impl From<io::Error> for Fault {
    fn from(error: io::Error) -> Self {
        Fault(Arc::new(error))
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Marker on responses produced for a peer that already disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLost;

/// How a fault is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    BrokenConnection,
    Generic,
}

/// The value a request faulted with.
#[derive(Debug, Clone)]
pub enum FaultValue {
    Error(Arc<dyn StdError + Send + Sync>),
    Message(String),
}

impl FaultValue {
    /// Recover something loggable from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<io::Error>() {
            Ok(error) => return FaultValue::Error(Arc::new(*error)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Fault>() {
            Ok(fault) => return FaultValue::Error(fault.0),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(error) => return FaultValue::Error(Arc::from(*error)),
            Err(other) => other,
        };

        if let Some(message) = payload.downcast_ref::<&'static str>() {
            FaultValue::Message((*message).to_string())
        } else if let Some(message) = payload.downcast_ref::<String>() {
            FaultValue::Message(message.clone())
        } else {
            FaultValue::Message("Box<dyn Any>".to_string())
        }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            FaultValue::Error(error) if is_broken_connection(&**error) => FaultKind::BrokenConnection,
            _ => FaultKind::Generic,
        }
    }
}

impl fmt::Display for FaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultValue::Error(error) => write!(f, "{}", error),
            FaultValue::Message(message) => f.write_str(message),
        }
    }
}

/// Whether an error chain says the peer closed or reset the connection.
///
/// Looks for an `io::Error` with a disconnect kind anywhere in the chain.
/// Errors that only carry the OS message are matched on the usual
/// `broken pipe` / `connection reset by peer` text.
pub fn is_broken_connection(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(io) = error.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        let message = error.to_string().to_ascii_lowercase();
        if message.contains("broken pipe") || message.contains("connection reset by peer") {
            return true;
        }
        current = error.source();
    }
    false
}

/// Request line and headers in HTTP/1.x wire form. The body is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDump(String);

impl RequestDump {
    pub fn capture(req: &Request) -> Self {
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut out = String::new();
        let _ = write!(out, "{} {} {:?}\r\n", req.method(), target, req.version());
        for (name, value) in req.headers() {
            let value = if REDACTED_HEADERS.contains(&name.as_str()) {
                "*"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            let _ = write!(out, "{}: {}\r\n", name, value);
        }
        out.push_str("\r\n");
        RequestDump(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything captured about an intercepted fault.
#[derive(Debug, Clone)]
pub struct PanicEvent {
    pub fault: FaultValue,
    pub kind: FaultKind,
    pub request: RequestDump,
    pub stack: Option<String>,
}

impl PanicEvent {
    fn new(fault: FaultValue, request: RequestDump, stack: Option<String>) -> Self {
        let kind = fault.kind();
        Self {
            fault,
            kind,
            request,
            stack,
        }
    }
}

/// Outcome of running the handler chain under the guard.
#[derive(Debug)]
pub enum RequestOutcome {
    Completed(Response),
    Faulted(PanicEvent),
}

/// Drive `inner` to completion, converting an unwind or a returned
/// [`Fault`] into [`RequestOutcome::Faulted`].
pub async fn run_guarded<F>(inner: F, request: RequestDump, verbose: bool) -> RequestOutcome
where
    F: Future<Output = Response>,
{
    match AssertUnwindSafe(inner).catch_unwind().await {
        Ok(mut response) => match response.extensions_mut().remove::<Fault>() {
            None => RequestOutcome::Completed(response),
            Some(Fault(error)) => {
                RequestOutcome::Faulted(PanicEvent::new(FaultValue::Error(error), request, None))
            }
        },
        Err(payload) => {
            let stack = take_panic_stack();
            let stack = if verbose {
                stack.or_else(|| Some(Backtrace::force_capture().to_string()))
            } else {
                None
            };
            RequestOutcome::Faulted(PanicEvent::new(FaultValue::from_panic(payload), request, stack))
        }
    }
}

/// Log a fault and build the response the client gets, if it is still there.
pub fn fault_response(path: &str, event: PanicEvent) -> Response {
    match event.kind {
        FaultKind::BrokenConnection => {
            tracing::error!(
                error = %event.fault,
                request = %event.request,
                "{}",
                path
            );
            let mut response = Response::new(Body::empty());
            *response.status_mut() =
                StatusCode::from_u16(STATUS_CLIENT_CLOSED).unwrap_or(StatusCode::BAD_REQUEST);
            response.extensions_mut().insert(ConnectionLost);
            RequestErrors::attach(&mut response, event.fault.to_string());
            response
        }
        FaultKind::Generic => {
            match &event.stack {
                Some(stack) => tracing::error!(
                    error = %event.fault,
                    request = %event.request,
                    stack = %stack,
                    "[Recovery from panic]"
                ),
                None => tracing::error!(
                    error = %event.fault,
                    request = %event.request,
                    "[Recovery from panic]"
                ),
            }
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Last line of defense around the handler chain.
///
/// Reads `log.verbose` from the current snapshot on every request.
pub async fn recovery_guard(
    State(store): State<Arc<ConfigStore>>,
    req: Request,
    next: Next,
) -> Response {
    let verbose = store.peek().log.verbose;
    capture_stacks(verbose);
    let path = req.uri().path().to_string();
    let dump = RequestDump::capture(&req);

    match run_guarded(next.run(req), dump, verbose).await {
        RequestOutcome::Completed(response) => response,
        RequestOutcome::Faulted(event) => fault_response(&path, event),
    }
}
