//! Access logging middleware.
//!
//! The record is owned by a guard for the lifetime of the request. If the
//! connection goes away and the request future is dropped before a
//! response exists, the guard still writes the record, with status 499.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::middleware::recovery::STATUS_CLIENT_CLOSED;
use crate::http::middleware::RequestErrors;
use crate::observability::metrics;

/// Emit one access record per request once the response status is final.
pub async fn request_observer(req: Request, next: Next) -> Response {
    let mut record = AccessRecord::begin(&req);
    let response = next.run(req).await;

    let errors = response
        .extensions()
        .get::<RequestErrors>()
        .map(ToString::to_string)
        .unwrap_or_default();
    record.finish(response.status().as_u16(), &errors);

    response
}

/// Request facts captured before the inner chain runs.
struct AccessRecord {
    start: Instant,
    method: Method,
    path: String,
    query: String,
    ip: String,
    user_agent: String,
    written: bool,
}

impl AccessRecord {
    fn begin(req: &Request) -> Self {
        Self {
            start: Instant::now(),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            query: req.uri().query().unwrap_or_default().to_string(),
            ip: client_ip(req),
            user_agent: req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            written: false,
        }
    }

    fn finish(&mut self, status: u16, errors: &str) {
        if self.written {
            return;
        }
        self.written = true;

        let cost = self.start.elapsed();
        tracing::info!(
            status,
            method = %self.method,
            path = %self.path,
            query = %self.query,
            ip = %self.ip,
            "user-agent" = %self.user_agent,
            errors = %errors,
            cost = cost.as_secs_f64(),
            "{}",
            self.path
        );
        metrics::record_request(self.method.as_str(), status, cost);
    }
}

impl Drop for AccessRecord {
    fn drop(&mut self) {
        if !self.written {
            let mut errors = RequestErrors::default();
            errors.push("client disconnected");
            self.finish(STATUS_CLIENT_CLOSED, &errors.to_string());
        }
    }
}

/// Best guess at the originating client address.
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`, then the TCP
/// peer. Empty when none is known.
pub fn client_ip(req: &Request) -> String {
    let headers = req.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use tracing_subscriber::filter::LevelFilter;

    use crate::observability::logging;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn lines(capture: &Capture) -> Vec<serde_json::Value> {
        let out = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[test]
    fn test_abandoned_record_is_written_once() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = logging::subscriber(LevelFilter::INFO, move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            let req = request().uri("/slow?x=1").body(Body::empty()).unwrap();
            drop(AccessRecord::begin(&req));

            let req = request().body(Body::empty()).unwrap();
            let mut finished = AccessRecord::begin(&req);
            finished.finish(200, "");
            drop(finished);
        });

        let records = lines(&capture);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["path"], "/slow");
        assert_eq!(records[0]["query"], "x=1");
        assert_eq!(records[0]["status"], 499);
        assert_eq!(records[0]["errors"], "Error #01: client disconnected\n");
        assert_eq!(records[1]["status"], 200);
    }

    fn request() -> axum::http::request::Builder {
        Request::builder().uri("/")
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let req = request()
            .header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let mut req = request().header("x-real-ip", "").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.10:5123".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&req), "192.0.2.10");

        let bare = request().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), "");
    }
}
