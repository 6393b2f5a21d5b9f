//! Access log and panic recovery behavior, driven through the full router.

use std::io;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tracing_subscriber::filter::LevelFilter;
use web_app::http::middleware::{install_panic_hook, ConnectionLost};
use web_app::http::{Fault, HttpServer};
use web_app::observability::logging;

mod common;
use common::LogCapture;

async fn explode() -> &'static str {
    panic!("boom")
}

async fn hang_up() -> Result<&'static str, Fault> {
    Err(io::Error::from(io::ErrorKind::BrokenPipe).into())
}

async fn reset_mid_write() -> &'static str {
    std::panic::panic_any(io::Error::from(io::ErrorKind::ConnectionReset))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

fn test_router(timeout_secs: u64) -> Router {
    install_panic_hook();
    let mut config = common::snapshot("web_app", "v1");
    config.request_timeout_secs = timeout_secs;
    let routes = Router::new()
        .route("/explode", get(explode))
        .route("/hang-up", get(hang_up))
        .route("/reset", get(reset_mid_write))
        .route("/slow", get(slow));
    HttpServer::with_routes(common::memory_store(config), routes).router()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_successful_request_logs_one_record() {
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::INFO, capture.clone()));

    let request = Request::builder()
        .uri("/?q=1")
        .header("user-agent", "curl/8.4.0")
        .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
        .body(Body::empty())
        .unwrap();
    let response = test_router(30).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");

    let records = capture.records();
    assert_eq!(records.len(), 1, "{records:?}");
    let record = &records[0];
    assert_eq!(record["level"], "INFO");
    assert_eq!(record["message"], "/");
    assert_eq!(record["path"], "/");
    assert_eq!(record["query"], "q=1");
    assert_eq!(record["method"], "GET");
    assert_eq!(record["status"], 200);
    assert_eq!(record["ip"], "10.0.0.1");
    assert_eq!(record["user-agent"], "curl/8.4.0");
    assert_eq!(record["errors"], "");
    assert!(record["cost"].as_f64().unwrap() >= 0.0);
    assert!(record["timestamp"].is_string());
}

#[tokio::test]
async fn test_access_log_is_silent_above_info() {
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::WARN, capture.clone()));

    let response = test_router(30).oneshot(get_request("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(capture.records().is_empty());
}

#[tokio::test]
async fn test_panic_becomes_empty_500() {
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::INFO, capture.clone()));

    let response = test_router(30).oneshot(get_request("/explode")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());

    let errors = capture.at_level("ERROR");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0]["message"], "[Recovery from panic]");
    assert_eq!(errors[0]["error"], "boom");
    assert!(errors[0]["request"]
        .as_str()
        .unwrap()
        .starts_with("GET /explode HTTP/1.1\r\n"));
    // verbose defaults to on
    assert!(errors[0]["stack"].is_string());

    let access = capture.at_level("INFO");
    assert_eq!(access.len(), 1);
    assert_eq!(access[0]["status"], 500);
}

#[tokio::test]
async fn test_quiet_mode_omits_stack() {
    install_panic_hook();
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::INFO, capture.clone()));

    let mut config = common::snapshot("web_app", "v1");
    config.log.verbose = false;
    let routes = Router::new().route("/explode", get(explode));
    let router = HttpServer::with_routes(common::memory_store(config), routes).router();

    let response = router.oneshot(get_request("/explode")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let errors = capture.at_level("ERROR");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].get("stack").is_none());
}

#[tokio::test]
async fn test_broken_connection_is_not_a_500() {
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::INFO, capture.clone()));
    let router = test_router(30);

    for uri in ["/hang-up", "/reset"] {
        let response = router.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status().as_u16(), 499, "{uri}");
        assert!(response.extensions().get::<ConnectionLost>().is_some(), "{uri}");
    }

    let errors = capture.at_level("ERROR");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["message"], "/hang-up");
    assert_eq!(errors[1]["message"], "/reset");
    assert!(errors.iter().all(|r| r.get("stack").is_none()));

    let access = capture.at_level("INFO");
    assert_eq!(access.len(), 2);
    for record in &access {
        assert_eq!(record["status"], 499);
        assert!(record["errors"].as_str().unwrap().starts_with("Error #01: "));
    }
}

#[tokio::test]
async fn test_server_keeps_serving_after_fault() {
    let router = test_router(30);

    let faulted = router.clone().oneshot(get_request("/explode")).await.unwrap();
    assert_eq!(faulted.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let healthy = router.oneshot(get_request("/")).await.unwrap();
    assert_eq!(healthy.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_slow_handler_times_out() {
    let response = test_router(1).oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_dropped_request_still_logs_once() {
    let capture = LogCapture::default();
    let _guard =
        tracing::subscriber::set_default(logging::subscriber(LevelFilter::INFO, capture.clone()));

    let pending = test_router(30).oneshot(get_request("/slow"));
    let abandoned = tokio::time::timeout(Duration::from_millis(100), pending).await;
    assert!(abandoned.is_err());

    let access = capture.at_level("INFO");
    assert_eq!(access.len(), 1, "{access:?}");
    assert_eq!(access[0]["path"], "/slow");
    assert_eq!(access[0]["status"], 499);
    assert_eq!(access[0]["errors"], "Error #01: client disconnected\n");
}
