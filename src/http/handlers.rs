//! Route handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::config::ConfigStore;

/// `GET /`
pub async fn index() -> &'static str {
    "ok"
}

/// Service identity taken from one configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub name: String,
    pub mode: String,
    pub version: String,
}

/// `GET /version`
pub async fn version(State(store): State<Arc<ConfigStore>>) -> Json<VersionInfo> {
    let config = store.current();
    Json(VersionInfo {
        name: config.name.clone(),
        mode: config.mode.clone(),
        version: config.version.clone(),
    })
}
