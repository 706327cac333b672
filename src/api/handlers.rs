//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::CacheMachine;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse, SyncResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The tiered cache
    pub cache: Arc<CacheMachine>,
}

impl AppState {
    pub fn new(cache: CacheMachine) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the cache from configuration. The persistent tier is left for
    /// the caller to enable.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheMachine::from_config(config)?))
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&req.key, req.value.as_bytes())?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, &value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
///
/// Only the memory tier copy is removed.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.cache.delete(&key) {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /clear/memory
pub async fn clear_memory_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear_memory_tier();
    Json(ClearResponse::new("memory"))
}

/// Handler for POST /clear/persistent
pub async fn clear_persistent_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear_persistent_tier().await;
    Json(ClearResponse::new("persistent"))
}

/// Handler for POST /sync
///
/// Runs one sync pass immediately.
pub async fn sync_handler(State(state): State<AppState>) -> Json<SyncResponse> {
    let report = state.cache.sync_now().await;
    Json(SyncResponse {
        tier_state: state.cache.persistent_tier_state(),
        report,
    })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.memory_capacity(),
        state.cache.persistent_tier_state(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
