//! Admin endpoints - configure and stats / 管理接口：配置与统计

use axum::http::HeaderMap;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use yaosearch_backend::shard::error::ShardError;
use yaosearch_backend::shard::types::ConfigPatch;

use super::ApiResponse;
use crate::auth::require_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    /// Target shard; defaults to the primary / 目标分片，默认主分片
    #[serde(default)]
    pub shard: Option<String>,
    #[serde(flatten)]
    pub patch: ConfigPatch,
}

/// POST /api/configure - merge a partial shard config / 合并部分分片配置
pub async fn configure(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ConfigureRequest>,
) -> Json<ApiResponse<Value>> {
    if let Err((status, _)) = require_token(&headers, &state.api_token) {
        return Json(ApiResponse {
            code: status.as_u16() as i32,
            message: "需要有效的集群令牌".to_string(),
            data: None,
        });
    }

    let shard_name = req.shard.unwrap_or_else(|| state.primary_shard.clone());
    let shard = match state.registry.get_or_open(&shard_name).await {
        Ok(shard) => shard,
        Err(err) => {
            tracing::error!("Configure: shard {} unavailable: {}", shard_name, err);
            return Json(ApiResponse::error("分片不可用"));
        }
    };

    match shard.configure(req.patch).await {
        Ok(()) => Json(ApiResponse::success(json!({ "shard": shard_name }))),
        Err(ShardError::Validation(errors)) => Json(ApiResponse {
            code: 422,
            message: "配置校验失败".to_string(),
            data: Some(json!({ "fieldErrors": errors })),
        }),
        Err(ShardError::ReadOnly) => Json(ApiResponse {
            code: 423,
            message: "分片已封存，禁止修改配置".to_string(),
            data: None,
        }),
        Err(err) => {
            tracing::error!("Configure on {} failed: {}", shard_name, err);
            Json(ApiResponse::error("配置失败"))
        }
    }
}

/// GET /api/stats - node and shard statistics / 节点与分片统计
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Value>> {
    let primary_stats = match state.registry.get_or_open(&state.primary_shard).await {
        Ok(shard) => Some(shard.stats().await),
        Err(err) => {
            tracing::warn!("Stats: primary shard unavailable: {}", err);
            None
        }
    };

    let query_stats = if state.query_shard != state.primary_shard {
        match state.registry.get_or_open(&state.query_shard).await {
            Ok(shard) => Some(shard.stats().await),
            Err(_) => None,
        }
    } else {
        None
    };

    let started_at: Option<String> =
        sqlx::query_scalar("SELECT value FROM node_settings WHERE key = 'node_started_at'")
            .fetch_optional(&state.db)
            .await
            .ok()
            .flatten();

    Json(ApiResponse::success(json!({
        "primary": primary_stats,
        "query": query_stats,
        "queue_pending": state.queue.pending_count().await,
        "cache_entries": state.cache.len(),
        "metrics": state.metrics.snapshot(),
        "shards": state.registry.local_shard_names().await,
        "node_started_at": started_at,
    })))
}
