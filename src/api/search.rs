//! Public query endpoint / 对外查询接口

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use yaosearch_backend::shard::types::{Hit, SearchRequest};

use super::ApiResponse;
use crate::cache::ResultCache;
use crate::state::AppState;

/// Public callers above this are clamped / 对外请求上限
const MAX_PUBLIC_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct SearchApiRequest {
    pub query: String,
    #[serde(default)]
    pub include_cold: bool,
    #[serde(default = "default_max")]
    pub max: usize,
}

fn default_max() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Hit>,
    pub total: usize,
    pub cached: bool,
}

/// POST /api/search - query the node's serving shard / 查询本节点分片
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchApiRequest>,
) -> Json<ApiResponse<SearchResponse>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Json(ApiResponse::error("搜索关键词不能为空"));
    }
    let max = req.max.min(MAX_PUBLIC_RESULTS);

    state.metrics.add(&state.metrics.searches, 1);

    let cache_key = ResultCache::key(query, req.include_cold, max);
    if let Some(results) = state.cache.get(&cache_key) {
        state.metrics.add(&state.metrics.cache_hits, 1);
        let total = results.len();
        return Json(ApiResponse::success(SearchResponse { results, total, cached: true }));
    }

    let shard = match state.registry.get_or_open(&state.query_shard).await {
        Ok(shard) => shard,
        Err(err) => {
            tracing::error!("Query shard {} unavailable: {}", state.query_shard, err);
            return Json(ApiResponse::error("查询分片不可用"));
        }
    };

    let results = shard
        .search(SearchRequest {
            query: query.to_string(),
            include_cold: req.include_cold,
            max,
        })
        .await;

    state.cache.put(cache_key, results.clone());
    let total = results.len();
    Json(ApiResponse::success(SearchResponse { results, total, cached: false }))
}
