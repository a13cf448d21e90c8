//! Document ingestion endpoint / 文档摄入接口

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use yaosearch_backend::shard::types::Document;

use super::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub batch_id: String,
    pub enqueued: usize,
}

/// POST /api/index - enqueue a batch for the primary shard
/// / 批次入队，由后台消费者写入主分片
pub async fn index_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexRequest>,
) -> Json<ApiResponse<IndexResponse>> {
    if req.documents.is_empty() {
        return Json(ApiResponse::error("documents 不能为空"));
    }

    match state.queue.enqueue(&req.documents).await {
        Ok(batch_id) => {
            let enqueued = req.documents.len();
            state.metrics.add(&state.metrics.documents_enqueued, enqueued as u64);
            Json(ApiResponse::success(IndexResponse { batch_id, enqueued }))
        }
        Err(err) => {
            tracing::error!("Enqueue failed: {}", err);
            Json(ApiResponse::error("入队失败"))
        }
    }
}
