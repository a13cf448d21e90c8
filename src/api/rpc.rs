//! Node-to-node shard RPC transport / 节点间分片 RPC 通道
//!
//! Remote registry stubs on other nodes call this surface; it dispatches
//! onto the local shard named in the path. Operations only ever target
//! local shards here - forwarding through the peer map again would allow
//! routing loops. / 远端存根调用本接口，只分发到本地分片，避免转发环路。

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use yaosearch_backend::shard::error::ShardError;
use yaosearch_backend::shard::remote::RpcResponse;
use yaosearch_backend::shard::types::{ConfigPatch, Document, SearchRequest};

use crate::auth::require_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct BatchPayload {
    documents: Vec<Document>,
}

/// POST /api/rpc/:shard/:op / 分片 RPC 分发
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path((shard_name, op)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<RpcResponse> {
    if require_token(&headers, &state.api_token).is_err() {
        return Json(RpcResponse {
            code: 401,
            message: "invalid or missing api token".to_string(),
            data: None,
            field_errors: None,
        });
    }

    let shard = match state.registry.get_or_open(&shard_name).await {
        Ok(shard) => shard,
        Err(err) => return Json(RpcResponse::from_error(&err)),
    };

    let result = match op.as_str() {
        "index" | "sync" => match serde_json::from_value::<BatchPayload>(body) {
            Ok(payload) => {
                // 缓存失效由分片自身的侧信道触发
                let outcome = if op == "index" {
                    shard.index(payload.documents).await
                } else {
                    shard.sync(payload.documents).await
                };
                outcome.map(RpcResponse::success)
            }
            Err(err) => Err(ShardError::Rpc(format!("invalid batch payload: {}", err))),
        },
        "search" => match serde_json::from_value::<SearchRequest>(body) {
            Ok(req) => Ok(RpcResponse::success(shard.search(req).await)),
            Err(err) => Err(ShardError::Rpc(format!("invalid search payload: {}", err))),
        },
        "stats" => Ok(RpcResponse::success(shard.stats().await)),
        "configure" => match serde_json::from_value::<ConfigPatch>(body) {
            Ok(patch) => shard
                .configure(patch)
                .await
                .map(|_| RpcResponse::success(serde_json::json!({}))),
            Err(err) => Err(ShardError::Rpc(format!("invalid configure payload: {}", err))),
        },
        _ => Err(ShardError::Rpc(format!("unknown rpc operation: {}", op))),
    };

    match result {
        Ok(response) => Json(response),
        Err(err) => Json(RpcResponse::from_error(&err)),
    }
}
